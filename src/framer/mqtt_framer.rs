//! MQTT 3.1.1 fixed-header frame decoder.
//!
//! Parses the fixed header (packet type/flags + varint remaining length)
//! and accumulates the remaining-length body into a buffer reserved from a
//! [`MessagePool`], byte at a time, so it composes with any `ByteStream`
//! implementation reading one byte at a time too.

use super::VarintAccumulator;
use crate::pool::{MessagePool, PoolHandle};

pub const MQTT_CONNACK: u8 = 2;
pub const MQTT_PUBLISH: u8 = 3;
pub const MQTT_SUBACK: u8 = 9;
pub const MQTT_PINGRESP: u8 = 13;

/// Default remaining-length this wire format is sized around; the
/// effective per-packet limit is the pool's `CAP`.
pub const MAX_FRAME_SIZE: usize = 1024;

fn is_legal_inbound_type(t: u8) -> bool {
    matches!(t, MQTT_CONNACK | MQTT_PUBLISH | MQTT_SUBACK | MQTT_PINGRESP)
}

enum State {
    Header1,
    RemainingLen { packet_type: u8, flags: u8, acc: VarintAccumulator },
    Data { packet_type: u8, flags: u8, remaining: usize, collected: usize },
    /// Drain `remaining` bytes of a packet we can't hold onto — either it's
    /// not a legal inbound type, it's larger than the pool's buffer
    /// capacity, or the pool had no free slot when we needed one.
    Skip { remaining: usize, pool_exhausted: bool },
}

/// A decoded packet. `payload` is the pool-backed buffer holding `len`
/// bytes of the packet's variable-length body (topic+payload for PUBLISH,
/// the packet id and stray bytes for the others).
pub struct MqttPacketView<const N: usize, const CAP: usize> {
    pub packet_type: u8,
    pub flags: u8,
    pub payload: PoolHandle<N, CAP>,
    pub len: usize,
}

/// A decoded event dispatched from [`MqttFrameDecoder::feed`].
pub enum MqttFrameEvent<const N: usize, const CAP: usize> {
    Packet(MqttPacketView<N, CAP>),
    /// No free buffer was available to hold a packet's body; the packet
    /// was drained and discarded.
    PoolExhausted,
}

/// Streaming decoder for inbound MQTT control packets.
pub struct MqttFrameDecoder<const N: usize, const CAP: usize> {
    state: State,
    pool: MessagePool<N, CAP>,
    current: Option<PoolHandle<N, CAP>>,
    malformed_packet_count: u32,
}

impl<const N: usize, const CAP: usize> MqttFrameDecoder<N, CAP> {
    pub fn new(pool: MessagePool<N, CAP>) -> Self {
        Self { state: State::Header1, pool, current: None, malformed_packet_count: 0 }
    }

    pub fn reset(&mut self) {
        self.state = State::Header1;
    }

    pub fn malformed_packet_count(&self) -> u32 {
        self.malformed_packet_count
    }

    fn resync(&mut self) {
        self.malformed_packet_count = self.malformed_packet_count.saturating_add(1);
        self.state = State::Header1;
    }

    fn ensure_buffer(&mut self) -> bool {
        if let Some(handle) = &self.current {
            if handle.ref_count() == 1 {
                handle.with_buffer_mut(crate::buffer::FixedBuffer::clear);
                return true;
            }
            self.current = None;
        }
        match self.pool.reserve_free() {
            Some(h) => {
                self.current = Some(h);
                true
            }
            None => false,
        }
    }

    /// Feed bytes into the decoder, invoking `on_packet` once per completed
    /// packet. Illegal packet types, oversized remaining-length, and
    /// malformed varints are drained and silently resynced, matching the
    /// existing malformed-packet policy; pool exhaustion drains the packet
    /// too but does invoke `on_packet` with [`MqttFrameEvent::PoolExhausted`].
    pub fn feed(&mut self, data: &[u8], mut on_packet: impl FnMut(MqttFrameEvent<N, CAP>)) {
        for &byte in data {
            let mut need_buffer: Option<(u8, u8, usize)> = None;
            let mut enter_skip: Option<usize> = None;
            let mut push_byte: Option<u8> = None;
            let mut resync_silent = false;
            let mut emit_full: Option<(u8, u8, usize)> = None;
            let mut skip_done_pool_exhausted = false;

            match &mut self.state {
                State::Header1 => {
                    let packet_type = byte >> 4;
                    let flags = byte & 0x0f;
                    self.state = State::RemainingLen { packet_type, flags, acc: VarintAccumulator::new() };
                }
                State::RemainingLen { packet_type, flags, acc } => match acc.push(byte) {
                    Ok(Some(remaining)) => {
                        let remaining = remaining as usize;
                        let packet_type = *packet_type;
                        let flags = *flags;
                        if !is_legal_inbound_type(packet_type) || remaining > CAP {
                            if remaining == 0 {
                                resync_silent = true;
                            } else {
                                enter_skip = Some(remaining);
                            }
                        } else {
                            need_buffer = Some((packet_type, flags, remaining));
                        }
                        self.state = State::Header1;
                    }
                    Ok(None) => {}
                    Err(()) => {
                        resync_silent = true;
                        self.state = State::Header1;
                    }
                },
                State::Data { packet_type, flags, remaining, collected } => {
                    push_byte = Some(byte);
                    *collected += 1;
                    if *collected == *remaining {
                        emit_full = Some((*packet_type, *flags, *remaining));
                        self.state = State::Header1;
                    }
                }
                State::Skip { remaining, pool_exhausted } => {
                    *remaining -= 1;
                    if *remaining == 0 {
                        skip_done_pool_exhausted = *pool_exhausted;
                        self.state = State::Header1;
                    }
                }
            }

            if resync_silent {
                self.resync();
            }
            if let Some(remaining) = enter_skip {
                self.state = State::Skip { remaining, pool_exhausted: false };
            }

            if let Some((packet_type, flags, remaining)) = need_buffer {
                if self.ensure_buffer() {
                    if remaining == 0 {
                        if let Some(cur) = &self.current {
                            let handle = cur.retain();
                            on_packet(MqttFrameEvent::Packet(MqttPacketView {
                                packet_type,
                                flags,
                                payload: handle,
                                len: 0,
                            }));
                        }
                    } else {
                        self.state = State::Data { packet_type, flags, remaining, collected: 0 };
                    }
                } else if remaining == 0 {
                    on_packet(MqttFrameEvent::PoolExhausted);
                } else {
                    self.state = State::Skip { remaining, pool_exhausted: true };
                }
            }

            if let Some(b) = push_byte {
                if let Some(cur) = &self.current {
                    cur.with_buffer_mut(|buf| {
                        buf.append_u8(b);
                    });
                }
            }

            if let Some((packet_type, flags, len)) = emit_full {
                if let Some(cur) = &self.current {
                    let handle = cur.retain();
                    on_packet(MqttFrameEvent::Packet(MqttPacketView { packet_type, flags, payload: handle, len }));
                } else {
                    on_packet(MqttFrameEvent::PoolExhausted);
                }
            }

            if skip_done_pool_exhausted {
                on_packet(MqttFrameEvent::PoolExhausted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_fixed_header(packet_type: u8, flags: u8, remaining: u32) -> Vec<u8> {
        let mut out = vec![(packet_type << 4) | flags];
        let mut buf = [0u8; 4];
        let n = super::super::encode_varint(remaining, &mut buf).unwrap();
        out.extend_from_slice(&buf[..n]);
        out
    }

    fn decode_one(bytes: &[u8]) -> Option<(u8, Vec<u8>)> {
        let pool: MessagePool<2, 256> = MessagePool::new();
        let mut dec: MqttFrameDecoder<2, 256> = MqttFrameDecoder::new(pool);
        let mut out = None;
        dec.feed(bytes, |ev| {
            if let MqttFrameEvent::Packet(view) = ev {
                out = Some((view.packet_type, view.payload.with_buffer(|b| b.as_slice()[..view.len].to_vec())));
            }
        });
        out
    }

    #[test]
    fn decodes_pingresp_with_zero_length() {
        let bytes = encode_fixed_header(MQTT_PINGRESP, 0, 0);
        let (packet_type, payload) = decode_one(&bytes).unwrap();
        assert_eq!(packet_type, MQTT_PINGRESP);
        assert!(payload.is_empty());
    }

    #[test]
    fn decodes_publish_with_payload() {
        let mut bytes = encode_fixed_header(MQTT_PUBLISH, 0, 5);
        bytes.extend_from_slice(b"hello");
        let (packet_type, payload) = decode_one(&bytes).unwrap();
        assert_eq!(packet_type, MQTT_PUBLISH);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn rejects_illegal_inbound_type() {
        // packet type 14 (unused) is never legal inbound.
        let mut bytes = encode_fixed_header(14, 0, 3);
        bytes.extend_from_slice(b"abc");
        let pool: MessagePool<2, 256> = MessagePool::new();
        let mut dec: MqttFrameDecoder<2, 256> = MqttFrameDecoder::new(pool);
        let mut fired = false;
        dec.feed(&bytes, |_| fired = true);
        assert!(!fired);
        assert_eq!(dec.malformed_packet_count(), 1);
    }

    #[test]
    fn varint_boundary_four_bytes_max() {
        // A remaining-length of 268,435,455 (0xFF 0xFF 0xFF 0x7F) needs the
        // full four varint bytes but is still legal MQTT; it exceeds this
        // decoder's buffering capacity and is skipped rather than buffered.
        let bytes = encode_fixed_header(MQTT_PUBLISH, 0, 268_435_455);
        assert_eq!(bytes.len(), 5);
    }

    #[test]
    fn malformed_varint_resyncs() {
        let pool: MessagePool<2, 256> = MessagePool::new();
        let mut dec: MqttFrameDecoder<2, 256> = MqttFrameDecoder::new(pool);
        let bad = [(MQTT_PUBLISH << 4), 0xff, 0xff, 0xff, 0xff];
        let mut fired = false;
        dec.feed(&bad, |_| fired = true);
        assert!(!fired);
        assert_eq!(dec.malformed_packet_count(), 1);
    }

    #[test]
    fn pool_exhaustion_drains_and_reports() {
        let pool: MessagePool<1, 256> = MessagePool::new();
        let _held = pool.reserve_free().unwrap();
        let mut dec: MqttFrameDecoder<1, 256> = MqttFrameDecoder::new(pool);
        let mut bytes = encode_fixed_header(MQTT_PUBLISH, 0, 5);
        bytes.extend_from_slice(b"hello");
        let mut exhausted = false;
        dec.feed(&bytes, |ev| {
            if matches!(ev, MqttFrameEvent::PoolExhausted) {
                exhausted = true;
            }
        });
        assert!(exhausted);
        assert_eq!(dec.malformed_packet_count(), 0);
    }

    #[test]
    fn listener_retaining_payload_forces_fresh_buffer_next_packet() {
        let pool: MessagePool<2, 256> = MessagePool::new();
        let mut dec: MqttFrameDecoder<2, 256> = MqttFrameDecoder::new(pool.clone());
        let bytes = encode_fixed_header(MQTT_PINGRESP, 0, 0);
        let mut retained = None;
        dec.feed(&bytes, |ev| {
            if let MqttFrameEvent::Packet(view) = ev {
                retained = Some(view.payload);
            }
        });
        assert!(retained.is_some());
        assert_eq!(pool.free_count(), 1);

        let mut bytes2 = encode_fixed_header(MQTT_PUBLISH, 0, 4);
        bytes2.extend_from_slice(b"xyzw");
        let mut second = None;
        dec.feed(&bytes2, |ev| {
            if let MqttFrameEvent::Packet(view) = ev {
                second = Some(view.payload.with_buffer(|b| b.as_slice()[..view.len].to_vec()));
            }
        });
        assert_eq!(second.unwrap(), b"xyzw");
    }
}
