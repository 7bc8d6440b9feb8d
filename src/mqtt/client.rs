//! MQTT client state machine: `Idle → Connecting → Connected → Idle`.
//!
//! QoS-0 only: there is no QoS parameter anywhere in this module's public
//! API, and there never will be without a broader redesign — subscribe and
//! publish always negotiate/send at QoS 0. Callers needing at-least-once
//! or exactly-once delivery need a different client.

use super::packet;
use super::topic;
use crate::buffer::FixedBuffer;
use crate::error::MqttError;
use crate::framer::mqtt_framer::{MqttFrameDecoder, MqttFrameEvent};
use crate::pool::MessagePool;
use crate::provider::{ByteStream, MonotonicClock, ReadByte};
use heapless::{String, Vec};
use log::{debug, info, warn};

const MAX_CLIENT_ID_LEN: usize = 32;
const MAX_TOPIC_LEN: usize = 64;
pub const MAX_FRAME_BUF: usize = 512;

type ClientId = String<MAX_CLIENT_ID_LEN>;
type Topic = String<MAX_TOPIC_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubState {
    Unacknowledged,
    Acknowledged,
    Refused,
}

pub struct Subscription<const MAX_SUBS: usize> {
    pub packet_id: u16,
    pub state: SubState,
    pub filter: Topic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Connecting,
    Connected,
}

/// A received PUBLISH, surfaced to the caller via [`MqttClient::poll`].
/// Owns its bytes (copied out of the decoder's pool-backed buffer) rather
/// than borrowing, so a `poll` result outlives the next `poll` call.
pub struct PublishEvent<const PAYLOAD_CAP: usize> {
    pub topic: Topic,
    pub payload: Vec<u8, PAYLOAD_CAP>,
}

/// Outcome of one [`MqttClient::poll`] call.
pub enum PollEvent<const PAYLOAD_CAP: usize> {
    None,
    Connected,
    ConnectFailed(MqttError),
    /// The connection was torn down mid-session — currently only raised
    /// when the message pool is exhausted while already `Connected`.
    Disconnected,
    Publish(PublishEvent<PAYLOAD_CAP>),
}

pub struct MqttClient<const MAX_SUBS: usize, const POOL_N: usize, const POOL_CAP: usize> {
    client_id: ClientId,
    keepalive_s: u16,
    connect_timeout_ms: u32,
    state: State,
    decoder: MqttFrameDecoder<POOL_N, POOL_CAP>,
    subscriptions: Vec<Subscription<MAX_SUBS>, MAX_SUBS>,
    current_packet_id: u16,
    connect_deadline_ms: u64,
    last_ping_sent_ms: u64,
    last_pong_seen_ms: u64,
    connect_acked: bool,
}

impl<const MAX_SUBS: usize, const POOL_N: usize, const POOL_CAP: usize> MqttClient<MAX_SUBS, POOL_N, POOL_CAP> {
    pub fn new(
        client_id: &str,
        keepalive_s: u16,
        connect_timeout_ms: u32,
        pool: MessagePool<POOL_N, POOL_CAP>,
    ) -> Option<Self> {
        Some(Self {
            client_id: ClientId::try_from(client_id).ok()?,
            keepalive_s,
            connect_timeout_ms,
            state: State::Idle,
            decoder: MqttFrameDecoder::new(pool),
            subscriptions: Vec::new(),
            current_packet_id: 0,
            connect_deadline_ms: 0,
            last_ping_sent_ms: 0,
            last_pong_seen_ms: 0,
            connect_acked: false,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.state == State::Connected
    }

    /// Begin connecting: sends CONNECT and arms the CONNACK deadline.
    pub fn connect(&mut self, stream: &mut dyn ByteStream, clock: &dyn MonotonicClock) -> bool {
        let mut buf: FixedBuffer<MAX_FRAME_BUF> = FixedBuffer::new();
        if !packet::build_connect(&mut buf, &self.client_id, self.keepalive_s, true, None, None, None) {
            return false;
        }
        if !stream.write_bytes(buf.as_slice()) {
            return false;
        }
        self.state = State::Connecting;
        self.connect_acked = false;
        self.connect_deadline_ms = clock.now_ms() + u64::from(self.connect_timeout_ms);
        info!("mqtt: CONNECT sent, client_id={}", self.client_id.as_str());
        true
    }

    /// Register a subscription. Takes effect immediately if connected
    /// (a SUBSCRIBE is sent right away); otherwise it is flushed on the
    /// next transition into Connected, alongside every other stored
    /// subscription, surviving reconnects.
    pub fn subscribe(&mut self, filter: &str, stream: &mut dyn ByteStream) -> Result<(), MqttError> {
        let filter = Topic::try_from(filter).map_err(|_| MqttError::TableFull)?;
        if self.subscriptions.iter().any(|s| s.filter == filter) {
            return Ok(());
        }
        let packet_id = self.next_packet_id();
        self.subscriptions
            .push(Subscription { packet_id, state: SubState::Unacknowledged, filter: filter.clone() })
            .map_err(|_| MqttError::TableFull)?;
        if self.state == State::Connected {
            self.send_subscribe(packet_id, &filter, stream);
        }
        Ok(())
    }

    fn send_subscribe(&self, packet_id: u16, filter: &str, stream: &mut dyn ByteStream) {
        let mut buf: FixedBuffer<MAX_FRAME_BUF> = FixedBuffer::new();
        if packet::build_subscribe(&mut buf, packet_id, filter) {
            stream.write_bytes(buf.as_slice());
        }
    }

    fn next_packet_id(&mut self) -> u16 {
        self.current_packet_id = self.current_packet_id.wrapping_add(1);
        if self.current_packet_id == 0 {
            self.current_packet_id = 1;
        }
        self.current_packet_id
    }

    pub fn publish(&self, topic: &str, payload: &[u8], retain: bool, stream: &mut dyn ByteStream) -> bool {
        if self.state != State::Connected {
            return false;
        }
        let mut buf: FixedBuffer<MAX_FRAME_BUF> = FixedBuffer::new();
        packet::build_publish(&mut buf, topic, payload, retain) && stream.write_bytes(buf.as_slice())
    }

    /// On entry to Connected: flush every stored subscription as a fresh
    /// SUBSCRIBE (new packet id, state reset), and reset keepalive timers.
    fn enter_connected(&mut self, stream: &mut dyn ByteStream, clock: &dyn MonotonicClock) {
        self.state = State::Connected;
        self.last_ping_sent_ms = clock.now_ms();
        self.last_pong_seen_ms = clock.now_ms();
        for sub in &mut self.subscriptions {
            sub.state = SubState::Unacknowledged;
        }
        let filters: Vec<(u16, Topic), MAX_SUBS> =
            self.subscriptions.iter().map(|s| (s.packet_id, s.filter.clone())).collect();
        for (packet_id, filter) in &filters {
            self.send_subscribe(*packet_id, filter, stream);
        }
        info!("mqtt: connected, {} subscription(s) flushed", filters.len());
    }

    /// Drive the client: feed bytes off `stream` through the framer,
    /// advance timeouts/keepalive against `clock`, and surface at most one
    /// event per call.
    pub fn poll<const PAYLOAD_CAP: usize>(
        &mut self,
        stream: &mut dyn ByteStream,
        clock: &dyn MonotonicClock,
    ) -> PollEvent<PAYLOAD_CAP> {
        match self.state {
            State::Idle => return PollEvent::None,
            State::Connecting => {
                if clock.now_ms() >= self.connect_deadline_ms {
                    warn!("mqtt: CONNACK timed out");
                    self.state = State::Idle;
                    return PollEvent::ConnectFailed(MqttError::ConnectTimedOut);
                }
            }
            State::Connected => {
                if clock.now_ms().saturating_sub(self.last_ping_sent_ms) >= u64::from(self.keepalive_s) * 1000 {
                    let mut buf: FixedBuffer<16> = FixedBuffer::new();
                    if packet::build_pingreq(&mut buf) {
                        stream.write_bytes(buf.as_slice());
                    }
                    self.last_ping_sent_ms = clock.now_ms();
                }
                if clock.now_ms().saturating_sub(self.last_pong_seen_ms) >= 2 * u64::from(self.keepalive_s) * 1000 {
                    warn!("mqtt: no PINGRESP within 2x keepalive; tolerating slow peer");
                }
            }
        }

        let mut byte_buf = [0u8; 1];
        while let ReadByte::GotData(b) = stream.read_byte() {
            byte_buf[0] = b;
            let mut frame = None;
            let mut pool_exhausted = false;
            self.decoder.feed(&byte_buf, |ev| match ev {
                MqttFrameEvent::Packet(view) => frame = Some((view.packet_type, view.payload, view.len)),
                MqttFrameEvent::PoolExhausted => pool_exhausted = true,
            });

            if pool_exhausted {
                warn!("mqtt: message pool exhausted, dropping inbound packet");
                if self.state == State::Connecting {
                    self.state = State::Idle;
                    return PollEvent::ConnectFailed(MqttError::PoolExhausted);
                }
                self.state = State::Idle;
                self.decoder.reset();
                return PollEvent::Disconnected;
            }

            let Some((packet_type, handle, len)) = frame else {
                continue;
            };

            if packet::is_connack(packet_type) {
                let parsed = handle.with_buffer(|b| packet::parse_connack(&b.as_slice()[..len]));
                if let Some((_, code)) = parsed {
                    if code == 0 {
                        self.connect_acked = true;
                        self.enter_connected(stream, clock);
                        return PollEvent::Connected;
                    }
                    self.state = State::Idle;
                    return PollEvent::ConnectFailed(MqttError::ConnectRefused(code));
                }
            } else if packet::is_suback(packet_type) {
                let parsed = handle.with_buffer(|b| packet::parse_suback(&b.as_slice()[..len]));
                if let Some((packet_id, code)) = parsed {
                    if let Some(sub) = self.subscriptions.iter_mut().find(|s| s.packet_id == packet_id) {
                        sub.state = if code == 0x80 { SubState::Refused } else { SubState::Acknowledged };
                        debug!("mqtt: SUBACK for packet {packet_id}: {:?}", sub.state);
                    }
                }
            } else if packet::is_pingresp(packet_type) {
                self.last_pong_seen_ms = clock.now_ms();
            } else if packet::is_publish(packet_type) {
                let published = handle.with_buffer(|b| {
                    let view = packet::parse_publish(&b.as_slice()[..len])?;
                    let matched = self.subscriptions.iter().any(|s| topic::matches(&s.filter, view.topic));
                    if !matched {
                        return None;
                    }
                    let topic = Topic::try_from(view.topic).ok()?;
                    let payload = Vec::from_slice(view.payload).ok()?;
                    Some(PublishEvent { topic, payload })
                });
                if let Some(event) = published {
                    return PollEvent::Publish(event);
                }
            }
        }
        PollEvent::None
    }

    pub fn disconnect(&mut self, stream: &mut dyn ByteStream) {
        let mut buf: FixedBuffer<16> = FixedBuffer::new();
        if packet::build_disconnect(&mut buf) {
            stream.write_bytes(buf.as_slice());
        }
        self.state = State::Idle;
        self.decoder.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::sim::{SimByteStream, SimClock};

    fn new_client() -> MqttClient<4, 2, 256> {
        MqttClient::new("dev", 60, 1_000, MessagePool::new()).unwrap()
    }

    #[test]
    fn connect_then_connack_transitions_to_connected() {
        let mut client = new_client();
        let mut stream = SimByteStream::new();
        let clock = SimClock::new();
        assert!(client.connect(&mut stream, &clock));
        assert!(!client.is_connected());

        stream.push_inbound(&[(2 << 4), 0x02, 0x00, 0x00]);
        match client.poll::<32>(&mut stream, &clock) {
            PollEvent::Connected => {}
            _ => panic!("expected Connected event"),
        }
        assert!(client.is_connected());
    }

    #[test]
    fn connack_timeout_reports_failure() {
        let mut client = new_client();
        let mut stream = SimByteStream::new();
        let clock = SimClock::new();
        client.connect(&mut stream, &clock);
        clock.advance(1_001);
        match client.poll::<32>(&mut stream, &clock) {
            PollEvent::ConnectFailed(MqttError::ConnectTimedOut) => {}
            _ => panic!("expected ConnectFailed(ConnectTimedOut)"),
        }
    }

    #[test]
    fn subscriptions_are_flushed_on_connect() {
        let mut client = new_client();
        let mut stream = SimByteStream::new();
        let clock = SimClock::new();
        client.subscribe("sensors/+", &mut stream).unwrap();
        client.connect(&mut stream, &clock);
        stream.take_outbound();
        stream.push_inbound(&[(2 << 4), 0x02, 0x00, 0x00]);
        client.poll::<32>(&mut stream, &clock);
        let out = stream.take_outbound();
        assert_eq!(out[0] >> 4, packet::MQTT_SUBSCRIBE);
    }

    #[test]
    fn pool_exhaustion_while_connecting_reports_connect_failed() {
        let pool: MessagePool<1, 256> = MessagePool::new();
        let _held = pool.reserve_free().unwrap();
        let mut client: MqttClient<4, 1, 256> = MqttClient::new("dev", 60, 1_000, pool).unwrap();
        let mut stream = SimByteStream::new();
        let clock = SimClock::new();
        client.connect(&mut stream, &clock);
        stream.push_inbound(&[(2 << 4), 0x02, 0x00, 0x00]);
        match client.poll::<32>(&mut stream, &clock) {
            PollEvent::ConnectFailed(MqttError::PoolExhausted) => {}
            _ => panic!("expected ConnectFailed(PoolExhausted)"),
        }
    }
}
