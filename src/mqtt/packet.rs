//! MQTT 3.1.1 control packet (de)serialization for the subset this client
//! speaks: CONNECT, CONNACK, PUBLISH, SUBSCRIBE, SUBACK, PINGREQ, PINGRESP.
//!
//! Remaining-length framing is handled by [`crate::framer::mqtt_framer`];
//! this module only (de)serializes the variable header + payload of each
//! packet type, and only supports QoS 0 (see [`super::client::MqttClient`]).

use crate::buffer::FixedBuffer;
use crate::framer::encode_varint;
use crate::framer::mqtt_framer::{MQTT_CONNACK, MQTT_PINGRESP, MQTT_PUBLISH, MQTT_SUBACK};

pub const MQTT_CONNECT: u8 = 1;
pub const MQTT_SUBSCRIBE: u8 = 8;
pub const MQTT_PINGREQ: u8 = 12;
pub const MQTT_DISCONNECT: u8 = 14;

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4;

/// Encode a string with a 16-bit BE length prefix (MQTT's "UTF-8 encoded
/// string" primitive) directly into a variable-header/payload buffer.
fn append_mqtt_string<const N: usize>(out: &mut FixedBuffer<N>, s: &str) -> bool {
    if s.len() > u16::MAX as usize {
        return false;
    }
    out.append_u16be(s.len() as u16) && out.append(s.as_bytes())
}

fn read_mqtt_string(bytes: &[u8], at: usize) -> Option<(&str, usize)> {
    let len = u16::from_be_bytes(bytes.get(at..at + 2)?.try_into().ok()?) as usize;
    let start = at + 2;
    let s = core::str::from_utf8(bytes.get(start..start + len)?).ok()?;
    Some((s, 2 + len))
}

/// Build a complete CONNECT packet (fixed header + variable header +
/// payload) into `out`. Will-message and credentials are optional.
#[allow(clippy::too_many_arguments)]
pub fn build_connect<const N: usize>(
    out: &mut FixedBuffer<N>,
    client_id: &str,
    keepalive_s: u16,
    clean_session: bool,
    will: Option<(&str, &[u8])>,
    username: Option<&str>,
    password: Option<&str>,
) -> bool {
    let mut body: FixedBuffer<N> = FixedBuffer::new();
    let ok = append_mqtt_string(&mut body, PROTOCOL_NAME)
        && body.append_u8(PROTOCOL_LEVEL)
        && {
            let flags = ((username.is_some() as u8) << 7)
                | ((password.is_some() as u8) << 6)
                | ((will.is_some() as u8) << 2)
                | ((clean_session as u8) << 1);
            body.append_u8(flags)
        }
        && body.append_u16be(keepalive_s)
        && append_mqtt_string(&mut body, client_id)
        && will.is_none_or(|(topic, payload)| {
            append_mqtt_string(&mut body, topic) && body.append_u16be(payload.len() as u16) && body.append(payload)
        })
        && username.is_none_or(|u| append_mqtt_string(&mut body, u))
        && password.is_none_or(|p| append_mqtt_string(&mut body, p));
    ok && write_fixed_header(out, MQTT_CONNECT, 0, body.as_slice())
}

fn write_fixed_header<const N: usize>(out: &mut FixedBuffer<N>, packet_type: u8, flags: u8, body: &[u8]) -> bool {
    let mut varint_buf = [0u8; 4];
    let Some(n) = encode_varint(body.len() as u32, &mut varint_buf) else {
        return false;
    };
    out.append_u8((packet_type << 4) | flags) && out.append(&varint_buf[..n]) && out.append(body)
}

/// Parsed CONNACK: `(session_present, return_code)`.
pub fn parse_connack(payload: &[u8]) -> Option<(bool, u8)> {
    if payload.len() < 2 || payload[0] & 0xfe != 0 {
        return None;
    }
    Some((payload[0] & 1 != 0, payload[1]))
}

/// A borrowed view over a received PUBLISH's variable header + payload.
pub struct PublishView<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
}

pub fn parse_publish(payload: &[u8]) -> Option<PublishView<'_>> {
    let (topic, consumed) = read_mqtt_string(payload, 0)?;
    Some(PublishView { topic, payload: payload.get(consumed..)? })
}

/// Build a QoS-0 PUBLISH packet.
pub fn build_publish<const N: usize>(out: &mut FixedBuffer<N>, topic: &str, payload: &[u8], retain: bool) -> bool {
    let mut body: FixedBuffer<N> = FixedBuffer::new();
    let ok = append_mqtt_string(&mut body, topic) && body.append(payload);
    ok && write_fixed_header(out, MQTT_PUBLISH, u8::from(retain), body.as_slice())
}

/// Build a SUBSCRIBE packet for a single filter at QoS 0.
pub fn build_subscribe<const N: usize>(out: &mut FixedBuffer<N>, packet_id: u16, filter: &str) -> bool {
    let mut body: FixedBuffer<N> = FixedBuffer::new();
    let ok = body.append_u16be(packet_id) && append_mqtt_string(&mut body, filter) && body.append_u8(0);
    ok && write_fixed_header(out, MQTT_SUBSCRIBE, 0b0010, body.as_slice())
}

/// Parsed SUBACK: `(packet_id, return_code)`. A return code of `0x80`
/// means the broker refused the subscription.
pub fn parse_suback(payload: &[u8]) -> Option<(u16, u8)> {
    if payload.len() < 3 {
        return None;
    }
    Some((u16::from_be_bytes([payload[0], payload[1]]), payload[2]))
}

pub fn build_pingreq<const N: usize>(out: &mut FixedBuffer<N>) -> bool {
    write_fixed_header(out, MQTT_PINGREQ, 0, &[])
}

pub fn build_disconnect<const N: usize>(out: &mut FixedBuffer<N>) -> bool {
    write_fixed_header(out, MQTT_DISCONNECT, 0, &[])
}

pub fn is_pingresp(packet_type: u8) -> bool {
    packet_type == MQTT_PINGRESP
}
pub fn is_connack(packet_type: u8) -> bool {
    packet_type == MQTT_CONNACK
}
pub fn is_publish(packet_type: u8) -> bool {
    packet_type == MQTT_PUBLISH
}
pub fn is_suback(packet_type: u8) -> bool {
    packet_type == MQTT_SUBACK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framer::mqtt_framer::{MqttFrameDecoder, MqttFrameEvent};
    use crate::pool::MessagePool;

    #[test]
    fn connect_round_trips_through_framer() {
        let mut buf: FixedBuffer<128> = FixedBuffer::new();
        assert!(build_connect(&mut buf, "device-1", 60, true, None, None, None));

        let pool: MessagePool<2, 256> = MessagePool::new();
        let mut dec: MqttFrameDecoder<2, 256> = MqttFrameDecoder::new(pool);
        let mut seen_type = None;
        dec.feed(buf.as_slice(), |ev| {
            if let MqttFrameEvent::Packet(view) = ev {
                seen_type = Some(view.packet_type);
            }
        });
        assert_eq!(seen_type, Some(MQTT_CONNECT));
    }

    #[test]
    fn publish_round_trip_topic_and_payload() {
        let mut buf: FixedBuffer<128> = FixedBuffer::new();
        assert!(build_publish(&mut buf, "sensors/temp", b"21.5", false));

        let pool: MessagePool<2, 256> = MessagePool::new();
        let mut dec: MqttFrameDecoder<2, 256> = MqttFrameDecoder::new(pool);
        let mut view_topic = None;
        let mut view_payload = None;
        dec.feed(buf.as_slice(), |ev| {
            if let MqttFrameEvent::Packet(view) = ev {
                view.payload.with_buffer(|b| {
                    let v = parse_publish(&b.as_slice()[..view.len]).unwrap();
                    view_topic = Some(v.topic.to_string());
                    view_payload = Some(v.payload.to_vec());
                });
            }
        });
        assert_eq!(view_topic.unwrap(), "sensors/temp");
        assert_eq!(view_payload.unwrap(), b"21.5");
    }

    #[test]
    fn connack_parses_session_present_and_code() {
        assert_eq!(parse_connack(&[0x01, 0x00]), Some((true, 0)));
        assert_eq!(parse_connack(&[0x00, 0x05]), Some((false, 5)));
    }

    #[test]
    fn suback_parses_packet_id_and_code() {
        let mut buf: FixedBuffer<64> = FixedBuffer::new();
        assert!(build_subscribe(&mut buf, 42, "a/b"));
        assert_eq!(parse_suback(&[0x00, 0x2a, 0x80]), Some((42, 0x80)));
    }

    #[test]
    fn pingreq_has_zero_length_body() {
        let mut buf: FixedBuffer<8> = FixedBuffer::new();
        assert!(build_pingreq(&mut buf));
        assert_eq!(buf.as_slice(), &[(MQTT_PINGREQ << 4), 0x00]);
    }
}
