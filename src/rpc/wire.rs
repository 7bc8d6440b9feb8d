//! RPC payload wire format.
//!
//! `type(1) + [id(2, LE) for Request/Response] + [method_name NUL (Request)]
//! + source_path NUL + destination_path NUL + params bytes`

use super::message::RpcMessageType;
use crate::buffer::linked_field::LinkedFieldChain;
use crate::buffer::FixedBuffer;
use crate::error::RoutingError;

/// A borrowed, zero-copy view over a decoded RPC payload.
pub struct RpcView<'a> {
    pub msg_type: RpcMessageType,
    pub id: u16,
    pub method_name: &'a str,
    pub source_path: &'a str,
    pub destination_path: &'a str,
    pub params: &'a [u8],
}

/// Decode a received payload (already stripped of frame header/trailer).
pub fn decode(payload: &[u8]) -> Result<RpcView<'_>, RoutingError> {
    if payload.is_empty() {
        return Err(RoutingError::NoRoute);
    }
    let msg_type = RpcMessageType::from_wire(payload[0]).ok_or(RoutingError::NoRoute)?;
    let mut cursor = 1usize;

    let id = if matches!(msg_type, RpcMessageType::Request | RpcMessageType::Response) {
        let bytes = payload.get(cursor..cursor + 2).ok_or(RoutingError::NoRoute)?;
        cursor += 2;
        u16::from_le_bytes([bytes[0], bytes[1]])
    } else {
        0
    };

    let method_name = if matches!(msg_type, RpcMessageType::Request | RpcMessageType::Notification) {
        let (s, consumed) = read_cstr(payload, cursor)?;
        cursor += consumed;
        s
    } else {
        ""
    };

    let (source_path, consumed) = read_cstr(payload, cursor)?;
    cursor += consumed;

    let (destination_path, consumed) = read_cstr(payload, cursor)?;
    cursor += consumed;

    let params = payload.get(cursor..).ok_or(RoutingError::NoRoute)?;

    Ok(RpcView { msg_type, id, method_name, source_path, destination_path, params })
}

fn read_cstr(bytes: &[u8], start: usize) -> Result<(&str, usize), RoutingError> {
    let rest = bytes.get(start..).ok_or(RoutingError::NoRoute)?;
    let nul_at = rest.iter().position(|&b| b == 0).ok_or(RoutingError::NoRoute)?;
    let s = core::str::from_utf8(&rest[..nul_at]).map_err(|_| RoutingError::NoRoute)?;
    Ok((s, nul_at + 1))
}

/// Build the NUL-terminated variable-length section of a payload (method
/// name, source path, destination path, params) as a chain of linked
/// fields over `body`, in wire order. `None` on capacity failure.
fn build_body<const N: usize>(
    body: &mut FixedBuffer<N>,
    has_method: bool,
    method_name: &str,
    source_path: &str,
    destination_path: &str,
    params: &[u8],
) -> Option<()> {
    let mut chain: LinkedFieldChain<N, 4> = LinkedFieldChain::new(body);
    let method_field = if has_method { Some(chain.add_field(None).ok()?) } else { None };
    let source_field = chain.add_field(None).ok()?;
    let dest_field = chain.add_field(None).ok()?;
    let params_field = chain.add_field(None).ok()?;

    if let Some(idx) = method_field {
        chain.field_append(idx, method_name.as_bytes()).ok()?;
        chain.field_append(idx, &[0]).ok()?;
    }
    chain.field_append(source_field, source_path.as_bytes()).ok()?;
    chain.field_append(source_field, &[0]).ok()?;
    chain.field_append(dest_field, destination_path.as_bytes()).ok()?;
    chain.field_append(dest_field, &[0]).ok()?;
    chain.field_append(params_field, params).ok()?;
    Some(())
}

/// Encode a payload into `out`. Returns `false` on capacity failure (and
/// leaves `out` at its prior length).
#[allow(clippy::too_many_arguments)]
pub fn encode<const N: usize>(
    out: &mut FixedBuffer<N>,
    msg_type: RpcMessageType,
    id: u16,
    method_name: &str,
    source_path: &str,
    destination_path: &str,
    params: &[u8],
) -> bool {
    let start_len = out.len();
    let has_method = matches!(msg_type, RpcMessageType::Request | RpcMessageType::Notification);
    let has_id = matches!(msg_type, RpcMessageType::Request | RpcMessageType::Response);

    let mut ok = out.append_u8(msg_type.to_wire()) && (!has_id || out.append_u16le(id));

    if ok {
        let mut body: FixedBuffer<N> = FixedBuffer::new();
        ok = build_body(&mut body, has_method, method_name, source_path, destination_path, params).is_some()
            && out.append(body.as_slice());
    }

    if !ok {
        out.remove(start_len, out.len() - start_len);
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_request_round_trip() {
        let mut buf: FixedBuffer<128> = FixedBuffer::new();
        assert!(encode(&mut buf, RpcMessageType::Request, 7, "getTemp", "", "sensors/temp", b"xyz"));
        let view = decode(buf.as_slice()).unwrap();
        assert_eq!(view.id, 7);
        assert_eq!(view.method_name, "getTemp");
        assert_eq!(view.destination_path, "sensors/temp");
        assert_eq!(view.params, b"xyz");
    }

    #[test]
    fn encode_decode_response_has_no_method_name() {
        let mut buf: FixedBuffer<64> = FixedBuffer::new();
        assert!(encode(&mut buf, RpcMessageType::Response, 7, "", "leaf/root", "", b"ok"));
        let view = decode(buf.as_slice()).unwrap();
        assert_eq!(view.msg_type, RpcMessageType::Response);
        assert_eq!(view.id, 7);
        assert_eq!(view.source_path, "leaf/root");
        assert_eq!(view.params, b"ok");
    }

    #[test]
    fn scenario_empty_request_frame_payload() {
        let view = decode(&[0x01, 0x00, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(view.msg_type, RpcMessageType::Request);
        assert_eq!(view.id, 0);
        assert_eq!(view.method_name, "");
        assert_eq!(view.source_path, "");
        assert_eq!(view.destination_path, "");
        assert!(view.params.is_empty());
    }
}
