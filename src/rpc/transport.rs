//! Wires a [`ByteStream`] through [`RpcFrameDecoder`], [`wire`], and
//! [`RpcTree`] end to end: inbound bytes become a decoded frame, a decoded
//! frame becomes a dispatched request (or a delivered response), and a
//! dispatched request's reply becomes an outbound frame on the same stream.

use crate::buffer::FixedBuffer;
use crate::error::RoutingError;
use crate::framer::rpc_framer::{encode_frame, RpcFrameDecoder, RpcFrameEvent, MAX_FRAME_SIZE};
use crate::pool::MessagePool;
use crate::provider::{ByteStream, ReadByte};
use heapless::Vec;

use super::message::{Path, RpcMessageType};
use super::node::{NodeId, RouteOutcome, RpcTree};
use super::wire;

const REPLY_BUF_LEN: usize = MAX_FRAME_SIZE + 8;

/// Outcome of one [`RpcTransport::poll`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum TransportEvent {
    None,
    /// A Request or Notification frame was routed and dispatched locally.
    Dispatched { responder: NodeId },
    /// A Response frame was correlated against `origin`'s inflight table.
    ResponseDelivered,
    /// A decoded frame's destination path did not resolve to a node/method.
    NoRoute,
    /// A decoded frame's payload did not parse as a valid RPC message.
    Malformed,
    InvalidVersion(u8),
    PoolExhausted,
}

enum Dispatch<const PARAMS_CAP: usize> {
    Forwarded { responder: NodeId, reply: Option<(u16, Path, Vec<u8, PARAMS_CAP>)> },
    ResponseDelivered,
    NoRoute,
}

/// Adapts a [`ByteStream`] to the node-tree router, one frame at a time.
pub struct RpcTransport<const N: usize, const CAP: usize> {
    decoder: RpcFrameDecoder<N, CAP>,
    user_version: u8,
}

impl<const N: usize, const CAP: usize> RpcTransport<N, CAP> {
    pub fn new(pool: MessagePool<N, CAP>, user_version: u8) -> Self {
        Self { decoder: RpcFrameDecoder::new(pool), user_version }
    }

    pub fn malformed_packet_count(&self) -> u32 {
        self.decoder.malformed_packet_count()
    }

    /// Read whatever bytes are currently available off `stream`, decode at
    /// most one completed frame from them, and dispatch or correlate it
    /// against `tree`. If dispatch produces a response, the reply frame is
    /// written straight back to `stream` before returning.
    pub fn poll<const MAX_NODES: usize, const PARAMS_CAP: usize>(
        &mut self,
        stream: &mut dyn ByteStream,
        tree: &mut RpcTree<MAX_NODES, PARAMS_CAP>,
        origin: NodeId,
    ) -> TransportEvent {
        let mut byte_buf = [0u8; 1];
        while let ReadByte::GotData(b) = stream.read_byte() {
            byte_buf[0] = b;

            let mut invalid_version = None;
            let mut pool_exhausted = false;
            let mut frame = None;
            self.decoder.feed(&byte_buf, |ev| match ev {
                RpcFrameEvent::Message { version, handle, len } => frame = Some((version, handle, len)),
                RpcFrameEvent::InvalidVersion(v) => invalid_version = Some(v),
                RpcFrameEvent::PoolExhausted => pool_exhausted = true,
            });

            if pool_exhausted {
                return TransportEvent::PoolExhausted;
            }
            if let Some(v) = invalid_version {
                return TransportEvent::InvalidVersion(v);
            }
            let Some((_version, handle, len)) = frame else {
                continue;
            };

            let outcome = handle.with_buffer(|buf| Self::handle_payload(tree, origin, &buf.as_slice()[..len]));
            return match outcome {
                Ok(Dispatch::Forwarded { responder, reply }) => {
                    if let Some((id, source_path, params)) = reply {
                        self.send_reply(stream, id, &source_path, params.as_slice());
                    }
                    TransportEvent::Dispatched { responder }
                }
                Ok(Dispatch::ResponseDelivered) => TransportEvent::ResponseDelivered,
                Ok(Dispatch::NoRoute) => TransportEvent::NoRoute,
                Err(_) => TransportEvent::Malformed,
            };
        }
        TransportEvent::None
    }

    fn handle_payload<const MAX_NODES: usize, const PARAMS_CAP: usize>(
        tree: &mut RpcTree<MAX_NODES, PARAMS_CAP>,
        origin: NodeId,
        payload: &[u8],
    ) -> Result<Dispatch<PARAMS_CAP>, RoutingError> {
        let view = wire::decode(payload)?;

        if view.msg_type == RpcMessageType::Response {
            let response = Vec::from_slice(view.params).map_err(|_| RoutingError::TableFull)?;
            let delivered = tree.deliver_response(origin, view.id, response);
            return Ok(if delivered { Dispatch::ResponseDelivered } else { Dispatch::NoRoute });
        }

        match tree.dispatch_request(origin, view.destination_path, view.method_name, view.params) {
            RouteOutcome::Delivered { responder, source_path, response } => {
                let reply = response.map(|resp| (view.id, source_path, resp));
                Ok(Dispatch::Forwarded { responder, reply })
            }
            RouteOutcome::NoRoute => Ok(Dispatch::NoRoute),
        }
    }

    /// Encode and write a Response frame back upstream, addressed via
    /// `source_path` (the reverse route accumulated while dispatching the
    /// request it answers).
    fn send_reply(&self, stream: &mut dyn ByteStream, id: u16, source_path: &str, params: &[u8]) {
        let mut payload: FixedBuffer<MAX_FRAME_SIZE> = FixedBuffer::new();
        if !wire::encode(&mut payload, RpcMessageType::Response, id, "", "", source_path, params) {
            return;
        }
        let mut frame_buf = [0u8; REPLY_BUF_LEN];
        if let Some(n) = encode_frame(payload.as_slice(), self.user_version, &mut frame_buf) {
            stream.write_bytes(&frame_buf[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::sim::SimByteStream;

    fn echo(params: &[u8], response: &mut Vec<u8, 32>) -> bool {
        let _ = response.extend_from_slice(params);
        true
    }

    fn push_request(stream: &mut SimByteStream, user_version: u8, id: u16, method: &str, dest: &str, params: &[u8]) {
        let mut payload: FixedBuffer<MAX_FRAME_SIZE> = FixedBuffer::new();
        assert!(wire::encode(&mut payload, RpcMessageType::Request, id, method, "", dest, params));
        let mut frame_buf = [0u8; REPLY_BUF_LEN];
        let n = encode_frame(payload.as_slice(), user_version, &mut frame_buf).unwrap();
        stream.push_inbound(&frame_buf[..n]);
    }

    #[test]
    fn inbound_request_dispatches_and_writes_reply() {
        let mut tree: RpcTree<8, 32> = RpcTree::new();
        let root = tree.add_root("root", true, true).unwrap();
        let leaf = tree.add_subnode(root, "leaf").unwrap();
        tree.add_method(leaf, "echo", echo).unwrap();

        let pool: MessagePool<2, 128> = MessagePool::new();
        let mut transport: RpcTransport<2, 128> = RpcTransport::new(pool, 0);
        let mut stream = SimByteStream::new();
        push_request(&mut stream, 0, 9, "echo", "leaf", b"hi");

        match transport.poll(&mut stream, &mut tree, root) {
            TransportEvent::Dispatched { responder } => assert_eq!(responder, leaf),
            other => panic!("expected Dispatched, got {other:?}"),
        }

        let out = stream.take_outbound();
        assert!(!out.is_empty());
        let payload_start = 5;
        let payload_end = out.len() - 1;
        let view = wire::decode(&out[payload_start..payload_end]).unwrap();
        assert_eq!(view.msg_type, RpcMessageType::Response);
        assert_eq!(view.id, 9);
        assert_eq!(view.params, b"hi");
        assert_eq!(view.destination_path, "leaf");
    }

    #[test]
    fn inbound_request_with_unknown_route_reports_no_route() {
        let mut tree: RpcTree<8, 32> = RpcTree::new();
        let root = tree.add_root("root", true, true).unwrap();

        let pool: MessagePool<2, 128> = MessagePool::new();
        let mut transport: RpcTransport<2, 128> = RpcTransport::new(pool, 0);
        let mut stream = SimByteStream::new();
        push_request(&mut stream, 0, 1, "x", "nope", b"");

        assert_eq!(transport.poll(&mut stream, &mut tree, root), TransportEvent::NoRoute);
        assert!(stream.take_outbound().is_empty());
    }

    #[test]
    fn inbound_response_with_no_matching_inflight_reports_no_route() {
        let mut tree: RpcTree<8, 32> = RpcTree::new();
        let root = tree.add_root("root", true, true).unwrap();

        let pool: MessagePool<2, 128> = MessagePool::new();
        let mut transport: RpcTransport<2, 128> = RpcTransport::new(pool, 0);
        let mut stream = SimByteStream::new();

        let mut payload: FixedBuffer<MAX_FRAME_SIZE> = FixedBuffer::new();
        assert!(wire::encode(&mut payload, RpcMessageType::Response, 42, "", "", "", b"ack"));
        let mut frame_buf = [0u8; REPLY_BUF_LEN];
        let n = encode_frame(payload.as_slice(), 0, &mut frame_buf).unwrap();
        stream.push_inbound(&frame_buf[..n]);

        assert_eq!(transport.poll(&mut stream, &mut tree, root), TransportEvent::NoRoute);
    }

    #[test]
    fn invalid_version_frame_is_reported() {
        let mut tree: RpcTree<8, 32> = RpcTree::new();
        let root = tree.add_root("root", true, true).unwrap();

        let pool: MessagePool<2, 128> = MessagePool::new();
        let mut transport: RpcTransport<2, 128> = RpcTransport::new(pool, 0);
        let mut stream = SimByteStream::new();
        stream.push_inbound(&[0x80, 0x81, 0x06, 0x00, 0x99, 0x01, 0x00, 0x00, 0x00, 0x82]);

        assert_eq!(transport.poll(&mut stream, &mut tree, root), TransportEvent::InvalidVersion(0x99));
    }

    #[test]
    fn pool_exhaustion_is_reported_and_recoverable() {
        let mut tree: RpcTree<8, 32> = RpcTree::new();
        let root = tree.add_root("root", true, true).unwrap();
        let leaf = tree.add_subnode(root, "leaf").unwrap();
        tree.add_method(leaf, "echo", echo).unwrap();

        let pool: MessagePool<1, 128> = MessagePool::new();
        let _held = pool.reserve_free().unwrap();
        let mut transport: RpcTransport<1, 128> = RpcTransport::new(pool, 0);
        let mut stream = SimByteStream::new();
        push_request(&mut stream, 0, 1, "echo", "leaf", b"x");

        assert_eq!(transport.poll(&mut stream, &mut tree, root), TransportEvent::PoolExhausted);
    }
}
