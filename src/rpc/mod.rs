//! Framed RPC transport with hierarchical node routing.
//!
//! ```text
//! ┌────────────┐   ┌──────────────────┐   ┌────────────────────────┐
//! │ ByteStream │──▶│ RpcFrameDecoder   │──▶│ wire::decode → RpcTree │
//! │ (provider) │   │ (framer::rpc_framer) │  routing + method table │
//! └────────────┘   └──────────────────┘   └────────────────────────┘
//!                                                    │
//!                                        wire::encode + encode_frame
//!                                                    ▼
//!                                          reply written back to ByteStream
//! ```
//!
//! `message` defines the envelope and path tokens, `wire` (de)serializes a
//! payload to/from bytes, `node` is the routing tree that dispatches
//! requests to registered methods and correlates synchronous responses, and
//! `transport` wires a `ByteStream` through the frame decoder and the
//! routing tree end to end.

pub mod message;
pub mod node;
pub mod transport;
pub mod wire;
