//! Portable embedded RPC, MQTT, and BTLE framework.
//!
//! Three protocol engines — a framed RPC transport with node-tree routing,
//! an MQTT 3.1.1 client, and a BTLE central/peripheral abstraction — built
//! on two shared substrates: fixed-capacity byte buffers and a pool-backed
//! byte-stream framer. Everything is cooperative and single-threaded per
//! engine; no engine owns dynamic allocation outside `provider::sim`
//! (host-only test/demo code).
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     provider (outer ring)                      │
//! │   ByteStream   MonotonicClock   RunLoop   TlsSocket   KVStore   │
//! │                                                                 │
//! │  ──────────────────── engines (this crate) ──────────────────  │
//! │                                                                 │
//! │   rpc::{node, message, wire}    mqtt::{client, packet, topic}   │
//! │   btle::{connection, connection_manager, central, peripheral}   │
//! │                                                                 │
//! │  ───────────────────── shared substrates ────────────────────  │
//! │                                                                 │
//! │         buffer::{FixedBuffer, LinkedField}    pool    framer    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![deny(unused_must_use)]

pub mod btle;
pub mod buffer;
pub mod config;
pub mod framer;
pub mod fsm;
pub mod mqtt;
pub mod pool;
pub mod provider;
pub mod rpc;

mod error;

pub use error::{Error, Result};
