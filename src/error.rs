//! Unified error types for the core framework.
//!
//! A single `Error` enum that every subsystem converts into, keeping
//! callback and dispatch code uniform across buffer, framer, RPC, MQTT
//! and BTLE layers. All variants are `Copy` so they can be threaded
//! through state machines without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level framework error
// ---------------------------------------------------------------------------

/// Every fallible operation in the framework funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A fixed buffer or pool could not accept another item.
    CapacityExceeded,
    /// Wire bytes did not satisfy the protocol in effect.
    Malformed,
    /// A waited-for event did not occur before its deadline.
    Timeout,
    /// The underlying byte stream returned an error.
    TransportIo,
    /// The peer sent a protocol-level refusal.
    PeerRefused,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded => write!(f, "capacity exceeded"),
            Self::Malformed => write!(f, "malformed packet"),
            Self::Timeout => write!(f, "timed out"),
            Self::TransportIo => write!(f, "transport I/O error"),
            Self::PeerRefused => write!(f, "peer refused"),
        }
    }
}

// ---------------------------------------------------------------------------
// Buffer errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// Append/insert would exceed the buffer's fixed capacity.
    CapacityExceeded,
    /// The requested index or range is outside the buffer's current length.
    OutOfBounds,
    /// A length-prefixed or C-string field was not terminated within bounds.
    Truncated,
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded => write!(f, "buffer capacity exceeded"),
            Self::OutOfBounds => write!(f, "index out of bounds"),
            Self::Truncated => write!(f, "field truncated"),
        }
    }
}

impl From<BufferError> for Error {
    fn from(e: BufferError) -> Self {
        match e {
            BufferError::CapacityExceeded => Self::CapacityExceeded,
            BufferError::OutOfBounds | BufferError::Truncated => Self::Malformed,
        }
    }
}

// ---------------------------------------------------------------------------
// Framer errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerError {
    /// Header or trailer bytes did not match the expected pattern.
    BadHeader,
    /// The declared payload length exceeds the framer's maximum frame size.
    FrameTooLarge,
    /// A variable-length-encoded field used more bytes than the format allows.
    BadVarint,
    /// No free buffer was available in the message pool.
    PoolExhausted,
}

impl fmt::Display for FramerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadHeader => write!(f, "bad frame header"),
            Self::FrameTooLarge => write!(f, "frame exceeds maximum size"),
            Self::BadVarint => write!(f, "malformed variable-length field"),
            Self::PoolExhausted => write!(f, "message pool exhausted"),
        }
    }
}

impl From<FramerError> for Error {
    fn from(e: FramerError) -> Self {
        match e {
            FramerError::BadHeader | FramerError::BadVarint => Self::Malformed,
            FramerError::FrameTooLarge | FramerError::PoolExhausted => Self::CapacityExceeded,
        }
    }
}

// ---------------------------------------------------------------------------
// RPC routing errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingError {
    /// No subnode matched the next path component.
    NoRoute,
    /// The node's subnode or method table is full.
    TableFull,
    /// A synchronous request's response did not arrive before its deadline.
    RequestTimedOut,
    /// All inflight-request ids are in use.
    NoFreeRequestId,
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRoute => write!(f, "no matching route"),
            Self::TableFull => write!(f, "node table full"),
            Self::RequestTimedOut => write!(f, "sync request timed out"),
            Self::NoFreeRequestId => write!(f, "no free inflight request id"),
        }
    }
}

impl From<RoutingError> for Error {
    fn from(e: RoutingError) -> Self {
        match e {
            RoutingError::NoRoute => Self::Malformed,
            RoutingError::TableFull | RoutingError::NoFreeRequestId => Self::CapacityExceeded,
            RoutingError::RequestTimedOut => Self::Timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// MQTT errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MqttError {
    /// CONNACK did not arrive before the connect timeout.
    ConnectTimedOut,
    /// Broker refused the connection (non-zero CONNACK return code).
    ConnectRefused(u8),
    /// Broker refused a subscription (SUBACK 0x80).
    SubscribeRefused,
    /// The subscription or will-message table is full.
    TableFull,
    /// The underlying stream faulted.
    TransportIo,
    /// No free buffer was available in the message pool to hold an inbound
    /// packet's body.
    PoolExhausted,
}

impl fmt::Display for MqttError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectTimedOut => write!(f, "CONNACK timed out"),
            Self::ConnectRefused(code) => write!(f, "broker refused connect (code {code})"),
            Self::SubscribeRefused => write!(f, "broker refused subscription"),
            Self::TableFull => write!(f, "subscription table full"),
            Self::TransportIo => write!(f, "transport I/O error"),
            Self::PoolExhausted => write!(f, "message pool exhausted"),
        }
    }
}

impl From<MqttError> for Error {
    fn from(e: MqttError) -> Self {
        match e {
            MqttError::ConnectTimedOut => Self::Timeout,
            MqttError::ConnectRefused(_) | MqttError::SubscribeRefused => Self::PeerRefused,
            MqttError::TableFull | MqttError::PoolExhausted => Self::CapacityExceeded,
            MqttError::TransportIo => Self::TransportIo,
        }
    }
}

// ---------------------------------------------------------------------------
// BTLE errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BtleError {
    /// A GATT procedure (discover/read/write/subscribe) did not complete in time.
    ProcedureTimedOut,
    /// The peer or stack reported a non-zero result for a procedure.
    ProcedureFailed,
    /// The connection, subscription, or scan-callback table is full.
    TableFull,
    /// Called while the connection or manager was in a state that forbids it.
    BadState,
}

impl fmt::Display for BtleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProcedureTimedOut => write!(f, "BTLE procedure timed out"),
            Self::ProcedureFailed => write!(f, "BTLE procedure failed"),
            Self::TableFull => write!(f, "BTLE table full"),
            Self::BadState => write!(f, "invalid state for operation"),
        }
    }
}

impl From<BtleError> for Error {
    fn from(e: BtleError) -> Self {
        match e {
            BtleError::ProcedureTimedOut => Self::Timeout,
            BtleError::ProcedureFailed => Self::PeerRefused,
            BtleError::TableFull => Self::CapacityExceeded,
            BtleError::BadState => Self::Malformed,
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Framework-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
