//! Provider traits: the abstract interfaces the engines consume instead of
//! owning concrete peripheral/OS code. A real device plugs in USART,
//! `esp_timer`, and NVS; tests and the demo binary plug in [`sim`].

pub mod sim;

/// Result of a single non-blocking byte read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadByte {
    GotData(u8),
    NoData,
    Error,
}

/// A duplex byte stream: the substrate every framer reads from and writes
/// encoded frames to.
pub trait ByteStream {
    fn read_byte(&mut self) -> ReadByte;
    fn write_bytes(&mut self, data: &[u8]) -> bool;
    fn is_bound(&self) -> bool;
}

/// A monotonic millisecond clock, used for every timeout/deadline
/// comparison in the core.
pub trait MonotonicClock {
    fn now_ms(&self) -> u64;
}

/// Deferred dispatch onto the run loop owning `thread_id`. `ctx` is an
/// opaque pointer-sized token round-tripped back to `f` unchanged, the way
/// the teacher's scheduler posts boxed closures without allocating one
/// per call on embedded targets.
pub trait RunLoop {
    fn dispatch_next_iteration(&mut self, thread_id: u32, f: fn(usize), ctx: usize);
}

/// Wraps a [`ByteStream`] with TLS. Implementers supply a server CA
/// certificate and, optionally, a client certificate and key (all PEM).
pub trait TlsSocket: ByteStream {
    fn configure(&mut self, server_ca_pem: &str, client_cert_pem: Option<&str>, client_key_pem: Option<&str>) -> bool;
}

/// A small persistent key-value store, e.g. backing MQTT client id
/// persistence or BTLE bonding data.
pub trait KeyValueStore {
    fn get_string<'a>(&self, key: &str, out: &'a mut [u8]) -> Option<&'a str>;
    fn set_string(&mut self, key: &str, value: &str) -> bool;
    fn get_u8(&self, key: &str) -> Option<u8>;
    fn set_u8(&mut self, key: &str, value: u8) -> bool;
    fn get_u32(&self, key: &str) -> Option<u32>;
    fn set_u32(&mut self, key: &str, value: u32) -> bool;
    fn get_blob<'a>(&self, key: &str, out: &'a mut [u8]) -> Option<&'a [u8]>;
    fn set_blob(&mut self, key: &str, value: &[u8]) -> bool;
    fn erase(&mut self, key: &str) -> bool;
    fn commit(&mut self) -> bool;
}
