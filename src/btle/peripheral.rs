//! Vendor-neutral BTLE peripheral (GATT server) surface.
//!
//! Deliberately thin: advertise, start/stop, and read/write/subscribe
//! callbacks for a small table of local characteristics. There is no
//! peripheral-side state machine in this crate — a peripheral's GATT
//! server is driven entirely by the vendor stack; this is the vtable a
//! backend implements and the callback table user code registers against.

use crate::btle::connection::MacAddr;
use crate::btle::uuid::Uuid;
use heapless::Vec;

const MAX_LOCAL_CHARS: usize = 8;

/// The vendor vtable for peripheral (advertiser/server) operation.
pub trait BtlePeripheralBackend {
    fn start_advertising(&mut self, adv_data: &[u8]) -> bool;
    fn stop_advertising(&mut self) -> bool;
    fn notify(&mut self, addr: MacAddr, service: Uuid, chr: Uuid, data: &[u8]) -> bool;
}

/// A local characteristic served to connected centrals, identified by
/// `(service_uuid, char_uuid)`. `on_read`/`on_write` are invoked by the
/// backend when a remote central performs the corresponding GATT
/// operation; `on_subscribed` fires when a remote central enables or
/// disables notifications for it.
struct LocalCharacteristic {
    service_uuid: Uuid,
    char_uuid: Uuid,
    on_read: fn(MacAddr, usize) -> Option<(usize, usize)>,
    on_write: fn(MacAddr, &[u8], usize) -> bool,
    on_subscribed: Option<fn(MacAddr, bool, usize)>,
    user_var: usize,
}

pub struct BtlePeripheral<B: BtlePeripheralBackend, const MAX_CHARS: usize = MAX_LOCAL_CHARS> {
    backend: B,
    characteristics: Vec<LocalCharacteristic, MAX_CHARS>,
}

impl<B: BtlePeripheralBackend, const MAX_CHARS: usize> BtlePeripheral<B, MAX_CHARS> {
    pub fn new(backend: B) -> Self {
        Self { backend, characteristics: Vec::new() }
    }

    pub fn start_advertising(&mut self, adv_data: &[u8]) -> bool {
        self.backend.start_advertising(adv_data)
    }

    pub fn stop_advertising(&mut self) -> bool {
        self.backend.stop_advertising()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn register_characteristic(
        &mut self,
        service_uuid: Uuid,
        char_uuid: Uuid,
        on_read: fn(MacAddr, usize) -> Option<(usize, usize)>,
        on_write: fn(MacAddr, &[u8], usize) -> bool,
        on_subscribed: Option<fn(MacAddr, bool, usize)>,
        user_var: usize,
    ) -> bool {
        self.characteristics
            .push(LocalCharacteristic { service_uuid, char_uuid, on_read, on_write, on_subscribed, user_var })
            .is_ok()
    }

    fn find(&self, service: Uuid, chr: Uuid) -> Option<&LocalCharacteristic> {
        self.characteristics.iter().find(|c| c.service_uuid.matches(service) && c.char_uuid.matches(chr))
    }

    /// The backend calls this when a remote central issues a GATT write.
    /// Returns whether the write was accepted (an unregistered
    /// characteristic is always rejected).
    pub fn on_remote_write(&self, addr: MacAddr, service: Uuid, chr: Uuid, data: &[u8]) -> bool {
        match self.find(service, chr) {
            Some(c) => (c.on_write)(addr, data, c.user_var),
            None => false,
        }
    }

    /// The backend calls this to fetch the value for a remote GATT read.
    /// The callback's `(usize, usize)` return is backend-defined (a
    /// buffer handle and length, not owned data — this core never copies
    /// characteristic values).
    pub fn on_remote_read(&self, addr: MacAddr, service: Uuid, chr: Uuid) -> Option<(usize, usize)> {
        let c = self.find(service, chr)?;
        (c.on_read)(addr, c.user_var)
    }

    pub fn on_remote_subscription_changed(&self, addr: MacAddr, service: Uuid, chr: Uuid, enabled: bool) {
        if let Some(c) = self.find(service, chr) {
            if let Some(cb) = c.on_subscribed {
                cb(addr, enabled, c.user_var);
            }
        }
    }

    pub fn notify(&mut self, addr: MacAddr, service: Uuid, chr: Uuid, data: &[u8]) -> bool {
        self.backend.notify(addr, service, chr, data)
    }
}
