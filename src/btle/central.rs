//! Vendor-neutral BTLE central (GATT client) surface.
//!
//! [`BtleBackend`] is the vtable a vendor stack (BlueGiga, SiLabs, ESP-IDF's
//! NimBLE wrapper, or a host simulation) implements; [`BtleCentral`] is
//! generic over it rather than boxing a trait object — the backend is known
//! at compile time per build, matching how this crate already prefers
//! generics and function pointers over `dyn` ([`crate::fsm::StateActionFn`]).

use crate::btle::connection::MacAddr;
use crate::btle::uuid::Uuid;
use crate::error::BtleError;
use heapless::Vec;
use log::debug;

const MAX_SCAN_DATA: usize = 31;

/// Radio-level state a backend reports independent of any one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Off,
    Idle,
    Scanning,
}

/// The vendor vtable: scan, connect, and per-connection GATT operations.
/// Every operation is fire-and-forget from the caller's perspective —
/// completion arrives later through `on_*` callbacks on [`BtleCentral`].
pub trait BtleBackend {
    fn get_state(&self) -> BackendState;
    fn start_scan(&mut self, active: bool) -> bool;
    fn stop_scan(&mut self) -> bool;
    fn start_connection(&mut self, addr: MacAddr, is_random: bool) -> bool;
    fn stop_connection(&mut self, addr: MacAddr) -> bool;
    fn read_from_char(&mut self, addr: MacAddr, service: Uuid, chr: Uuid) -> bool;
    fn write_to_char(&mut self, addr: MacAddr, service: Uuid, chr: Uuid, data: &[u8]) -> bool;
    fn change_notifications(&mut self, addr: MacAddr, service: Uuid, chr: Uuid, enable: bool) -> bool;
}

/// A registered notification subscription: the backend reports inbound
/// notifications for `(target_mac, service_uuid, char_uuid)` to `on_rx`.
struct NotificationSubscription {
    target_mac: MacAddr,
    service_uuid: Uuid,
    char_uuid: Uuid,
    on_rx: fn(&[u8], usize),
    user_var: usize,
}

/// Scan results are delivered as `fn(addr, adv_data, user_var)`; no
/// allocation, no closures, matching the teacher's `dispatch_next_iteration`
/// calling convention.
type ScanListener = (fn(MacAddr, &[u8], usize), usize);
type ConnectListener = (fn(MacAddr, bool, usize), usize);

pub struct BtleCentral<B: BtleBackend, const MAX_SUBS: usize> {
    backend: B,
    scan_listener: Option<ScanListener>,
    connect_listener: Option<ConnectListener>,
    subscriptions: Vec<NotificationSubscription, MAX_SUBS>,
}

impl<B: BtleBackend, const MAX_SUBS: usize> BtleCentral<B, MAX_SUBS> {
    pub fn new(backend: B) -> Self {
        Self { backend, scan_listener: None, connect_listener: None, subscriptions: Vec::new() }
    }

    pub fn state(&self) -> BackendState {
        self.backend.get_state()
    }

    pub fn on_scan_result(&mut self, listener: fn(MacAddr, &[u8], usize), user_var: usize) {
        self.scan_listener = Some((listener, user_var));
    }

    pub fn on_connect_result(&mut self, listener: fn(MacAddr, bool, usize), user_var: usize) {
        self.connect_listener = Some((listener, user_var));
    }

    pub fn start_scan(&mut self, active: bool) -> bool {
        self.backend.start_scan(active)
    }

    pub fn stop_scan(&mut self) -> bool {
        self.backend.stop_scan()
    }

    pub fn connect(&mut self, addr: MacAddr, is_random: bool) -> bool {
        self.backend.start_connection(addr, is_random)
    }

    pub fn disconnect(&mut self, addr: MacAddr) -> bool {
        self.backend.stop_connection(addr)
    }

    pub fn read(&mut self, addr: MacAddr, service: Uuid, chr: Uuid) -> bool {
        self.backend.read_from_char(addr, service, chr)
    }

    pub fn write(&mut self, addr: MacAddr, service: Uuid, chr: Uuid, data: &[u8]) -> bool {
        self.backend.write_to_char(addr, service, chr, data)
    }

    /// Register a notification subscription and ask the backend to enable
    /// it. Dropped (not unsubscribed) if the backend rejects enabling it.
    pub fn subscribe(
        &mut self,
        addr: MacAddr,
        service: Uuid,
        chr: Uuid,
        on_rx: fn(&[u8], usize),
        user_var: usize,
    ) -> Result<(), BtleError> {
        if !self.backend.change_notifications(addr, service, chr, true) {
            return Err(BtleError::ProcedureFailed);
        }
        self.subscriptions
            .push(NotificationSubscription { target_mac: addr, service_uuid: service, char_uuid: chr, on_rx, user_var })
            .map_err(|_| BtleError::TableFull)
    }

    pub fn unsubscribe(&mut self, addr: MacAddr, service: Uuid, chr: Uuid) -> bool {
        let Some(pos) = self
            .subscriptions
            .iter()
            .position(|s| s.target_mac == addr && s.service_uuid.matches(service) && s.char_uuid.matches(chr))
        else {
            return false;
        };
        self.subscriptions.swap_remove(pos);
        self.backend.change_notifications(addr, service, chr, false)
    }

    /// Dispatch a notification reported by the backend to every matching
    /// subscription. Unknown `(addr, service, chr)` combinations are
    /// silently dropped, matching the BTLE connection's caching behavior.
    pub fn on_notification(&mut self, addr: MacAddr, service: Uuid, chr: Uuid, data: &[u8]) {
        let mut matched = 0u32;
        for sub in self.subscriptions.iter().filter(|s| {
            s.target_mac == addr && s.service_uuid.matches(service) && s.char_uuid.matches(chr)
        }) {
            (sub.on_rx)(data, sub.user_var);
            matched += 1;
        }
        if matched == 0 {
            debug!("BTLE notification for unknown subscription dropped");
        }
    }

    pub fn fire_scan_result(&self, addr: MacAddr, adv_data: &[u8]) {
        if let Some((f, ctx)) = self.scan_listener {
            let len = adv_data.len().min(MAX_SCAN_DATA);
            f(addr, &adv_data[..len], ctx);
        }
    }

    pub fn fire_connect_result(&self, addr: MacAddr, ok: bool) {
        if let Some((f, ctx)) = self.connect_listener {
            f(addr, ok, ctx);
        }
    }
}
