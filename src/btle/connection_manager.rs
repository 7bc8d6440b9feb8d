//! Persistent-connection manager: drives a single target MAC through
//! reconnects, using the same function-pointer state-table engine as
//! [`crate::btle::connection`].
//!
//! `Stopped → WaitForBtlecReady → Connecting → Connected → (Disconnecting |
//! ConnectStandoff → Connecting)`. Commands (`start`/`stop`) are latched
//! onto [`CmCtx::current_command`] rather than acted on immediately — a
//! `stop()` during `Connecting` is honored once that attempt resolves; a
//! `start(new_mac)` during `Connected` is recorded as a `Restart` and takes
//! effect after the current connection is torn down. This guarantees no
//! two connect attempts are ever in flight at once.

use crate::btle::connection::MacAddr;
use crate::btle::uuid::Uuid;
use crate::error::BtleError;
use crate::fsm::{Fsm, StateDescriptor};
use heapless::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmStateId {
    Stopped = 0,
    WaitForBtlecReady = 1,
    Connecting = 2,
    Connected = 3,
    Disconnecting = 4,
    ConnectStandoff = 5,
}
const STATE_COUNT: usize = 6;

impl From<CmStateId> for usize {
    fn from(v: CmStateId) -> usize {
        v as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Stop,
    Restart,
}

/// One entry of the target subscription state the manager drives the
/// connection through on every entry to `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionStateEntry {
    pub is_subscribed: bool,
    pub service_uuid: Uuid,
    pub char_uuid: Uuid,
}

pub struct CmCtx<const MAX_SUBS: usize> {
    target_mac: MacAddr,
    next_mac: Option<MacAddr>,
    current_command: Command,
    backend_ready: bool,
    connect_result: Option<bool>,
    disconnect_acked: bool,
    unexpected_disconnect: bool,
    subscription_states: Vec<SubscriptionStateEntry, MAX_SUBS>,
    current_entry_index: Option<usize>,
    sub_change_result: Option<bool>,
    sub_complete_listener: Option<(fn(bool, usize), usize)>,
    now_ms: u64,
    deadline_ms: u64,
    standoff_ms: u64,
}

impl<const MAX_SUBS: usize> CmCtx<MAX_SUBS> {
    fn new(standoff_ms: u64) -> Self {
        Self {
            target_mac: [0; 6],
            next_mac: None,
            current_command: Command::Stop,
            backend_ready: false,
            connect_result: None,
            disconnect_acked: false,
            unexpected_disconnect: false,
            subscription_states: Vec::new(),
            current_entry_index: None,
            sub_change_result: None,
            sub_complete_listener: None,
            now_ms: 0,
            deadline_ms: 0,
            standoff_ms,
        }
    }

    fn arm_standoff(&mut self) {
        self.deadline_ms = self.now_ms + self.standoff_ms;
    }

    fn timed_out(&self) -> bool {
        self.now_ms >= self.deadline_ms
    }

    fn apply_next_mac(&mut self) {
        if let Some(mac) = self.next_mac.take() {
            self.target_mac = mac;
        }
    }

    fn fire_sub_complete(&self, success: bool) {
        if let Some((f, ctx)) = self.sub_complete_listener {
            f(success, ctx);
        }
    }
}

fn stopped_update<const N: usize>(ctx: &mut CmCtx<N>) -> Option<CmStateId> {
    matches!(ctx.current_command, Command::Run).then_some(CmStateId::WaitForBtlecReady)
}

fn wait_for_btlec_ready_update<const N: usize>(ctx: &mut CmCtx<N>) -> Option<CmStateId> {
    if ctx.current_command == Command::Stop {
        return Some(CmStateId::Stopped);
    }
    ctx.backend_ready.then_some(CmStateId::Connecting)
}

fn connecting_enter<const N: usize>(ctx: &mut CmCtx<N>) {
    ctx.connect_result = None;
}

fn connecting_update<const N: usize>(ctx: &mut CmCtx<N>) -> Option<CmStateId> {
    let ok = ctx.connect_result.take()?;
    match ctx.current_command {
        Command::Stop => Some(if ok { CmStateId::Disconnecting } else { CmStateId::Stopped }),
        Command::Restart => {
            if ok {
                // Keep target_mac pointed at the attempt that just
                // succeeded until Disconnecting tears it down; `next_mac`
                // is only applied once that connection is actually gone.
                Some(CmStateId::Disconnecting)
            } else {
                ctx.apply_next_mac();
                ctx.current_command = Command::Run;
                Some(CmStateId::ConnectStandoff)
            }
        }
        Command::Run => Some(if ok { CmStateId::Connected } else { CmStateId::ConnectStandoff }),
    }
}

fn connected_enter<const N: usize>(ctx: &mut CmCtx<N>) {
    ctx.current_entry_index = if ctx.subscription_states.is_empty() { None } else { Some(0) };
    ctx.sub_change_result = None;
    ctx.unexpected_disconnect = false;
}

fn connected_update<const N: usize>(ctx: &mut CmCtx<N>) -> Option<CmStateId> {
    if ctx.current_command != Command::Run {
        return Some(CmStateId::Disconnecting);
    }
    if ctx.unexpected_disconnect {
        ctx.unexpected_disconnect = false;
        return Some(CmStateId::ConnectStandoff);
    }
    let idx = ctx.current_entry_index?;
    match ctx.sub_change_result.take() {
        Some(true) => {
            let next = idx + 1;
            if next >= ctx.subscription_states.len() {
                ctx.fire_sub_complete(true);
                ctx.current_entry_index = None;
            } else {
                ctx.current_entry_index = Some(next);
            }
        }
        Some(false) => {
            ctx.fire_sub_complete(false);
            ctx.current_entry_index = None;
        }
        None => {}
    }
    None
}

fn disconnecting_enter<const N: usize>(ctx: &mut CmCtx<N>) {
    ctx.disconnect_acked = false;
}

fn disconnecting_update<const N: usize>(ctx: &mut CmCtx<N>) -> Option<CmStateId> {
    if !ctx.disconnect_acked {
        return None;
    }
    ctx.disconnect_acked = false;
    if ctx.current_command == Command::Restart {
        ctx.apply_next_mac();
        ctx.current_command = Command::Run;
        Some(CmStateId::Connecting)
    } else {
        Some(CmStateId::Stopped)
    }
}

fn connect_standoff_enter<const N: usize>(ctx: &mut CmCtx<N>) {
    ctx.arm_standoff();
}

fn connect_standoff_update<const N: usize>(ctx: &mut CmCtx<N>) -> Option<CmStateId> {
    if ctx.current_command == Command::Stop {
        return Some(CmStateId::Stopped);
    }
    ctx.timed_out().then_some(CmStateId::Connecting)
}

fn build_table<const N: usize>() -> [StateDescriptor<CmCtx<N>, CmStateId>; STATE_COUNT] {
    [
        StateDescriptor { id: CmStateId::Stopped, name: "Stopped", on_enter: None, on_exit: None, on_update: stopped_update },
        StateDescriptor {
            id: CmStateId::WaitForBtlecReady,
            name: "WaitForBtlecReady",
            on_enter: None,
            on_exit: None,
            on_update: wait_for_btlec_ready_update,
        },
        StateDescriptor {
            id: CmStateId::Connecting,
            name: "Connecting",
            on_enter: Some(connecting_enter),
            on_exit: None,
            on_update: connecting_update,
        },
        StateDescriptor {
            id: CmStateId::Connected,
            name: "Connected",
            on_enter: Some(connected_enter),
            on_exit: None,
            on_update: connected_update,
        },
        StateDescriptor {
            id: CmStateId::Disconnecting,
            name: "Disconnecting",
            on_enter: Some(disconnecting_enter),
            on_exit: None,
            on_update: disconnecting_update,
        },
        StateDescriptor {
            id: CmStateId::ConnectStandoff,
            name: "ConnectStandoff",
            on_enter: Some(connect_standoff_enter),
            on_exit: None,
            on_update: connect_standoff_update,
        },
    ]
}

/// Drives one persistent connection (through reconnects) to a target MAC.
pub struct BtleConnectionManager<const MAX_SUBS: usize> {
    fsm: Fsm<CmCtx<MAX_SUBS>, CmStateId, STATE_COUNT>,
    ctx: CmCtx<MAX_SUBS>,
}

impl<const MAX_SUBS: usize> BtleConnectionManager<MAX_SUBS> {
    pub fn new(standoff_ms: u64) -> Self {
        let mut ctx = CmCtx::new(standoff_ms);
        let mut fsm = Fsm::new(build_table(), CmStateId::Stopped);
        fsm.start(&mut ctx);
        Self { fsm, ctx }
    }

    pub fn state(&self) -> CmStateId {
        self.fsm.current_id()
    }

    pub fn current_target_mac(&self) -> MacAddr {
        self.ctx.target_mac
    }

    /// Begin (or redirect) the managed connection to `mac`. If a connect
    /// attempt is already in flight, this latches as a `Restart` and takes
    /// effect once that attempt resolves.
    pub fn start(&mut self, mac: MacAddr, now_ms: u64) {
        self.ctx.now_ms = now_ms;
        if self.state() == CmStateId::Stopped {
            self.ctx.target_mac = mac;
            self.ctx.current_command = Command::Run;
        } else if mac != self.ctx.target_mac {
            self.ctx.next_mac = Some(mac);
            self.ctx.current_command = Command::Restart;
        }
        self.pump();
    }

    /// Request a full stop. Honored immediately if idle, or latched until
    /// the in-flight connect attempt resolves.
    pub fn stop(&mut self, now_ms: u64) {
        self.ctx.now_ms = now_ms;
        self.ctx.current_command = Command::Stop;
        self.pump();
    }

    pub fn on_backend_ready(&mut self, now_ms: u64) {
        self.ctx.now_ms = now_ms;
        self.ctx.backend_ready = true;
        self.pump();
    }

    pub fn on_connect_result(&mut self, ok: bool, now_ms: u64) {
        self.ctx.now_ms = now_ms;
        self.ctx.connect_result = Some(ok);
        self.pump();
    }

    pub fn on_disconnect_ack(&mut self, now_ms: u64) {
        self.ctx.now_ms = now_ms;
        self.ctx.disconnect_acked = true;
        self.pump();
    }

    pub fn on_unexpected_disconnect(&mut self, now_ms: u64) {
        self.ctx.now_ms = now_ms;
        self.ctx.unexpected_disconnect = true;
        self.pump();
    }

    pub fn tick(&mut self, now_ms: u64) {
        self.ctx.now_ms = now_ms;
        self.pump();
    }

    pub fn set_target_subscription_state(&mut self, entries: &[SubscriptionStateEntry]) -> Result<(), BtleError> {
        self.ctx.subscription_states = Vec::from_slice(entries).map_err(|_| BtleError::TableFull)?;
        Ok(())
    }

    pub fn on_sub_complete(&mut self, listener: fn(bool, usize), user_var: usize) {
        self.ctx.sub_complete_listener = Some((listener, user_var));
    }

    /// The subscribe/unsubscribe entry the manager is currently waiting on,
    /// if any. External code (the BTLE central wiring) performs the actual
    /// operation and reports the result via [`Self::on_sub_change_result`].
    pub fn pending_subscription_request(&self) -> Option<SubscriptionStateEntry> {
        if self.state() != CmStateId::Connected {
            return None;
        }
        self.ctx.current_entry_index.and_then(|idx| self.ctx.subscription_states.get(idx).copied())
    }

    pub fn on_sub_change_result(&mut self, ok: bool, now_ms: u64) {
        self.ctx.now_ms = now_ms;
        self.ctx.sub_change_result = Some(ok);
        self.pump();
    }

    fn pump(&mut self) {
        let mut prev = self.fsm.current_id();
        for _ in 0..STATE_COUNT * 2 {
            self.fsm.tick(&mut self.ctx);
            let cur = self.fsm.current_id();
            if cur == prev {
                break;
            }
            prev = cur;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn drive_ready_and_connect(mgr: &mut BtleConnectionManager<4>, mac: MacAddr, now_ms: u64) {
        mgr.start(mac, now_ms);
        mgr.on_backend_ready(now_ms);
        assert_eq!(mgr.state(), CmStateId::Connecting);
        mgr.on_connect_result(true, now_ms);
    }

    #[test]
    fn reconnect_replays_target_subscription_state() {
        let mut mgr: BtleConnectionManager<4> = BtleConnectionManager::new(5_000);
        let mac = [1u8; 6];
        drive_ready_and_connect(&mut mgr, mac, 0);
        assert_eq!(mgr.state(), CmStateId::Connected);

        let entry = SubscriptionStateEntry { is_subscribed: true, service_uuid: Uuid::Short(0x1800), char_uuid: Uuid::Short(0x2a00) };
        mgr.set_target_subscription_state(&[entry]).unwrap();
        mgr.on_unexpected_disconnect(10);
        assert_eq!(mgr.state(), CmStateId::ConnectStandoff);

        mgr.tick(5_010);
        assert_eq!(mgr.state(), CmStateId::Connecting);
        mgr.on_connect_result(true, 5_010);
        assert_eq!(mgr.state(), CmStateId::Connected);

        let pending = mgr.pending_subscription_request().unwrap();
        assert_eq!(pending, entry);
        mgr.on_sub_change_result(true, 5_020);
        assert!(mgr.pending_subscription_request().is_none());
    }

    #[test]
    fn restart_during_connecting_waits_for_in_flight_attempt_before_switching() {
        let mut mgr: BtleConnectionManager<4> = BtleConnectionManager::new(5_000);
        let mac_a = [1u8; 6];
        let mac_b = [2u8; 6];
        mgr.start(mac_a, 0);
        mgr.on_backend_ready(0);
        assert_eq!(mgr.state(), CmStateId::Connecting);
        assert_eq!(mgr.current_target_mac(), mac_a);

        mgr.start(mac_b, 10);
        assert_eq!(mgr.state(), CmStateId::Connecting);
        assert_eq!(mgr.current_target_mac(), mac_a, "must not switch targets mid-attempt");

        mgr.on_connect_result(true, 20);
        assert_eq!(mgr.state(), CmStateId::Disconnecting, "must tear down macA before connecting macB");
        assert_eq!(mgr.current_target_mac(), mac_a);

        mgr.on_disconnect_ack(30);
        assert_eq!(mgr.state(), CmStateId::Connecting);
        assert_eq!(mgr.current_target_mac(), mac_b);
    }

    #[test]
    fn restart_after_failed_attempt_skips_disconnect_and_standoffs_once() {
        let mut mgr: BtleConnectionManager<4> = BtleConnectionManager::new(1_000);
        let mac_a = [1u8; 6];
        let mac_b = [2u8; 6];
        mgr.start(mac_a, 0);
        mgr.on_backend_ready(0);
        mgr.start(mac_b, 0);

        mgr.on_connect_result(false, 0);
        assert_eq!(mgr.state(), CmStateId::ConnectStandoff, "no live connection to tear down");
        assert_eq!(mgr.current_target_mac(), mac_b);

        mgr.tick(1_000);
        assert_eq!(mgr.state(), CmStateId::Connecting);
    }

    #[test]
    fn stop_during_connecting_is_honored_after_attempt_resolves() {
        let mut mgr: BtleConnectionManager<4> = BtleConnectionManager::new(1_000);
        let mac = [1u8; 6];
        mgr.start(mac, 0);
        mgr.on_backend_ready(0);
        mgr.stop(5);
        assert_eq!(mgr.state(), CmStateId::Connecting, "stop is latched, not immediate");

        mgr.on_connect_result(true, 10);
        assert_eq!(mgr.state(), CmStateId::Disconnecting);
        mgr.on_disconnect_ack(20);
        assert_eq!(mgr.state(), CmStateId::Stopped);
    }

    thread_local! {
        static COMPLETE_SUCCESS: Cell<Option<bool>> = const { Cell::new(None) };
    }

    fn record_complete(success: bool, _user_var: usize) {
        COMPLETE_SUCCESS.with(|c| c.set(Some(success)));
    }

    #[test]
    fn sub_state_transition_complete_fires_once_all_entries_settle() {
        let mut mgr: BtleConnectionManager<4> = BtleConnectionManager::new(1_000);
        mgr.on_sub_complete(record_complete, 0);
        let mac = [1u8; 6];
        drive_ready_and_connect(&mut mgr, mac, 0);
        mgr.set_target_subscription_state(&[
            SubscriptionStateEntry { is_subscribed: true, service_uuid: Uuid::Short(0x1800), char_uuid: Uuid::Short(0x2a00) },
        ])
        .unwrap();
        // Re-enter Connected so the walk picks up the newly set entries.
        mgr.on_unexpected_disconnect(1);
        mgr.tick(1_001);
        mgr.on_connect_result(true, 1_001);

        COMPLETE_SUCCESS.with(|c| c.set(None));
        mgr.on_sub_change_result(true, 1_002);
        COMPLETE_SUCCESS.with(|c| assert_eq!(c.get(), Some(true)));
    }
}
