//! Per-connection BTLE state machine.
//!
//! `Unused → Connecting → ConnectedIdle ↔ ResolveService → ResolveChar →
//! {Read | Write | ChangeNotiIndi} → ProcedureTimeout → Disconnecting →
//! Unused`, expressed with the same function-pointer state-table engine
//! used elsewhere in this crate ([`crate::fsm`]).
//!
//! Backend completion events (discovery results, read/write/subscribe
//! results) arrive as method calls (`on_discovery_result`,
//! `on_procedure_result`) that stash their payload on [`ConnCtx`] and tick
//! the machine, rather than as bespoke callback types per event — the
//! state table's `on_update` functions just inspect what's pending.

use crate::btle::uuid::Uuid;
use crate::fsm::{Fsm, StateDescriptor};
use heapless::Vec;

pub type MacAddr = [u8; 6];
const MAX_CACHED_SERVICES: usize = 8;
const MAX_CACHED_CHARS: usize = 8;
const MAX_RW_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    UserRequested,
    ConnectionTimeout,
    Stack,
    BadState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Procedure {
    Read,
    Write,
    ChangeNotiIndi(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ConnStateId {
    Unused = 0,
    Connecting = 1,
    ConnectedIdle = 2,
    ResolveService = 3,
    ResolveChar = 4,
    Read = 5,
    Write = 6,
    ChangeNotiIndi = 7,
    ProcedureTimeout = 8,
    Disconnecting = 9,
}
const STATE_COUNT: usize = 10;

impl From<ConnStateId> for usize {
    fn from(v: ConnStateId) -> usize {
        v as usize
    }
}

/// Context threaded through every state handler. The caller sets `now_ms`
/// before each `tick()` and calls `on_*` methods on [`BtleConnection`] (not
/// directly on this struct) to report backend events.
pub struct ConnCtx {
    pub target_mac: MacAddr,
    pub pending_procedure: Option<(Uuid, Uuid, Procedure)>,
    pub cached_services: Vec<Uuid, MAX_CACHED_SERVICES>,
    pub cached_chars: Vec<(Uuid, Uuid), MAX_CACHED_CHARS>,
    pub connect_acked: bool,
    pub discovery_result: Option<bool>,
    pub procedure_result: Option<bool>,
    pub disconnect_acked: bool,
    pub read_value: Vec<u8, MAX_RW_LEN>,
    pub write_value: Vec<u8, MAX_RW_LEN>,
    pub disconnect_reason: Option<DisconnectReason>,
    pub now_ms: u64,
    pub deadline_ms: u64,
    pub procedure_timeout_ms: u64,
}

impl ConnCtx {
    pub fn new(target_mac: MacAddr, procedure_timeout_ms: u64) -> Self {
        Self {
            target_mac,
            pending_procedure: None,
            cached_services: Vec::new(),
            cached_chars: Vec::new(),
            connect_acked: false,
            discovery_result: None,
            procedure_result: None,
            disconnect_acked: false,
            read_value: Vec::new(),
            write_value: Vec::new(),
            disconnect_reason: None,
            now_ms: 0,
            deadline_ms: 0,
            procedure_timeout_ms,
        }
    }

    fn has_char_cached(&self, service: Uuid, chr: Uuid) -> bool {
        self.cached_chars.iter().any(|(s, c)| s.matches(service) && c.matches(chr))
    }

    fn arm_deadline(&mut self) {
        self.deadline_ms = self.now_ms + self.procedure_timeout_ms;
    }

    fn timed_out(&self) -> bool {
        self.now_ms >= self.deadline_ms
    }
}

fn unused_update(_ctx: &mut ConnCtx) -> Option<ConnStateId> {
    None
}

fn connecting_update(ctx: &mut ConnCtx) -> Option<ConnStateId> {
    if ctx.connect_acked {
        return Some(ConnStateId::ConnectedIdle);
    }
    if ctx.timed_out() {
        ctx.disconnect_reason = Some(DisconnectReason::ConnectionTimeout);
        return Some(ConnStateId::ProcedureTimeout);
    }
    None
}

fn connected_idle_update(ctx: &mut ConnCtx) -> Option<ConnStateId> {
    let (service, _chr, _op) = ctx.pending_procedure?;
    if ctx.cached_services.iter().any(|s| s.matches(service)) {
        return Some(ConnStateId::ResolveChar);
    }
    ctx.arm_deadline();
    Some(ConnStateId::ResolveService)
}

fn resolve_service_update(ctx: &mut ConnCtx) -> Option<ConnStateId> {
    match ctx.discovery_result.take() {
        Some(true) => {
            if let Some((service, _, _)) = ctx.pending_procedure {
                let _ = ctx.cached_services.push(service);
            }
            Some(ConnStateId::ResolveChar)
        }
        Some(false) => {
            ctx.disconnect_reason = Some(DisconnectReason::Stack);
            Some(ConnStateId::ProcedureTimeout)
        }
        None => {
            if ctx.timed_out() {
                ctx.disconnect_reason = Some(DisconnectReason::Stack);
                Some(ConnStateId::ProcedureTimeout)
            } else {
                None
            }
        }
    }
}

fn resolve_char_update(ctx: &mut ConnCtx) -> Option<ConnStateId> {
    let Some((service, chr, op)) = ctx.pending_procedure else {
        return Some(ConnStateId::ConnectedIdle);
    };
    if ctx.has_char_cached(service, chr) {
        return Some(target_state_for(op));
    }
    match ctx.discovery_result.take() {
        Some(true) => {
            let _ = ctx.cached_chars.push((service, chr));
            Some(target_state_for(op))
        }
        Some(false) => {
            ctx.disconnect_reason = Some(DisconnectReason::Stack);
            Some(ConnStateId::ProcedureTimeout)
        }
        None => {
            if ctx.timed_out() {
                ctx.disconnect_reason = Some(DisconnectReason::Stack);
                Some(ConnStateId::ProcedureTimeout)
            } else {
                None
            }
        }
    }
}

fn target_state_for(op: Procedure) -> ConnStateId {
    match op {
        Procedure::Read => ConnStateId::Read,
        Procedure::Write => ConnStateId::Write,
        Procedure::ChangeNotiIndi(_) => ConnStateId::ChangeNotiIndi,
    }
}

fn procedure_update(ctx: &mut ConnCtx) -> Option<ConnStateId> {
    match ctx.procedure_result.take() {
        Some(true) => {
            ctx.pending_procedure = None;
            Some(ConnStateId::ConnectedIdle)
        }
        Some(false) => {
            ctx.disconnect_reason = Some(DisconnectReason::Stack);
            Some(ConnStateId::ProcedureTimeout)
        }
        None => {
            if ctx.timed_out() {
                ctx.disconnect_reason = Some(DisconnectReason::Stack);
                Some(ConnStateId::ProcedureTimeout)
            } else {
                None
            }
        }
    }
}

fn procedure_timeout_update(_ctx: &mut ConnCtx) -> Option<ConnStateId> {
    Some(ConnStateId::Disconnecting)
}

fn disconnecting_enter(ctx: &mut ConnCtx) {
    ctx.cached_services.clear();
    ctx.cached_chars.clear();
}

fn disconnecting_update(ctx: &mut ConnCtx) -> Option<ConnStateId> {
    if ctx.disconnect_acked {
        ctx.disconnect_acked = false;
        Some(ConnStateId::Unused)
    } else {
        None
    }
}

fn build_table() -> [StateDescriptor<ConnCtx, ConnStateId>; STATE_COUNT] {
    [
        StateDescriptor { id: ConnStateId::Unused, name: "Unused", on_enter: None, on_exit: None, on_update: unused_update },
        StateDescriptor { id: ConnStateId::Connecting, name: "Connecting", on_enter: None, on_exit: None, on_update: connecting_update },
        StateDescriptor { id: ConnStateId::ConnectedIdle, name: "ConnectedIdle", on_enter: None, on_exit: None, on_update: connected_idle_update },
        StateDescriptor { id: ConnStateId::ResolveService, name: "ResolveService", on_enter: None, on_exit: None, on_update: resolve_service_update },
        StateDescriptor { id: ConnStateId::ResolveChar, name: "ResolveChar", on_enter: None, on_exit: None, on_update: resolve_char_update },
        StateDescriptor { id: ConnStateId::Read, name: "Read", on_enter: None, on_exit: None, on_update: procedure_update },
        StateDescriptor { id: ConnStateId::Write, name: "Write", on_enter: None, on_exit: None, on_update: procedure_update },
        StateDescriptor { id: ConnStateId::ChangeNotiIndi, name: "ChangeNotiIndi", on_enter: None, on_exit: None, on_update: procedure_update },
        StateDescriptor { id: ConnStateId::ProcedureTimeout, name: "ProcedureTimeout", on_enter: None, on_exit: None, on_update: procedure_timeout_update },
        StateDescriptor { id: ConnStateId::Disconnecting, name: "Disconnecting", on_enter: Some(disconnecting_enter), on_exit: None, on_update: disconnecting_update },
    ]
}

/// A single BTLE GATT connection, driven one tick at a time.
pub struct BtleConnection {
    fsm: Fsm<ConnCtx, ConnStateId, STATE_COUNT>,
    ctx: ConnCtx,
}

impl BtleConnection {
    pub fn new(target_mac: MacAddr, procedure_timeout_ms: u64) -> Self {
        let mut ctx = ConnCtx::new(target_mac, procedure_timeout_ms);
        let mut fsm = Fsm::new(build_table(), ConnStateId::Unused);
        fsm.start(&mut ctx);
        Self { fsm, ctx }
    }

    pub fn state(&self) -> ConnStateId {
        self.fsm.current_id()
    }

    pub fn connect(&mut self, now_ms: u64) {
        self.ctx.now_ms = now_ms;
        self.ctx.arm_deadline();
        self.ctx.connect_acked = false;
        self.fsm.force_transition(ConnStateId::Connecting, &mut self.ctx);
    }

    pub fn on_connect_result(&mut self, ok: bool, now_ms: u64) {
        self.ctx.now_ms = now_ms;
        self.ctx.connect_acked = ok;
        self.pump();
    }

    /// Request an operation; if the target service/characteristic are not
    /// cached, the machine first walks discovery. Settles through any
    /// transitions that don't need to wait on a backend event (e.g. a
    /// fully cached request proceeds straight to its operation state).
    pub fn request(&mut self, service: Uuid, chr: Uuid, op: Procedure, now_ms: u64) {
        self.ctx.now_ms = now_ms;
        self.ctx.pending_procedure = Some((service, chr, op));
        self.pump();
    }

    pub fn on_discovery_result(&mut self, ok: bool, now_ms: u64) {
        self.ctx.now_ms = now_ms;
        self.ctx.discovery_result = Some(ok);
        self.pump();
    }

    pub fn on_procedure_result(&mut self, ok: bool, now_ms: u64) {
        self.ctx.now_ms = now_ms;
        self.ctx.procedure_result = Some(ok);
        self.pump();
    }

    pub fn on_disconnect_ack(&mut self, now_ms: u64) {
        self.ctx.now_ms = now_ms;
        self.ctx.disconnect_acked = true;
        self.pump();
    }

    pub fn tick(&mut self, now_ms: u64) {
        self.ctx.now_ms = now_ms;
        self.pump();
    }

    /// Tick repeatedly while the state keeps advancing, so a run of
    /// transitions that need no further backend event (e.g. a fully
    /// cached request) resolves within one call instead of requiring the
    /// caller to pump the run loop itself.
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

    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.ctx.disconnect_reason
    }

    pub fn is_char_cached(&self, service: Uuid, chr: Uuid) -> bool {
        self.ctx.has_char_cached(service, chr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_then_read_walks_discovery_before_reading() {
        let mut conn = BtleConnection::new([1; 6], 5_000);
        conn.connect(0);
        conn.on_connect_result(true, 10);
        assert_eq!(conn.state(), ConnStateId::ConnectedIdle);

        conn.request(Uuid::Short(0x1800), Uuid::Short(0x2a00), Procedure::Read, 20);
        assert_eq!(conn.state(), ConnStateId::ResolveService);

        conn.on_discovery_result(true, 30);
        assert_eq!(conn.state(), ConnStateId::ResolveChar);

        conn.on_discovery_result(true, 40);
        assert_eq!(conn.state(), ConnStateId::Read);

        conn.on_procedure_result(true, 50);
        assert_eq!(conn.state(), ConnStateId::ConnectedIdle);
        assert!(conn.is_char_cached(Uuid::Short(0x1800), Uuid::Short(0x2a00)));
    }

    #[test]
    fn cached_characteristic_skips_discovery_on_next_request() {
        let mut conn = BtleConnection::new([1; 6], 5_000);
        conn.connect(0);
        conn.on_connect_result(true, 0);
        conn.request(Uuid::Short(0x1800), Uuid::Short(0x2a00), Procedure::Read, 0);
        conn.on_discovery_result(true, 0);
        conn.on_discovery_result(true, 0);
        conn.on_procedure_result(true, 0);

        conn.request(Uuid::Short(0x1800), Uuid::Short(0x2a00), Procedure::Write, 0);
        assert_eq!(conn.state(), ConnStateId::Write);
    }

    #[test]
    fn procedure_timeout_tears_down_to_unused() {
        let mut conn = BtleConnection::new([1; 6], 1_000);
        conn.connect(0);
        conn.on_connect_result(true, 0);
        conn.request(Uuid::Short(0x1800), Uuid::Short(0x2a00), Procedure::Read, 0);
        conn.tick(2_000);
        assert_eq!(conn.state(), ConnStateId::Disconnecting);
        assert_eq!(conn.disconnect_reason(), Some(DisconnectReason::Stack));
        conn.on_disconnect_ack(2_100);
        assert_eq!(conn.state(), ConnStateId::Unused);
    }
}
