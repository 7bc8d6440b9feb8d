//! Function-pointer finite state machine engine.
//!
//! Classic embedded FSM pattern: a fixed-size table of `StateDescriptor`,
//! indexed by a state id, each row carrying optional `on_enter`/`on_exit`
//! actions and a required `on_update` poll. Generic over the context type
//! and state count so both the BTLE connection and connection-manager state
//! machines can reuse the same engine.
//!
//! Each tick the engine calls `on_update` for the **current** state. If it
//! returns `Some(next_id)`, the engine runs `on_exit` for the current state,
//! then `on_enter` for the next, and updates the current pointer.

use log::info;

/// Signature for `on_enter` and `on_exit` actions. Run exactly once per
/// transition.
pub type StateActionFn<Ctx> = fn(&mut Ctx);

/// Signature for the per-tick update handler. Returns `Some(next)` to
/// trigger a transition, or `None` to stay.
pub type StateUpdateFn<Ctx, Id> = fn(&mut Ctx) -> Option<Id>;

/// Static descriptor for a single FSM state. Stored in a fixed-size array —
/// no heap, no `dyn`.
pub struct StateDescriptor<Ctx, Id> {
    pub id: Id,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn<Ctx>>,
    pub on_exit: Option<StateActionFn<Ctx>>,
    pub on_update: StateUpdateFn<Ctx, Id>,
}

/// The finite state machine engine. Owns a fixed-size state table and a
/// cursor into it; the context threaded through every handler call is
/// supplied by the caller at each `tick`/`start` call rather than owned
/// here, so one context can be shared across cooperating state machines.
pub struct Fsm<Ctx, Id, const N: usize> {
    table: [StateDescriptor<Ctx, Id>; N],
    current: usize,
    tick_count: u64,
    state_entry_tick: u64,
}

impl<Ctx, Id, const N: usize> Fsm<Ctx, Id, N>
where
    Id: Copy + Into<usize>,
{
    pub fn new(table: [StateDescriptor<Ctx, Id>; N], initial: Id) -> Self {
        Self { table, current: initial.into(), tick_count: 0, state_entry_tick: 0 }
    }

    /// Run the initial `on_enter` for the starting state. Call once after
    /// construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut Ctx) {
        info!("fsm starting in state: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one tick.
    pub fn tick(&mut self, ctx: &mut Ctx) {
        self.tick_count += 1;
        let next = (self.table[self.current].on_update)(ctx);
        if let Some(next_id) = next {
            self.transition(next_id, ctx);
        }
    }

    /// Force an immediate transition, bypassing `on_update`.
    pub fn force_transition(&mut self, next: Id, ctx: &mut Ctx) {
        self.transition(next, ctx);
    }

    pub fn current_id(&self) -> Id {
        self.table[self.current].id
    }

    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count - self.state_entry_tick
    }

    fn transition(&mut self, next_id: Id, ctx: &mut Ctx) {
        let next_idx = next_id.into();
        if next_idx == self.current {
            return;
        }
        info!("fsm transition: {} -> {}", self.table[self.current].name, self.table[next_idx].name);
        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }
        self.current = next_idx;
        self.state_entry_tick = self.tick_count;
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
