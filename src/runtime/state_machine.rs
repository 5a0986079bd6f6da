//! Generic state table executor.
//!
//! Models each protocol phase as a variant of a tagged union (`S`) and the
//! transition function as exhaustive case analysis, giving compile-time
//! exhaustiveness over trait-object dispatch tables. A transition invokes
//! `on_departure` of the old state then `on_arrival` of the new state,
//! exactly once, in that order; self-transitions fire neither.

/// Implemented by the owner of a state machine (e.g. `Connection`) to react
/// to readiness events and state transitions. `S` is the state enum; `Ctx`
/// is whatever auxiliary context a hook needs (selector handle, storage...).
pub trait Hooks<S, Ctx> {
    fn on_arrival(&mut self, _state: S, _ctx: &mut Ctx) {}
    fn on_departure(&mut self, _state: S, _ctx: &mut Ctx) {}
    fn on_read_ready(&mut self, state: S, ctx: &mut Ctx) -> S;
    fn on_write_ready(&mut self, state: S, ctx: &mut Ctx) -> S;
    fn on_block_ready(&mut self, state: S, ctx: &mut Ctx) -> S;
}

/// Tracks the current state and drives transitions through a `Hooks` impl.
pub struct StateMachine<S> {
    current: S,
}

impl<S: Copy + PartialEq> StateMachine<S> {
    pub fn new(initial: S) -> Self {
        Self { current: initial }
    }

    pub fn current(&self) -> S {
        self.current
    }

    fn transition<Ctx>(&mut self, next: S, owner: &mut dyn Hooks<S, Ctx>, ctx: &mut Ctx) {
        if next != self.current {
            owner.on_departure(self.current, ctx);
            self.current = next;
            owner.on_arrival(next, ctx);
        }
    }

    pub fn handle_read<Ctx>(&mut self, owner: &mut dyn Hooks<S, Ctx>, ctx: &mut Ctx) -> S {
        let next = owner.on_read_ready(self.current, ctx);
        self.transition(next, owner, ctx);
        self.current
    }

    pub fn handle_write<Ctx>(&mut self, owner: &mut dyn Hooks<S, Ctx>, ctx: &mut Ctx) -> S {
        let next = owner.on_write_ready(self.current, ctx);
        self.transition(next, owner, ctx);
        self.current
    }

    pub fn handle_block<Ctx>(&mut self, owner: &mut dyn Hooks<S, Ctx>, ctx: &mut Ctx) -> S {
        let next = owner.on_block_ready(self.current, ctx);
        self.transition(next, owner, ctx);
        self.current
    }

    pub fn handle_close<Ctx>(&mut self, owner: &mut dyn Hooks<S, Ctx>, ctx: &mut Ctx) {
        owner.on_departure(self.current, ctx);
    }

    /// Forces entry into the initial state's arrival hook. Call once after
    /// construction, since `new` does not fire `on_arrival` for the seed
    /// state (there is no prior state to depart from).
    pub fn arrive<Ctx>(&mut self, owner: &mut dyn Hooks<S, Ctx>, ctx: &mut Ctx) {
        owner.on_arrival(self.current, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestState {
        A,
        B,
        C,
    }

    struct Log(RefCell<Vec<String>>);

    struct Owner<'a> {
        log: &'a Log,
    }

    impl<'a> Hooks<TestState, ()> for Owner<'a> {
        fn on_arrival(&mut self, state: TestState, _ctx: &mut ()) {
            self.log.0.borrow_mut().push(format!("arrive:{state:?}"));
        }
        fn on_departure(&mut self, state: TestState, _ctx: &mut ()) {
            self.log.0.borrow_mut().push(format!("depart:{state:?}"));
        }
        fn on_read_ready(&mut self, state: TestState, _ctx: &mut ()) -> TestState {
            match state {
                TestState::A => TestState::B,
                other => other,
            }
        }
        fn on_write_ready(&mut self, state: TestState, _ctx: &mut ()) -> TestState {
            state
        }
        fn on_block_ready(&mut self, state: TestState, _ctx: &mut ()) -> TestState {
            state
        }
    }

    #[test]
    fn transition_fires_departure_then_arrival_exactly_once() {
        let log = Log(RefCell::new(Vec::new()));
        let mut owner = Owner { log: &log };
        let mut sm = StateMachine::new(TestState::A);
        sm.handle_read(&mut owner, &mut ());
        assert_eq!(sm.current(), TestState::B);
        assert_eq!(log.0.borrow().as_slice(), &["depart:A", "arrive:B"]);
    }

    #[test]
    fn self_transition_fires_neither_hook() {
        let log = Log(RefCell::new(Vec::new()));
        let mut owner = Owner { log: &log };
        let mut sm = StateMachine::new(TestState::C);
        sm.handle_read(&mut owner, &mut ());
        assert_eq!(sm.current(), TestState::C);
        assert!(log.0.borrow().is_empty());
    }

    #[test]
    fn close_runs_departure_of_current_state_only() {
        let log = Log(RefCell::new(Vec::new()));
        let mut owner = Owner { log: &log };
        let mut sm = StateMachine::new(TestState::B);
        sm.handle_close(&mut owner, &mut ());
        assert_eq!(log.0.borrow().as_slice(), &["depart:B"]);
    }
}
