// Finite state machine driver for per-entity behavioral states.
//
// A state is a plain enum value carrying only the data it needs. Its `Kind`
// names the state without that data and is what callers request. Legal exits
// come from a pure table on the state; entry/exit side effects are run by
// whoever owns the entity, around `StateMachine::enter`.

use std::fmt::Debug;

/// A state value with a pure legal-transition table.
pub trait MachineState: Copy + Debug {
    type Kind: Copy + Eq + Debug;

    fn kind(&self) -> Self::Kind;

    /// Fresh state data for a newly entered `kind`.
    fn fresh(kind: Self::Kind) -> Self;

    /// Whether `next` may follow this state.
    fn is_valid_next_state(&self, next: Self::Kind) -> bool;
}

#[derive(Debug, Clone)]
pub struct StateMachine<S: MachineState> {
    current: S,
    entered_from: Option<S::Kind>,
}

impl<S: MachineState> StateMachine<S> {
    /// Start in `initial`. The first state needs no legal predecessor.
    pub fn new(initial: S::Kind) -> Self {
        Self {
            current: S::fresh(initial),
            entered_from: None,
        }
    }

    pub fn current(&self) -> &S {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut S {
        &mut self.current
    }

    pub fn kind(&self) -> S::Kind {
        self.current.kind()
    }

    /// Kind of the state that was active before the current one.
    pub fn entered_from(&self) -> Option<S::Kind> {
        self.entered_from
    }

    pub fn can_enter(&self, next: S::Kind) -> bool {
        self.current.is_valid_next_state(next)
    }

    /// Switch to a fresh `next` state if the table allows it.
    /// Returns the state that was left, or `None` when the request was refused.
    pub fn enter(&mut self, next: S::Kind) -> Option<S> {
        if !self.can_enter(next) {
            return None;
        }
        let previous = std::mem::replace(&mut self.current, S::fresh(next));
        self.entered_from = Some(previous.kind());
        Some(previous)
    }
}
