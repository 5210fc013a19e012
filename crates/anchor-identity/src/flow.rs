//! Shared shape of the flow state machines.

/// Result of feeding one event to a state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<S, F> {
    /// State after the event
    pub state: S,
    /// Effects the driver must perform, in order
    pub effects: Vec<F>,
}

impl<S, F> Transition<S, F> {
    /// Move to `state` and emit `effects`
    pub fn to(state: S, effects: Vec<F>) -> Self {
        Self { state, effects }
    }

    /// Move to `state` without emitting anything
    pub fn quiet(state: S) -> Self {
        Self {
            state,
            effects: Vec::new(),
        }
    }
}
