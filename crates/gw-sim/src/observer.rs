//! Step callback hook.

use gw_core::AgentId;

/// What the simulator reports after a completed step.
#[derive(Clone, Debug)]
pub struct StepOutcome {
    /// The tick counter *after* the advance (the first step reports 1).
    pub time: u64,

    /// Agents that acted in the tick that just closed, ascending by id.
    pub acted: Vec<AgentId>,
}

/// Callback invoked synchronously at the end of every step, on the thread
/// whose action closed the barrier.
///
/// Implementations must be quick and must not call back into actions that
/// could close another barrier (the network server, for example, only
/// serializes states and queues writes here).
pub trait StepObserver: Send + Sync {
    fn on_step(&self, outcome: &StepOutcome);
}

impl<F: Fn(&StepOutcome) + Send + Sync> StepObserver for F {
    fn on_step(&self, outcome: &StepOutcome) {
        self(outcome)
    }
}
