//! `gw-sim` — the turn-synchronized simulator core.
//!
//! A [`Simulator`] owns the agent table, the lazily generated world, and
//! the tick barrier.  Many threads may call its operations concurrently;
//! the thread whose action completes the barrier executes the step
//! procedure synchronously before its call returns.
//!
//! | Module         | Contents                                            |
//! |----------------|-----------------------------------------------------|
//! | [`agent`]      | `AgentState`, `AgentImage`                          |
//! | [`collision`]  | Per-tick move-conflict resolution                   |
//! | [`perception`] | Scent/vision refresh and the frame-pixel mapping    |
//! | [`view`]       | `MapView` region snapshots                          |
//! | [`observer`]   | `StepObserver` callback hook                        |
//! | [`simulator`]  | The `Simulator` itself and `SimulatorImage`         |

pub mod agent;
pub mod collision;
pub mod observer;
pub mod perception;
pub mod simulator;
pub mod view;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use agent::{AgentImage, AgentState};
pub use observer::{StepObserver, StepOutcome};
pub use simulator::{Simulator, SimulatorImage};
pub use view::{MapPatch, MapView};
