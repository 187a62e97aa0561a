//! `gw-core` — foundational types for the `gridworld` environment.
//!
//! This crate is a dependency of every other `gw-*` crate.  It intentionally
//! has no `gw-*` dependencies and minimal external ones (only `rand` and
//! `thiserror`, plus optional `serde`).
//!
//! # What lives here
//!
//! | Module       | Contents                                                |
//! |--------------|---------------------------------------------------------|
//! | [`position`] | `Position`, `Direction`, `TurnDirection`, frame math    |
//! | [`ids`]      | `AgentId`                                               |
//! | [`energy`]   | `IntensityFn`, `InteractionFn` kernel registry          |
//! | [`item`]     | `ItemType` (static), `Item` (instance)                  |
//! | [`config`]   | `SimulatorConfig`, action and conflict policies         |
//! | [`rng`]      | Deterministic seed derivation helpers                   |
//! | [`error`]    | `GwError`, `GwResult`                                   |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                       |
//! |---------|--------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to plain-data public types.   |

pub mod config;
pub mod energy;
pub mod error;
pub mod ids;
pub mod item;
pub mod position;
pub mod rng;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use config::{ActionPolicy, MoveConflictPolicy, SimulatorConfig};
pub use energy::{IntensityFn, InteractionFn};
pub use error::{GwError, GwResult};
pub use ids::AgentId;
pub use item::{Item, ItemType};
pub use position::{Direction, Position, TurnDirection};
