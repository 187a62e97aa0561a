//! `gw-map` — the lazily materialized world.
//!
//! The world is an unbounded grid, realized patch by patch as agents
//! approach.  A patch starts *unfixed*: it exists, may hold provisionally
//! sampled items, and can still be resampled.  When an agent's perception
//! needs it, the patch and its 2×2 neighborhood are *fixed* by running the
//! Gibbs sampler over a staging set; from then on the patch never changes
//! except through item collection and reaping.
//!
//! | Module        | Contents                                             |
//! |---------------|------------------------------------------------------|
//! | [`diffusion`] | Precomputed scent diffusion table                    |
//! | [`patch`]     | `Patch`, `PatchState`, `PatchImage`                  |
//! | [`store`]     | `WorldMap`: position-keyed patch table, fixing       |
//! | [`gibbs`]     | Single-cell Gibbs updates over a staged neighborhood |

pub mod diffusion;
pub mod gibbs;
pub mod patch;
pub mod store;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use diffusion::DiffusionTable;
pub use patch::{Patch, PatchImage, PatchState};
pub use store::{Neighborhood, WorldMap};
