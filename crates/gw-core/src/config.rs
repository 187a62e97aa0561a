//! Simulator configuration.
//!
//! A `SimulatorConfig` is immutable for the lifetime of a simulator: it is
//! fixed at construction, written whole into save files, and sent whole to
//! every client during the connection handshake.  `validate()` is the single
//! gate — the simulator constructor, the save-file loader, and the client
//! handshake all call it before touching anything else.

use crate::{GwError, GwResult, IntensityFn, ItemType};

// ── Policies ──────────────────────────────────────────────────────────────────

/// Whether a particular move or turn direction is permitted.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ActionPolicy {
    /// Permitted and executed.
    Allowed,
    /// Rejected with `ViolatedPermissions`.
    Disallowed,
    /// Accepted but executed as a no-op; the agent is still marked acted.
    Ignored,
}

impl ActionPolicy {
    pub fn as_u8(self) -> u8 {
        match self {
            ActionPolicy::Allowed => 0,
            ActionPolicy::Disallowed => 1,
            ActionPolicy::Ignored => 2,
        }
    }

    pub fn from_u8(v: u8) -> Option<ActionPolicy> {
        match v {
            0 => Some(ActionPolicy::Allowed),
            1 => Some(ActionPolicy::Disallowed),
            2 => Some(ActionPolicy::Ignored),
            _ => None,
        }
    }
}

/// How simultaneous moves into the same cell are resolved at the barrier.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MoveConflictPolicy {
    /// Agents may stack; no contention resolution at all.
    NoCollisions,
    /// The first agent to submit a request for a cell wins it.
    FirstComeFirstServed,
    /// A uniform per-tick draw picks the winner, except that an agent
    /// already standing on the contested cell always keeps it.
    Random,
}

impl MoveConflictPolicy {
    pub fn as_u8(self) -> u8 {
        match self {
            MoveConflictPolicy::NoCollisions => 0,
            MoveConflictPolicy::FirstComeFirstServed => 1,
            MoveConflictPolicy::Random => 2,
        }
    }

    pub fn from_u8(v: u8) -> Option<MoveConflictPolicy> {
        match v {
            0 => Some(MoveConflictPolicy::NoCollisions),
            1 => Some(MoveConflictPolicy::FirstComeFirstServed),
            2 => Some(MoveConflictPolicy::Random),
            _ => None,
        }
    }
}

// ── SimulatorConfig ───────────────────────────────────────────────────────────

/// Top-level simulator configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulatorConfig {
    /// Master RNG seed.  Every random stream in the simulator (Gibbs
    /// sampling, collision draws) is derived from this deterministically.
    pub random_seed: u32,

    /// Upper bound on the `steps` argument of a move request.
    pub max_steps_per_move: u32,

    /// Length `S` of every scent vector.
    pub scent_dim: u32,

    /// Length `C` of every color vector.
    pub color_dim: u32,

    /// Vision radius `R`; the vision raster is `(2R+1) × (2R+1) × C`.
    pub vision_range: u32,

    /// Per-relative-direction move permissions, indexed by `Direction::as_u8`.
    pub allowed_moves: [ActionPolicy; 4],

    /// Per-turn permissions, indexed by `TurnDirection::as_u8`.
    pub allowed_turns: [ActionPolicy; 4],

    /// Whether `no_op` is a permitted action.
    pub no_op_allowed: bool,

    /// Side length `N` of a patch, in cells.  Must be even (the 2×2
    /// neighborhood policy partitions patches into `N/2` quadrants).
    pub patch_size: u32,

    /// Gibbs sweeps performed when fixing a patch neighborhood.
    pub mcmc_iterations: u32,

    pub item_types: Vec<ItemType>,

    /// Color drawn into vision rasters for agents; length `C`.
    pub agent_color: Vec<f32>,

    pub conflict_policy: MoveConflictPolicy,

    /// Scent decay rate λ ∈ (0, 1].
    pub scent_decay: f32,

    /// Scent diffusion rate α ∈ [0, 1/4].  The kernel is non-expanding
    /// only when λ + 4α ≤ 1.
    pub scent_diffusion: f32,

    /// Ticks a deleted item lingers (as a decaying scent trail) before it
    /// is reaped.  Also the time horizon of the diffusion table.
    pub removed_item_lifetime: u32,
}

impl SimulatorConfig {
    /// Side length of the vision raster, `2R + 1`.
    #[inline]
    pub fn vision_side(&self) -> usize {
        2 * self.vision_range as usize + 1
    }

    /// Total length of a dense vision raster, `(2R+1)² · C`.
    #[inline]
    pub fn vision_len(&self) -> usize {
        self.vision_side() * self.vision_side() * self.color_dim as usize
    }

    /// Scent-diffusion radius, derived from the patch size: a perception
    /// query gathers items from the 2×2 patch neighborhood, so offsets
    /// beyond one patch length never occur on the center cells.
    #[inline]
    pub fn diffusion_radius(&self) -> u32 {
        self.patch_size
    }

    /// Check every structural constraint.  Called by the simulator
    /// constructor, the save-file loader, and the client handshake.
    pub fn validate(&self) -> GwResult<()> {
        fn bad(msg: impl Into<String>) -> GwResult<()> {
            Err(GwError::InvalidConfig(msg.into()))
        }

        if self.patch_size == 0 {
            return bad("patch_size must be nonzero");
        }
        if self.patch_size % 2 != 0 {
            return bad("patch_size must be even");
        }
        if self.scent_dim == 0 || self.color_dim == 0 {
            return bad("scent_dim and color_dim must be nonzero");
        }
        // Upper bounds keep a hostile or corrupt config from driving the
        // raster and diffusion-table allocations to absurd sizes.
        if self.patch_size > 1024 || self.vision_range > 1024 {
            return bad("patch_size and vision_range must not exceed 1024");
        }
        if self.scent_dim > 4096 || self.color_dim > 4096 {
            return bad("scent_dim and color_dim must not exceed 4096");
        }
        if self.removed_item_lifetime > 1 << 20 {
            return bad("removed_item_lifetime must not exceed 2^20");
        }
        if self.max_steps_per_move == 0 {
            return bad("max_steps_per_move must be nonzero");
        }
        if self.removed_item_lifetime == 0 {
            return bad("removed_item_lifetime must be nonzero");
        }
        if !(self.scent_decay > 0.0 && self.scent_decay <= 1.0) {
            return bad("scent_decay must lie in (0, 1]");
        }
        if !(0.0..=0.25).contains(&self.scent_diffusion) {
            return bad("scent_diffusion must lie in [0, 1/4]");
        }
        if self.scent_decay + 4.0 * self.scent_diffusion > 1.0 {
            return bad("scent_decay + 4 * scent_diffusion must not exceed 1");
        }
        if self.agent_color.len() != self.color_dim as usize {
            return bad("agent_color length must equal color_dim");
        }

        let type_count = self.item_types.len();
        for (i, ty) in self.item_types.iter().enumerate() {
            if ty.scent.len() != self.scent_dim as usize {
                return bad(format!("item type {i}: scent length must equal scent_dim"));
            }
            if ty.color.len() != self.color_dim as usize {
                return bad(format!("item type {i}: color length must equal color_dim"));
            }
            if ty.required_counts.len() != type_count {
                return bad(format!(
                    "item type {i}: required_counts needs one entry per item type"
                ));
            }
            if ty.required_costs.len() != type_count {
                return bad(format!(
                    "item type {i}: required_costs needs one entry per item type"
                ));
            }
            if ty.interactions.len() != type_count {
                return bad(format!(
                    "item type {i}: interactions needs one entry per item type"
                ));
            }
            if let IntensityFn::Constant(baselines) = &ty.intensity {
                if baselines.len() != type_count {
                    return bad(format!(
                        "item type {i}: Constant intensity needs one baseline per item type"
                    ));
                }
            }
        }

        Ok(())
    }
}
