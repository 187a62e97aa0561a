//! Item type descriptors and item instances.

use crate::{IntensityFn, InteractionFn, Position};

/// Static description of one item type, shared by every instance.
///
/// All `Vec` lengths are validated by
/// [`SimulatorConfig::validate`][crate::SimulatorConfig::validate]:
/// `scent` has `scent_dim` entries, `color` has `color_dim`, and the
/// per-type arrays (`required_counts`, `required_costs`, `interactions`)
/// have one entry per item type in the config.
#[derive(Clone, Debug, PartialEq)]
pub struct ItemType {
    pub name: String,

    /// Scent emitted by every instance, diffused over the grid.
    pub scent: Vec<f32>,

    /// Color drawn into agents' vision rasters.
    pub color: Vec<f32>,

    /// Minimum `collected[t]` an agent must hold, per type `t`, before it
    /// may collect an instance of this type.
    pub required_counts: Vec<u64>,

    /// Amount deducted from `collected[t]`, per type `t`, when an instance
    /// of this type is collected (saturating at 0).
    pub required_costs: Vec<u64>,

    /// Agents cannot enter a cell holding an undeleted instance of this type.
    pub blocks_movement: bool,

    /// Per-cell log-bias kernel for the Gibbs sampler.
    pub intensity: IntensityFn,

    /// Pairwise kernel against each other item type, indexed by type.
    pub interactions: Vec<InteractionFn>,
}

/// One item instance on the grid.
///
/// `creation_time == 0` means "existed since the beginning" (freshly
/// sampled patches are born this way).  `deletion_time == 0` means "not
/// deleted"; a collected item keeps contributing a decaying scent trail
/// until `deletion_time + removed_item_lifetime`, after which it is reaped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Item {
    /// Index into `SimulatorConfig::item_types`.
    pub item_type: u32,
    pub location: Position,
    pub creation_time: u64,
    pub deletion_time: u64,
}

impl Item {
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deletion_time != 0
    }

    /// `true` once the decayed scent trail has aged out and the instance
    /// can be dropped from its patch.
    #[inline]
    pub fn reapable(&self, now: u64, removed_item_lifetime: u64) -> bool {
        self.is_deleted() && now >= self.deletion_time + removed_item_lifetime
    }
}
