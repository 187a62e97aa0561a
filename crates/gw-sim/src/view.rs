//! World-frame region snapshots for `GetMap` queries.

use gw_core::{AgentId, Item, Position};

/// Snapshot of the fixed patches intersecting a query rectangle.
///
/// Only fixed patches appear: unfixed patches straddling the window could
/// still be resampled, so including them would make snapshots
/// nondeterministic.  Cell rasters are world-frame (no agent rotation),
/// row-major with the patch's lowest `y` row first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapView {
    pub patches: Vec<MapPatch>,
}

/// One patch in a [`MapView`].
#[derive(Clone, Debug, PartialEq)]
pub struct MapPatch {
    /// Patch coordinates.
    pub position: Position,

    /// `N × N × S` scent raster: the diffusion sum over every item in the
    /// patch's 3×3 neighborhood, per cell.
    pub scent: Vec<f32>,

    /// `N × N × C` color raster of undeleted items and agents.
    pub vision: Vec<f32>,

    /// All item instances in the patch (deleted-but-unreaped included).
    pub items: Vec<Item>,

    /// Agents currently inside the patch.
    pub agents: Vec<AgentId>,
}
