//! `WorldMap` — the position-keyed patch table and the fixing pipeline.
//!
//! # Locking
//!
//! Three layers, always taken in this order and never held across a layer
//! boundary in the other direction:
//!
//! 1. `gen_lock` — serializes whole fixing operations (Gibbs runs).
//! 2. the table mutex — guards the `Position → Arc<Patch>` map itself;
//!    held only for lookup and insertion, never during sampling.
//! 3. individual patch mutexes — one at a time here (the simulator takes
//!    two at once only for cross-patch agent transfer, in ascending
//!    position order).
//!
//! Patch creation is idempotent under concurrent callers: whoever wins the
//! table entry supplies the patch, everyone gets the same `Arc`.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use gw_core::rng::{position_key, rng_for};
use gw_core::{Position, SimulatorConfig};

use crate::gibbs;
use crate::patch::{Patch, PatchImage};

/// The four fixed patches covering the `N×N` bounding box centered at a
/// world position, in row-major order (ascending `y` rows, then ascending
/// `x`), plus which of the four contains the query position.
pub struct Neighborhood {
    pub patches: [Arc<Patch>; 4],
    pub positions: [Position; 4],
    pub center_index: usize,
}

/// Hash table from patch coordinate to patch, materialized on demand.
pub struct WorldMap {
    config: Arc<SimulatorConfig>,
    patches: Mutex<FxHashMap<Position, Arc<Patch>>>,
    /// Serializes Gibbs fixing runs; see the module docs.
    gen_lock: Mutex<()>,
}

impl WorldMap {
    pub fn new(config: Arc<SimulatorConfig>) -> WorldMap {
        WorldMap {
            config,
            patches: Mutex::new(FxHashMap::default()),
            gen_lock: Mutex::new(()),
        }
    }

    /// Split a world position into `(patch coordinate, offset within the
    /// patch)` using floored division, so negative coordinates map
    /// correctly.
    #[inline]
    pub fn world_to_patch(&self, world: Position) -> (Position, Position) {
        let n = self.config.patch_size as i64;
        (world.div_floor(n), world.rem_floor(n))
    }

    /// Look up a patch without materializing it.
    pub fn get_if_exists(&self, patch_pos: Position) -> Option<Arc<Patch>> {
        self.patches.lock().get(&patch_pos).cloned()
    }

    /// Look up a patch, creating an empty unfixed one if absent.
    pub fn get_or_create(&self, patch_pos: Position) -> Arc<Patch> {
        Arc::clone(
            self.patches
                .lock()
                .entry(patch_pos)
                .or_insert_with(|| Arc::new(Patch::new(patch_pos))),
        )
    }

    /// The 2×2 block of patch coordinates whose union covers the `N×N`
    /// bounding box centered at `world`, and the index of the patch
    /// containing `world` within that block.
    ///
    /// Selection policy: the patch is split into quadrants of side `N/2`;
    /// the block extends toward the side the query's quadrant is on.
    pub fn neighborhood_positions(&self, world: Position) -> ([Position; 4], usize) {
        let (pp, within) = self.world_to_patch(world);
        let half = self.config.patch_size as i64 / 2;
        let sx: i64 = if within.x < half { -1 } else { 1 };
        let sy: i64 = if within.y < half { -1 } else { 1 };

        let (x0, x1) = (pp.x.min(pp.x + sx), pp.x.max(pp.x + sx));
        let (y0, y1) = (pp.y.min(pp.y + sy), pp.y.max(pp.y + sy));
        let positions = [
            Position::new(x0, y0),
            Position::new(x1, y0),
            Position::new(x0, y1),
            Position::new(x1, y1),
        ];
        let center_index = positions
            .iter()
            .position(|&p| p == pp)
            .expect("query patch is always inside its own 2x2 block");
        (positions, center_index)
    }

    /// Return the fixed 2×2 patch neighborhood of `world`, creating and
    /// Gibbs-sampling any patch that is not yet fixed.
    ///
    /// Idempotent: once all four patches are fixed, later calls return the
    /// identical contents and do no sampling work.
    pub fn get_fixed_neighborhood(&self, world: Position) -> Neighborhood {
        let (positions, center_index) = self.neighborhood_positions(world);

        // Fast path: everything already fixed, no generation lock needed.
        if let Some(patches) = self.try_all_fixed(&positions) {
            return Neighborhood {
                patches,
                positions,
                center_index,
            };
        }

        let _gen = self.gen_lock.lock();

        // Re-check: another thread may have fixed the block while we waited.
        let to_fix: Vec<Position> = {
            let table = self.patches.lock();
            positions
                .iter()
                .copied()
                .filter(|p| table.get(p).is_none_or(|patch| !patch.is_fixed()))
                .collect()
        };

        if !to_fix.is_empty() {
            self.fix_patches(&to_fix, positions[center_index]);
        }

        let patches = std::array::from_fn(|i| self.get_or_create(positions[i]));
        Neighborhood {
            patches,
            positions,
            center_index,
        }
    }

    fn try_all_fixed(&self, positions: &[Position; 4]) -> Option<[Arc<Patch>; 4]> {
        let table = self.patches.lock();
        let mut out: [Option<Arc<Patch>>; 4] = [const { None }; 4];
        for (slot, pos) in out.iter_mut().zip(positions) {
            let patch = table.get(pos)?;
            if !patch.is_fixed() {
                return None;
            }
            *slot = Some(Arc::clone(patch));
        }
        Some(out.map(|p| p.expect("filled above")))
    }

    /// Run the Gibbs sampler over `to_fix` and its staging ring, then mark
    /// `to_fix` fixed.  Caller holds the generation lock.
    fn fix_patches(&self, to_fix: &[Position], center: Position) {
        // Staging set: the patches being fixed plus their 3×3 rings, minus
        // anything already fixed.  All staged patches are materialized.
        let mut staged: Vec<Position> = Vec::new();
        for &f in to_fix {
            for p in neighbors9(f) {
                let patch = self.get_or_create(p);
                if !patch.is_fixed() && !staged.contains(&p) {
                    staged.push(p);
                }
            }
        }
        staged.sort_unstable();

        // Copy the working set out of the patch locks: staged patches are
        // writable; any existing neighbor (fixed or not) is a read-only
        // interaction source.  Missing neighbors stay missing — sampling
        // never materializes beyond the staging set.
        let mut grid: FxHashMap<Position, Vec<gw_core::Item>> = FxHashMap::default();
        for &p in &staged {
            for q in neighbors9(p) {
                if !grid.contains_key(&q)
                    && let Some(patch) = self.get_if_exists(q)
                {
                    grid.insert(q, patch.lock().items.clone());
                }
            }
        }

        let mut rng = rng_for(self.config.random_seed as u64, position_key(center));
        gibbs::run(&self.config, &mut grid, &staged, &mut rng);

        // Write staged results back and freeze the target patches.
        for &p in &staged {
            let patch = self.get_or_create(p);
            if let Some(items) = grid.remove(&p) {
                patch.lock().items = items;
            }
        }
        for &p in to_fix {
            self.get_or_create(p).mark_fixed();
        }
    }

    // ── Snapshot / restore ────────────────────────────────────────────────

    /// Plain-data images of every patch, sorted by position for
    /// deterministic serialization.
    pub fn export_patches(&self) -> Vec<PatchImage> {
        let handles: Vec<Arc<Patch>> = self.patches.lock().values().cloned().collect();
        let mut images: Vec<PatchImage> = handles.iter().map(|p| p.to_image()).collect();
        images.sort_unstable_by_key(|img| img.position);
        images
    }

    /// Rebuild a map from patch images.  All locks are constructed fresh.
    pub fn from_images(config: Arc<SimulatorConfig>, images: Vec<PatchImage>) -> WorldMap {
        let map = WorldMap::new(config);
        {
            let mut table = map.patches.lock();
            for image in images {
                table.insert(image.position, Arc::new(Patch::from_image(image)));
            }
        }
        map
    }

    pub fn patch_count(&self) -> usize {
        self.patches.lock().len()
    }
}

/// The 3×3 block of patch coordinates around `p`, including `p` itself.
fn neighbors9(p: Position) -> [Position; 9] {
    let mut out = [Position::ORIGIN; 9];
    let mut i = 0;
    for dy in -1..=1 {
        for dx in -1..=1 {
            out[i] = Position::new(p.x + dx, p.y + dy);
            i += 1;
        }
    }
    out
}
