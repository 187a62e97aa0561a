//! Single-cell Gibbs updates over a staged patch neighborhood.
//!
//! Each update resamples the content of one cell from the conditional
//! distribution over "one of the `T` item types, or empty", holding every
//! other cell fixed:
//!
//!   log p(k) = intensity(c, k) + Σ interactions(c, i)   for k < T
//!   log p(T) = 0                                        (empty)
//!
//! where the interaction sum ranges over the item instances in the 2×2
//! patch neighborhood of the cell.  `normalize_exp` subtracts the maximum
//! before exponentiating so the softmax never overflows.

use rand::Rng;
use rand::rngs::SmallRng;
use rustc_hash::FxHashMap;

use gw_core::{Item, Position, SimulatorConfig};

/// Run the configured number of Gibbs sweeps over `staged`.
///
/// `grid` maps patch position → working copy of that patch's items; staged
/// entries are mutated in place, other entries only feed interaction terms.
/// One sweep performs `|staged| · N²` single-cell updates at uniformly
/// random staged cells.
pub fn run(
    config: &SimulatorConfig,
    grid: &mut FxHashMap<Position, Vec<Item>>,
    staged: &[Position],
    rng: &mut SmallRng,
) {
    if staged.is_empty() || config.item_types.is_empty() {
        return;
    }
    let n = config.patch_size as i64;
    let updates_per_sweep = staged.len() * (n * n) as usize;

    for _sweep in 0..config.mcmc_iterations {
        for _ in 0..updates_per_sweep {
            let patch_pos = staged[rng.gen_range(0..staged.len())];
            let cell = Position::new(
                patch_pos.x * n + rng.gen_range(0..n),
                patch_pos.y * n + rng.gen_range(0..n),
            );
            update_cell(config, grid, patch_pos, cell, rng);
        }
    }
}

/// Resample the content of one cell.
fn update_cell(
    config: &SimulatorConfig,
    grid: &mut FxHashMap<Position, Vec<Item>>,
    patch_pos: Position,
    cell: Position,
    rng: &mut SmallRng,
) {
    let type_count = config.item_types.len();

    // log p for each candidate type, plus the empty alternative at the end.
    let mut log_p = vec![0.0_f32; type_count + 1];
    for (k, ty) in config.item_types.iter().enumerate() {
        log_p[k] = ty.intensity.value(cell, k);
    }

    for neighbor in cell_neighborhood(config, cell) {
        let Some(items) = grid.get(&neighbor) else {
            continue;
        };
        for item in items {
            if item.location == cell || item.is_deleted() {
                continue;
            }
            for (k, ty) in config.item_types.iter().enumerate() {
                log_p[k] += ty.interactions[item.item_type as usize].value(cell, item.location);
            }
        }
    }

    let sampled = sample_categorical(&normalize_exp(&log_p), rng);

    let items = grid
        .get_mut(&patch_pos)
        .expect("staged patches are always present in the working grid");
    let current = items
        .iter()
        .position(|i| i.location == cell && !i.is_deleted());

    match (current, sampled) {
        // Cell stays empty, or keeps its current type.
        (None, s) if s == type_count => {}
        (Some(idx), s) if s < type_count && items[idx].item_type as usize == s => {}

        // Content changes: drop the old instance, append the new one.
        (old, s) => {
            if let Some(idx) = old {
                items.swap_remove(idx);
            }
            if s < type_count {
                items.push(Item {
                    item_type: s as u32,
                    location: cell,
                    creation_time: 0,
                    deletion_time: 0,
                });
            }
        }
    }
}

/// The 2×2 block of patch positions whose union covers the `N×N` bounding
/// box centered at `cell` — the interaction horizon of one cell update.
fn cell_neighborhood(config: &SimulatorConfig, cell: Position) -> [Position; 4] {
    let n = config.patch_size as i64;
    let half = n / 2;
    let pp = cell.div_floor(n);
    let within = cell.rem_floor(n);
    let sx: i64 = if within.x < half { -1 } else { 1 };
    let sy: i64 = if within.y < half { -1 } else { 1 };
    [
        pp,
        Position::new(pp.x + sx, pp.y),
        Position::new(pp.x, pp.y + sy),
        Position::new(pp.x + sx, pp.y + sy),
    ]
}

/// Softmax with max-subtraction: never overflows, and a run of equal
/// maxima comes out exactly uniform.
pub fn normalize_exp(log_weights: &[f32]) -> Vec<f64> {
    let max = log_weights.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    log_weights
        .iter()
        .map(|&w| f64::from(w - max).exp())
        .collect()
}

/// Draw an index proportionally to `weights` (not necessarily normalized).
pub fn sample_categorical(weights: &[f64], rng: &mut SmallRng) -> usize {
    let total: f64 = weights.iter().sum();
    let mut u = rng.gen_range(0.0..1.0) * total;
    for (i, &w) in weights.iter().enumerate() {
        u -= w;
        if u < 0.0 {
            return i;
        }
    }
    weights.len() - 1
}
