//! Per-agent scent and vision refresh.
//!
//! Runs for every active agent at the end of each step, against the
//! post-move world.  The refresh walks the agent's fixed 2×2 patch
//! neighborhood (materializing and fixing it on first approach), reaps
//! items whose deleted scent trail has aged out, and rebuilds both
//! perception buffers from scratch.
//!
//! # Scent arithmetic
//!
//! The diffusion table stores *accumulated* contributions (one emission per
//! tick of existence), so a live item adds `value(age)` and a deleted item
//! adds `value(age) − value(age_since_deletion)` — the trail left by the
//! emissions that happened before deletion, which decays smoothly to zero
//! and is reaped exactly when the subtraction would zero it out anyway.

use rustc_hash::FxHashMap;

use gw_core::{AgentId, Direction, Position, SimulatorConfig};
use gw_map::{DiffusionTable, WorldMap};

use crate::agent::AgentState;

/// Flat index of the vision pixel for a world offset `(dx, dy)` seen by an
/// agent facing `facing`, or `None` when outside the vision range.
///
/// This is the single place world offsets are rotated into an agent frame:
/// row 0 is the row furthest *ahead* of the agent, columns grow to the
/// agent's right, and the returned index points at channel 0 of the pixel.
pub fn frame_pixel(
    config: &SimulatorConfig,
    facing: Direction,
    dx: i64,
    dy: i64,
) -> Option<usize> {
    let r = config.vision_range as i64;
    let (fx, fy) = facing.to_frame(dx, dy);
    if fx.abs() > r || fy.abs() > r {
        return None;
    }
    let side = config.vision_side();
    let row = (r - fy) as usize;
    let col = (r + fx) as usize;
    Some((row * side + col) * config.color_dim as usize)
}

/// Rebuild one agent's scent and vision from the current world state.
///
/// `agent_positions` is a pre-collected snapshot of every live agent's
/// position; using it avoids taking any other agent's lock from inside a
/// (possibly parallel) refresh.
pub fn refresh_agent(
    config: &SimulatorConfig,
    diffusion: &DiffusionTable,
    map: &WorldMap,
    id: AgentId,
    state: &mut AgentState,
    agent_positions: &FxHashMap<AgentId, Position>,
    now: u64,
) {
    state.scent.fill(0.0);
    state.vision.fill(0.0);

    let lifetime = config.removed_item_lifetime as u64;
    let vision_r = config.vision_range as i64;
    let hood = map.get_fixed_neighborhood(state.position);

    for patch in &hood.patches {
        let mut interior = patch.lock();
        interior.reap(now, lifetime);

        for item in &interior.items {
            let ty = &config.item_types[item.item_type as usize];
            let dx = item.location.x - state.position.x;
            let dy = item.location.y - state.position.y;

            // Scent: accumulated emissions, minus those lost to deletion.
            let age = (now - item.creation_time).min(lifetime - 1);
            let mut factor = diffusion.value(age, dx, dy);
            if item.is_deleted() {
                factor -= diffusion.value(now - item.deletion_time, dx, dy);
            }
            if factor != 0.0 {
                for (acc, &s) in state.scent.iter_mut().zip(&ty.scent) {
                    *acc += factor as f32 * s;
                }
            }

            // Vision: only undeleted items are drawn.
            if !item.is_deleted()
                && dx.abs() <= vision_r
                && dy.abs() <= vision_r
                && let Some(base) = frame_pixel(config, state.direction, dx, dy)
            {
                for (c, &color) in ty.color.iter().enumerate() {
                    state.vision[base + c] += color;
                }
            }
        }

        for &other in &interior.agents {
            if other == id {
                continue; // an agent never appears in its own vision
            }
            let Some(&pos) = agent_positions.get(&other) else {
                continue;
            };
            let dx = pos.x - state.position.x;
            let dy = pos.y - state.position.y;
            if dx.abs() <= vision_r
                && dy.abs() <= vision_r
                && let Some(base) = frame_pixel(config, state.direction, dx, dy)
            {
                for (c, &color) in config.agent_color.iter().enumerate() {
                    state.vision[base + c] += color;
                }
            }
        }
    }
}
