//! forage — smallest end-to-end demo of the gridworld simulator.
//!
//! A handful of agents wander a procedurally generated world of berries
//! (collectible, clustered by an attractive self-interaction) and walls
//! (movement-blocking, spread out by a repulsive one).  Each agent follows
//! a one-line policy: turn toward the strongest scent in view, otherwise
//! forward.  Run for a while, print the haul, and leave a save file behind.

use std::sync::Arc;

use anyhow::Result;

use gw_core::{
    ActionPolicy, AgentId, Direction, IntensityFn, InteractionFn, ItemType, MoveConflictPolicy,
    SimulatorConfig, TurnDirection,
};
use gw_sim::Simulator;

// ── Constants ─────────────────────────────────────────────────────────────────

const AGENT_COUNT: u64 = 4;
const TICKS: u64 = 500;
const SEED: u32 = 1234;
const SAVE_PATH: &str = "forage.sav";

// ── Configuration ─────────────────────────────────────────────────────────────

fn berry(type_count: usize) -> ItemType {
    ItemType {
        name: "berry".into(),
        scent: vec![1.0, 0.0, 0.0],
        color: vec![0.0, 1.0, 0.0],
        required_counts: vec![0; type_count],
        required_costs: vec![0; type_count],
        blocks_movement: false,
        intensity: IntensityFn::Constant(vec![-4.5, -6.0]),
        interactions: vec![
            // Berries clump into patches.
            InteractionFn::PiecewiseBox {
                cutoff1: 10.0,
                cutoff2: 40.0,
                value1: 2.0,
                value2: -0.5,
            },
            InteractionFn::Zero,
        ],
    }
}

fn wall(type_count: usize) -> ItemType {
    ItemType {
        name: "wall".into(),
        scent: vec![0.0, 0.0, 0.0],
        color: vec![0.6, 0.3, 0.1],
        required_counts: vec![0; type_count],
        required_costs: vec![0; type_count],
        blocks_movement: true,
        intensity: IntensityFn::Constant(vec![-6.0, -5.5]),
        interactions: vec![
            InteractionFn::Zero,
            // Walls repel each other into scattered rubble.
            InteractionFn::Cross {
                near: 3.0,
                far: 6.0,
                near_axis: 1.0,
                near_misaligned: -2.0,
                far_axis: 0.5,
                far_misaligned: -1.0,
            },
        ],
    }
}

fn config() -> SimulatorConfig {
    SimulatorConfig {
        random_seed: SEED,
        max_steps_per_move: 1,
        scent_dim: 3,
        color_dim: 3,
        vision_range: 4,
        allowed_moves: [
            ActionPolicy::Allowed,   // forward
            ActionPolicy::Disallowed, // backward
            ActionPolicy::Ignored,   // sidesteps are accepted but do nothing
            ActionPolicy::Ignored,
        ],
        allowed_turns: [ActionPolicy::Allowed; 4],
        no_op_allowed: true,
        patch_size: 16,
        mcmc_iterations: 10,
        item_types: vec![berry(2), wall(2)],
        agent_color: vec![1.0, 0.0, 0.0],
        conflict_policy: MoveConflictPolicy::Random,
        scent_decay: 0.4,
        scent_diffusion: 0.14,
        removed_item_lifetime: 200,
    }
}

// ── Policy ────────────────────────────────────────────────────────────────────

/// Turn toward the side of the vision raster with more berry color;
/// otherwise keep walking forward.
fn act(sim: &Simulator, id: AgentId, tick: u64) -> Result<()> {
    let state = sim.agent_state(id)?;
    let cfg = sim.config();
    let side = cfg.vision_side();
    let c = cfg.color_dim as usize;

    // Green channel (berry color), split into left and right halves.
    let mut left = 0.0_f32;
    let mut right = 0.0_f32;
    for row in 0..side {
        for col in 0..side {
            let g = state.vision[(row * side + col) * c + 1];
            if col < side / 2 {
                left += g;
            } else if col > side / 2 {
                right += g;
            }
        }
    }

    // An occasional random-ish turn keeps agents from orbiting one clump.
    if tick % 13 == id.0 % 13 {
        sim.turn_agent(id, TurnDirection::Left)?;
    } else if left > right * 1.5 {
        sim.turn_agent(id, TurnDirection::Left)?;
    } else if right > left * 1.5 {
        sim.turn_agent(id, TurnDirection::Right)?;
    } else {
        // Blocked forward moves are fine; the tick still completes.
        sim.move_agent(id, Direction::Up, 1)?;
    }
    Ok(())
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::init();

    let sim = Arc::new(Simulator::new(config())?);
    let mut agents: Vec<AgentId> = Vec::new();
    for k in 0..AGENT_COUNT {
        // Spawns collide at the origin under the Random policy, so each
        // new agent walks one cell off along its own compass direction
        // (k left turns, then forward) before the next spawn.
        let id = sim.add_agent()?;
        let others_stand = |sim: &Simulator, agents: &[AgentId]| -> Result<()> {
            for &prev in agents {
                sim.no_op(prev)?;
            }
            Ok(())
        };
        for _ in 0..k {
            others_stand(&sim, &agents)?;
            sim.turn_agent(id, TurnDirection::Left)?;
        }
        others_stand(&sim, &agents)?;
        sim.move_agent(id, Direction::Up, 1)?;
        // One more standing round so the move resolves before the next
        // spawn checks the origin for occupancy.
        others_stand(&sim, &agents)?;
        agents.push(id);
    }
    println!("spawned {} agents at tick {}", agents.len(), sim.time());

    let start = std::time::Instant::now();
    for tick in 0..TICKS {
        for &id in &agents {
            act(&sim, id, tick)?;
        }
    }
    let elapsed = start.elapsed();

    println!(
        "ran {TICKS} ticks in {elapsed:.2?} ({:.0} ticks/s)",
        TICKS as f64 / elapsed.as_secs_f64()
    );
    for &id in &agents {
        let state = sim.agent_state(id)?;
        println!(
            "  agent {}: at {} facing {}, collected {} berries",
            id.0, state.position, state.direction, state.collected[0]
        );
    }

    gw_wire::save(&sim, SAVE_PATH)?;
    println!("world saved to {SAVE_PATH}");
    Ok(())
}
