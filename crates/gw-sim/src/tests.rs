//! Integration tests for the simulator core.
//!
//! Scenario setups that need agents away from the spawn cell are built as
//! `SimulatorImage`s and restored, which doubles as coverage for the
//! snapshot/restore path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use gw_core::{
    ActionPolicy, AgentId, Direction, GwError, IntensityFn, InteractionFn, Item, ItemType,
    MoveConflictPolicy, Position, SimulatorConfig, TurnDirection,
};
use gw_map::PatchImage;

use crate::{AgentImage, Simulator, SimulatorImage, StepOutcome};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// An item type that the Gibbs sampler will essentially never place, so
/// scenario worlds stay empty except for hand-placed items.
fn scarce_type(name: &str, type_count: usize) -> ItemType {
    ItemType {
        name: name.into(),
        scent: vec![1.0],
        color: vec![1.0],
        required_counts: vec![0; type_count],
        required_costs: vec![0; type_count],
        blocks_movement: false,
        intensity: IntensityFn::Constant(vec![-50.0; type_count]),
        interactions: vec![InteractionFn::Zero; type_count],
    }
}

fn base_config(item_types: Vec<ItemType>, conflict: MoveConflictPolicy) -> SimulatorConfig {
    SimulatorConfig {
        random_seed: 7,
        max_steps_per_move: 4,
        scent_dim: 1,
        color_dim: 1,
        vision_range: 2,
        allowed_moves: [ActionPolicy::Allowed; 4],
        allowed_turns: [ActionPolicy::Allowed; 4],
        no_op_allowed: true,
        patch_size: 8,
        mcmc_iterations: 10,
        item_types,
        agent_color: vec![9.0],
        conflict_policy: conflict,
        scent_decay: 0.4,
        scent_diffusion: 0.14,
        removed_item_lifetime: 100,
    }
}

fn agent_image(config: &SimulatorConfig, id: u64, pos: Position, dir: Direction) -> AgentImage {
    AgentImage {
        id: AgentId(id),
        position: pos,
        direction: dir,
        scent: vec![0.0; config.scent_dim as usize],
        vision: vec![0.0; config.vision_len()],
        acted: false,
        active: true,
        requested_position: pos,
        requested_direction: dir,
        collected: vec![0; config.item_types.len()],
    }
}

/// Build a simulator at `time` with the given agents and hand-placed items,
/// with every touched patch pre-fixed and empty otherwise.
fn scenario(
    config: SimulatorConfig,
    time: u64,
    agents: Vec<AgentImage>,
    items: Vec<Item>,
) -> Simulator {
    let n = config.patch_size as i64;
    let mut patch_positions: Vec<Position> = Vec::new();
    let mut note = |world: Position| {
        let pp = world.div_floor(n);
        if !patch_positions.contains(&pp) {
            patch_positions.push(pp);
        }
    };
    for agent in &agents {
        note(agent.position);
    }
    for item in &items {
        note(item.location);
    }
    patch_positions.sort_unstable();

    let patches = patch_positions
        .iter()
        .map(|&pp| PatchImage {
            position: pp,
            fixed: true,
            items: items
                .iter()
                .filter(|i| i.location.div_floor(n) == pp)
                .copied()
                .collect(),
            agents: agents
                .iter()
                .filter(|a| a.position.div_floor(n) == pp)
                .map(|a| a.id)
                .collect(),
        })
        .collect();

    let image = SimulatorImage {
        config,
        time,
        acted: 0,
        agents: agents.into_iter().map(Some).collect(),
        patches,
        requested_moves: Vec::new(),
    };
    Simulator::restore(image).unwrap()
}

fn pristine(item_type: u32, location: Position) -> Item {
    Item {
        item_type,
        location,
        creation_time: 0,
        deletion_time: 0,
    }
}

// ── Barrier and permissions ───────────────────────────────────────────────────

#[cfg(test)]
mod barrier {
    use super::*;

    #[test]
    fn time_advances_only_when_all_active_agents_acted() {
        let cfg = base_config(vec![], MoveConflictPolicy::FirstComeFirstServed);
        let sim = scenario(
            cfg.clone(),
            10,
            vec![
                agent_image(&cfg, 0, Position::new(0, 0), Direction::Up),
                agent_image(&cfg, 1, Position::new(0, 2), Direction::Up),
            ],
            vec![],
        );

        sim.no_op(AgentId(0)).unwrap();
        assert_eq!(sim.time(), 10, "barrier not yet full");
        sim.no_op(AgentId(1)).unwrap();
        assert_eq!(sim.time(), 11, "barrier closed, tick advanced");
    }

    #[test]
    fn second_action_in_a_tick_is_rejected() {
        let cfg = base_config(vec![], MoveConflictPolicy::FirstComeFirstServed);
        let sim = scenario(
            cfg.clone(),
            10,
            vec![
                agent_image(&cfg, 0, Position::new(0, 0), Direction::Up),
                agent_image(&cfg, 1, Position::new(0, 2), Direction::Up),
            ],
            vec![],
        );

        sim.no_op(AgentId(0)).unwrap();
        assert!(matches!(
            sim.no_op(AgentId(0)),
            Err(GwError::AgentAlreadyActed(AgentId(0)))
        ));
    }

    #[test]
    fn permissions_are_enforced() {
        let mut cfg = base_config(vec![], MoveConflictPolicy::FirstComeFirstServed);
        cfg.allowed_moves[Direction::Left.as_u8() as usize] = ActionPolicy::Disallowed;
        cfg.allowed_turns[TurnDirection::Reverse.as_u8() as usize] = ActionPolicy::Disallowed;
        cfg.no_op_allowed = false;
        let sim = scenario(
            cfg.clone(),
            10,
            vec![
                agent_image(&cfg, 0, Position::new(0, 0), Direction::Up),
                agent_image(&cfg, 1, Position::new(0, 2), Direction::Up),
            ],
            vec![],
        );

        let a = AgentId(0);
        assert!(matches!(
            sim.move_agent(a, Direction::Left, 1),
            Err(GwError::ViolatedPermissions)
        ));
        assert!(matches!(
            sim.turn_agent(a, TurnDirection::Reverse),
            Err(GwError::ViolatedPermissions)
        ));
        assert!(matches!(sim.no_op(a), Err(GwError::ViolatedPermissions)));
        assert!(matches!(
            sim.move_agent(a, Direction::Up, 99),
            Err(GwError::ViolatedPermissions)
        ));
        // A rejected action must not count toward the barrier.
        assert_eq!(sim.time(), 10);
        sim.move_agent(a, Direction::Up, 1).unwrap();
    }

    #[test]
    fn unknown_agent_is_rejected() {
        let sim =
            Simulator::new(base_config(vec![], MoveConflictPolicy::NoCollisions)).unwrap();
        assert!(matches!(
            sim.no_op(AgentId(3)),
            Err(GwError::InvalidAgentId(AgentId(3)))
        ));
        assert!(matches!(
            sim.agent_state(AgentId(0)),
            Err(GwError::InvalidAgentId(_))
        ));
    }

    #[test]
    fn removing_the_last_straggler_closes_the_tick() {
        let cfg = base_config(vec![], MoveConflictPolicy::FirstComeFirstServed);
        let sim = scenario(
            cfg.clone(),
            10,
            vec![
                agent_image(&cfg, 0, Position::new(0, 0), Direction::Up),
                agent_image(&cfg, 1, Position::new(0, 2), Direction::Up),
            ],
            vec![],
        );

        sim.no_op(AgentId(0)).unwrap();
        assert_eq!(sim.time(), 10);
        sim.remove_agent(AgentId(1)).unwrap();
        assert_eq!(sim.time(), 11, "removal of the only straggler closes the barrier");
        assert_eq!(sim.agent_ids(), vec![AgentId(0)]);
    }

    #[test]
    fn deactivating_a_straggler_closes_the_tick() {
        let cfg = base_config(vec![], MoveConflictPolicy::FirstComeFirstServed);
        let sim = scenario(
            cfg.clone(),
            10,
            vec![
                agent_image(&cfg, 0, Position::new(0, 0), Direction::Up),
                agent_image(&cfg, 1, Position::new(0, 2), Direction::Up),
            ],
            vec![],
        );

        sim.no_op(AgentId(0)).unwrap();
        sim.set_active(AgentId(1), false).unwrap();
        assert_eq!(sim.time(), 11);
        assert!(!sim.is_active(AgentId(1)).unwrap());

        // The inactive agent cannot act...
        assert!(sim.no_op(AgentId(1)).is_err());
        // ...and does not hold up the next tick.
        sim.no_op(AgentId(0)).unwrap();
        assert_eq!(sim.time(), 12);
    }

    #[test]
    fn observer_sees_every_step() {
        let cfg = base_config(vec![], MoveConflictPolicy::FirstComeFirstServed);
        let sim = scenario(
            cfg.clone(),
            0,
            vec![agent_image(&cfg, 0, Position::new(0, 0), Direction::Up)],
            vec![],
        );

        let ticks = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&ticks);
        sim.set_observer(Arc::new(move |outcome: &StepOutcome| {
            seen.store(outcome.time, Ordering::SeqCst);
            assert_eq!(outcome.acted, vec![AgentId(0)]);
        }));

        sim.no_op(AgentId(0)).unwrap();
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        sim.no_op(AgentId(0)).unwrap();
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }
}

// ── Spawning ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod spawning {
    use super::*;

    #[test]
    fn add_agent_spawns_at_origin_with_fresh_perception() {
        let sim =
            Simulator::new(base_config(vec![], MoveConflictPolicy::FirstComeFirstServed))
                .unwrap();
        let id = sim.add_agent().unwrap();
        let state = sim.agent_state(id).unwrap();
        assert_eq!(state.position, Position::ORIGIN);
        assert_eq!(state.direction, Direction::Up);
        assert_eq!(state.vision.len(), sim.config().vision_len());
        // The sole agent spawned pre-acted, which immediately closed the
        // barrier: the spawn tick completed without requiring an action.
        assert_eq!(sim.time(), 1);
    }

    #[test]
    fn occupied_spawn_cell_is_rejected() {
        let cfg = base_config(vec![], MoveConflictPolicy::FirstComeFirstServed);
        let sim = scenario(
            cfg.clone(),
            10,
            vec![
                agent_image(&cfg, 0, Position::new(0, 0), Direction::Up),
                agent_image(&cfg, 1, Position::new(0, 2), Direction::Up),
            ],
            vec![],
        );
        assert!(matches!(sim.add_agent(), Err(GwError::AgentAlreadyExists)));
    }

    #[test]
    fn stacked_spawns_allowed_without_collisions() {
        let sim = Simulator::new(base_config(vec![], MoveConflictPolicy::NoCollisions)).unwrap();
        let a = sim.add_agent().unwrap();
        let b = sim.add_agent().unwrap();
        assert_ne!(a, b);
        assert_eq!(sim.agent_state(a).unwrap().position, Position::ORIGIN);
        assert_eq!(sim.agent_state(b).unwrap().position, Position::ORIGIN);
    }
}

// ── Collision resolution scenarios ────────────────────────────────────────────

#[cfg(test)]
mod collisions {
    use super::*;

    /// Two agents closing head-on under first-come-first-served: the
    /// backward move is configured `Ignored`, so the second agent stays
    /// put (successfully) while the first advances.
    #[test]
    fn head_on_fcfs() {
        let mut cfg = base_config(vec![], MoveConflictPolicy::FirstComeFirstServed);
        cfg.allowed_moves[Direction::Down.as_u8() as usize] = ActionPolicy::Ignored;
        let sim = scenario(
            cfg.clone(),
            10,
            vec![
                agent_image(&cfg, 0, Position::new(0, 0), Direction::Up),
                agent_image(&cfg, 1, Position::new(0, 2), Direction::Down),
            ],
            vec![],
        );

        sim.move_agent(AgentId(0), Direction::Up, 1).unwrap();
        sim.move_agent(AgentId(1), Direction::Down, 1).unwrap();

        let a0 = sim.agent_state(AgentId(0)).unwrap();
        let a1 = sim.agent_state(AgentId(1)).unwrap();
        assert_eq!(a0.position, Position::new(0, 1));
        assert_eq!(a1.position, Position::new(0, 2), "ignored move is a successful no-op");
        assert!(a0.collected.iter().all(|&c| c == 0));
        assert!(a1.collected.iter().all(|&c| c == 0));
    }

    /// Under `Random`, an agent standing on the contested cell always
    /// keeps it — the incoming mover loses deterministically.
    #[test]
    fn standing_still_wins_under_random() {
        let cfg = base_config(vec![], MoveConflictPolicy::Random);
        let sim = scenario(
            cfg.clone(),
            10,
            vec![
                agent_image(&cfg, 0, Position::new(0, 0), Direction::Up),
                agent_image(&cfg, 1, Position::new(0, 2), Direction::Down),
            ],
            vec![],
        );

        sim.no_op(AgentId(0)).unwrap();
        // Facing down, a forward move of 2 targets (0, 0).
        sim.move_agent(AgentId(1), Direction::Up, 2).unwrap();

        assert_eq!(sim.agent_state(AgentId(0)).unwrap().position, Position::new(0, 0));
        assert_eq!(sim.agent_state(AgentId(1)).unwrap().position, Position::new(0, 2));
    }

    /// FCFS: the first requester of a contested free cell wins; the loser
    /// stays where it was.
    #[test]
    fn first_requester_wins_contested_cell() {
        let cfg = base_config(vec![], MoveConflictPolicy::FirstComeFirstServed);
        let sim = scenario(
            cfg.clone(),
            10,
            vec![
                agent_image(&cfg, 0, Position::new(0, 0), Direction::Up),
                agent_image(&cfg, 1, Position::new(2, 1), Direction::Left),
            ],
            vec![],
        );

        // Both target (0, 1).
        sim.move_agent(AgentId(0), Direction::Up, 1).unwrap();
        sim.move_agent(AgentId(1), Direction::Up, 2).unwrap();

        assert_eq!(sim.agent_state(AgentId(0)).unwrap().position, Position::new(0, 1));
        assert_eq!(sim.agent_state(AgentId(1)).unwrap().position, Position::new(2, 1));
    }

    /// A blocked loser blocks its own cell in turn: a chain of movers
    /// behind a stander all stay put.
    #[test]
    fn losses_cascade_to_fixpoint() {
        let cfg = base_config(vec![], MoveConflictPolicy::FirstComeFirstServed);
        let sim = scenario(
            cfg.clone(),
            10,
            vec![
                agent_image(&cfg, 0, Position::new(0, 0), Direction::Up),
                agent_image(&cfg, 1, Position::new(0, 1), Direction::Up),
                agent_image(&cfg, 2, Position::new(0, 2), Direction::Up),
            ],
            vec![],
        );

        sim.move_agent(AgentId(0), Direction::Up, 1).unwrap(); // → (0,1)
        sim.move_agent(AgentId(1), Direction::Up, 1).unwrap(); // → (0,2)
        sim.no_op(AgentId(2)).unwrap(); // stands on (0,2)

        assert_eq!(sim.agent_state(AgentId(0)).unwrap().position, Position::new(0, 0));
        assert_eq!(sim.agent_state(AgentId(1)).unwrap().position, Position::new(0, 1));
        assert_eq!(sim.agent_state(AgentId(2)).unwrap().position, Position::new(0, 2));
    }

    /// No two active agents ever share a cell under a colliding policy.
    #[test]
    fn positions_stay_distinct_over_many_ticks() {
        let cfg = base_config(vec![], MoveConflictPolicy::Random);
        let sim = scenario(
            cfg.clone(),
            0,
            vec![
                agent_image(&cfg, 0, Position::new(0, 0), Direction::Up),
                agent_image(&cfg, 1, Position::new(0, 1), Direction::Down),
                agent_image(&cfg, 2, Position::new(1, 0), Direction::Left),
                agent_image(&cfg, 3, Position::new(1, 1), Direction::Right),
            ],
            vec![],
        );

        let dirs = [Direction::Up, Direction::Left, Direction::Right, Direction::Down];
        for t in 0..50u64 {
            for id in 0..4u64 {
                let dir = dirs[((t + id) % 4) as usize];
                sim.move_agent(AgentId(id), dir, 1).unwrap();
            }
            let mut positions: Vec<Position> = (0..4)
                .map(|id| sim.agent_state(AgentId(id)).unwrap().position)
                .collect();
            positions.sort_unstable();
            positions.dedup();
            assert_eq!(positions.len(), 4, "two agents share a cell at tick {t}");
        }
    }

    /// Movement into a cell holding a blocking item is rejected for
    /// everyone, but the attempt still succeeds as an action.
    #[test]
    fn blocking_item_rejects_entry() {
        let mut wall = scarce_type("wall", 1);
        wall.blocks_movement = true;
        let cfg = base_config(vec![wall], MoveConflictPolicy::FirstComeFirstServed);
        let sim = scenario(
            cfg.clone(),
            10,
            vec![agent_image(&cfg, 0, Position::new(0, 0), Direction::Up)],
            vec![pristine(0, Position::new(0, 1))],
        );

        sim.move_agent(AgentId(0), Direction::Up, 1).unwrap();
        assert_eq!(sim.time(), 11);
        assert_eq!(sim.agent_state(AgentId(0)).unwrap().position, Position::new(0, 0));
    }
}

// ── Collection ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod collection {
    use super::*;

    fn two_type_config() -> SimulatorConfig {
        // Type 0 ("lode") requires one collected "key" (type 1) and costs
        // nothing; type 1 has no prerequisites.
        let mut lode = scarce_type("lode", 2);
        lode.required_counts = vec![0, 1];
        let key = scarce_type("key", 2);
        base_config(vec![lode, key], MoveConflictPolicy::FirstComeFirstServed)
    }

    #[test]
    fn prerequisite_gated_collection() {
        let cfg = two_type_config();
        let mut holder = agent_image(&cfg, 0, Position::new(0, 0), Direction::Up);
        holder.collected = vec![0, 1]; // already holds one key
        let sim = scenario(
            cfg,
            10,
            vec![
                holder,
                agent_image(&two_type_config(), 1, Position::new(5, 5), Direction::Up),
            ],
            vec![pristine(0, Position::new(0, 1))],
        );

        sim.move_agent(AgentId(0), Direction::Up, 1).unwrap();
        sim.no_op(AgentId(1)).unwrap();

        let state = sim.agent_state(AgentId(0)).unwrap();
        assert_eq!(state.position, Position::new(0, 1));
        assert_eq!(state.collected, vec![1, 1], "lode collected, key kept (zero cost)");

        let view = sim.map_view(Position::new(0, 0), Position::new(7, 7));
        let item = view.patches[0]
            .items
            .iter()
            .find(|i| i.location == Position::new(0, 1))
            .unwrap();
        assert_eq!(item.deletion_time, 11, "deleted at the tick the agent arrived");
    }

    #[test]
    fn missing_prerequisite_leaves_item() {
        let cfg = two_type_config();
        let sim = scenario(
            cfg.clone(),
            10,
            vec![
                agent_image(&cfg, 0, Position::new(0, 0), Direction::Up),
                agent_image(&cfg, 1, Position::new(5, 5), Direction::Up),
            ],
            vec![pristine(0, Position::new(0, 1))],
        );

        sim.move_agent(AgentId(0), Direction::Up, 1).unwrap();
        sim.no_op(AgentId(1)).unwrap();

        let state = sim.agent_state(AgentId(0)).unwrap();
        assert_eq!(state.collected, vec![0, 0]);
        let view = sim.map_view(Position::new(0, 0), Position::new(7, 7));
        let item = view.patches[0]
            .items
            .iter()
            .find(|i| i.location == Position::new(0, 1))
            .unwrap();
        assert_eq!(item.deletion_time, 0, "item not collected without the key");
    }

    #[test]
    fn costs_are_deducted_saturating() {
        // Type 0 costs two of type 1 but requires only one.
        let mut lode = scarce_type("lode", 2);
        lode.required_counts = vec![0, 1];
        lode.required_costs = vec![0, 2];
        let key = scarce_type("key", 2);
        let cfg = base_config(vec![lode, key], MoveConflictPolicy::FirstComeFirstServed);

        let mut holder = agent_image(&cfg, 0, Position::new(0, 0), Direction::Up);
        holder.collected = vec![0, 1];
        let sim = scenario(
            cfg.clone(),
            10,
            vec![
                holder,
                agent_image(&cfg, 1, Position::new(5, 5), Direction::Up),
            ],
            vec![pristine(0, Position::new(0, 1))],
        );

        sim.move_agent(AgentId(0), Direction::Up, 1).unwrap();
        sim.no_op(AgentId(1)).unwrap();

        let state = sim.agent_state(AgentId(0)).unwrap();
        assert_eq!(state.collected, vec![1, 0], "cost saturates at zero");
    }
}

// ── Perception ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod perception {
    use super::*;

    #[test]
    fn scent_matches_the_diffusion_table() {
        // A single scented item, no agents nearby until t = 10: a newly
        // spawned agent at half a patch's distance must read exactly the
        // table entry for that age and offset.
        let cfg = base_config(
            vec![scarce_type("musk", 1)],
            MoveConflictPolicy::FirstComeFirstServed,
        );
        let sim = scenario(
            cfg.clone(),
            10,
            vec![agent_image(&cfg, 0, Position::new(2, 7), Direction::Up)],
            vec![pristine(0, Position::new(4, 0))],
        );

        let id = sim.add_agent().unwrap(); // spawns at the origin at t = 10
        let state = sim.agent_state(id).unwrap();
        let expected = sim.diffusion().value(10, 4, 0) as f32;
        assert!(expected > 0.0);
        assert!(
            (state.scent[0] - expected).abs() < 1e-6,
            "got {}, expected {expected}",
            state.scent[0]
        );
    }

    #[test]
    fn deleted_item_trail_is_the_emission_window() {
        let cfg = base_config(
            vec![scarce_type("musk", 1)],
            MoveConflictPolicy::FirstComeFirstServed,
        );
        let mut item = pristine(0, Position::new(4, 0));
        item.deletion_time = 5;
        let sim = scenario(
            cfg.clone(),
            10,
            vec![agent_image(&cfg, 0, Position::new(2, 7), Direction::Up)],
            vec![item],
        );

        let id = sim.add_agent().unwrap();
        let state = sim.agent_state(id).unwrap();
        let expected = (sim.diffusion().value(10, 4, 0) - sim.diffusion().value(5, 4, 0)) as f32;
        assert!(
            (state.scent[0] - expected).abs() < 1e-6,
            "got {}, expected {expected}",
            state.scent[0]
        );
    }

    #[test]
    fn vision_is_rotated_into_the_agent_frame() {
        let cfg = base_config(
            vec![scarce_type("flag", 1)],
            MoveConflictPolicy::FirstComeFirstServed,
        );
        // Agent at the origin facing right; item one cell to its east —
        // directly ahead in its own frame.
        let sim = scenario(
            cfg.clone(),
            10,
            vec![
                agent_image(&cfg, 0, Position::new(0, 0), Direction::Right),
                agent_image(&cfg, 1, Position::new(5, 5), Direction::Up),
            ],
            vec![pristine(0, Position::new(1, 0))],
        );

        sim.no_op(AgentId(0)).unwrap();
        sim.no_op(AgentId(1)).unwrap();

        let state = sim.agent_state(AgentId(0)).unwrap();
        // Ahead by one: frame offset (0, 1) → row R-1, center column.
        let r = cfg.vision_range as usize;
        assert_eq!(state.vision_at(&cfg, r - 1, r, 0), 1.0);
        // Center pixel holds nothing: the agent itself is never drawn.
        assert_eq!(state.vision_at(&cfg, r, r, 0), 0.0);
    }

    #[test]
    fn other_agents_are_drawn_self_is_not() {
        let cfg = base_config(vec![], MoveConflictPolicy::FirstComeFirstServed);
        let sim = scenario(
            cfg.clone(),
            10,
            vec![
                agent_image(&cfg, 0, Position::new(0, 0), Direction::Up),
                agent_image(&cfg, 1, Position::new(0, 1), Direction::Up),
            ],
            vec![],
        );

        sim.no_op(AgentId(0)).unwrap();
        sim.no_op(AgentId(1)).unwrap();

        let r = cfg.vision_range as usize;
        let a0 = sim.agent_state(AgentId(0)).unwrap();
        assert_eq!(a0.vision_at(&cfg, r - 1, r, 0), 9.0, "neighbor ahead");
        assert_eq!(a0.vision_at(&cfg, r, r, 0), 0.0, "self never drawn");

        // From agent 1's perspective, agent 0 is behind it.
        let a1 = sim.agent_state(AgentId(1)).unwrap();
        assert_eq!(a1.vision_at(&cfg, r + 1, r, 0), 9.0);
    }

    #[test]
    fn deleted_items_age_out_and_are_reaped() {
        let mut cfg = base_config(
            vec![scarce_type("musk", 1)],
            MoveConflictPolicy::FirstComeFirstServed,
        );
        cfg.removed_item_lifetime = 4;
        let mut item = pristine(0, Position::new(2, 2));
        item.deletion_time = 10;
        let sim = scenario(
            cfg.clone(),
            12,
            vec![
                agent_image(&cfg, 0, Position::new(0, 0), Direction::Up),
                agent_image(&cfg, 1, Position::new(5, 5), Direction::Up),
            ],
            vec![item],
        );

        // Ticks 13 and 14; at 14 = deletion_time + lifetime the item is
        // reaped during the refresh.
        for _ in 0..2 {
            sim.no_op(AgentId(0)).unwrap();
            sim.no_op(AgentId(1)).unwrap();
        }
        let view = sim.map_view(Position::new(0, 0), Position::new(7, 7));
        assert!(view.patches[0].items.is_empty(), "trail aged out, item reaped");
    }
}

// ── Map views and snapshots ───────────────────────────────────────────────────

#[cfg(test)]
mod snapshots {
    use super::*;

    #[test]
    fn map_view_contains_only_fixed_patches() {
        let cfg = base_config(
            vec![scarce_type("x", 1)],
            MoveConflictPolicy::FirstComeFirstServed,
        );
        let sim = scenario(
            cfg.clone(),
            10,
            vec![agent_image(&cfg, 0, Position::new(0, 0), Direction::Up)],
            vec![],
        );
        // Only patch (0,0) is fixed; the query spans four patches.
        let view = sim.map_view(Position::new(-8, -8), Position::new(15, 15));
        assert_eq!(view.patches.len(), 1);
        assert_eq!(view.patches[0].position, Position::new(0, 0));
        assert_eq!(view.patches[0].agents, vec![AgentId(0)]);
    }

    #[test]
    fn map_view_rasters_have_documented_shapes() {
        let cfg = base_config(
            vec![scarce_type("x", 1)],
            MoveConflictPolicy::FirstComeFirstServed,
        );
        let sim = scenario(
            cfg.clone(),
            10,
            vec![agent_image(&cfg, 0, Position::new(3, 2), Direction::Up)],
            vec![pristine(0, Position::new(1, 1))],
        );
        let view = sim.map_view(Position::new(0, 0), Position::new(7, 7));
        let patch = &view.patches[0];
        let n = cfg.patch_size as usize;
        assert_eq!(patch.scent.len(), n * n * cfg.scent_dim as usize);
        assert_eq!(patch.vision.len(), n * n * cfg.color_dim as usize);

        // The item's own cell carries its color and the strongest scent.
        let cell = |p: Position| (p.y as usize * n + p.x as usize);
        assert_eq!(patch.vision[cell(Position::new(1, 1))], 1.0);
        assert_eq!(patch.vision[cell(Position::new(3, 2))], 9.0, "agent color");
        assert!(patch.scent[cell(Position::new(1, 1))] > patch.scent[cell(Position::new(6, 6))]);
    }

    #[test]
    fn snapshot_restore_roundtrip_preserves_behavior() {
        let cfg = base_config(
            vec![scarce_type("x", 1)],
            MoveConflictPolicy::Random,
        );
        let sim = scenario(
            cfg.clone(),
            0,
            vec![
                agent_image(&cfg, 0, Position::new(0, 0), Direction::Up),
                agent_image(&cfg, 1, Position::new(3, 3), Direction::Down),
            ],
            vec![],
        );

        // Run a while, then snapshot mid-tick (agent 0 has acted, 1 has not).
        for _ in 0..10 {
            sim.move_agent(AgentId(0), Direction::Up, 1).unwrap();
            sim.move_agent(AgentId(1), Direction::Left, 1).unwrap();
        }
        sim.move_agent(AgentId(0), Direction::Right, 1).unwrap();

        let image = sim.snapshot();
        let twin = Simulator::restore(image.clone()).unwrap();
        assert_eq!(twin.snapshot(), image, "restore is lossless");

        // Both simulators must evolve identically from here.
        sim.move_agent(AgentId(1), Direction::Right, 1).unwrap();
        twin.move_agent(AgentId(1), Direction::Right, 1).unwrap();
        for _ in 0..10 {
            for id in [AgentId(0), AgentId(1)] {
                sim.move_agent(id, Direction::Up, 1).unwrap();
                twin.move_agent(id, Direction::Up, 1).unwrap();
            }
        }
        assert_eq!(sim.snapshot(), twin.snapshot());
    }
}
