//! The `Simulator`: agent table, action barrier, and the step procedure.
//!
//! # Concurrency
//!
//! A `Simulator` is shared by `Arc` and internally synchronized; worker
//! threads of the network server call its operations concurrently.  The
//! step procedure runs synchronously on whichever thread's action closes
//! the barrier.
//!
//! Lock inventory, in acquisition order (later locks may be taken while
//! holding earlier ones, never the reverse):
//!
//! 1. `structure` — serializes step execution and agent-table shape changes
//!    (add/remove/activate).  Action submission never takes it.
//! 2. `agents` table `RwLock` — held only to resolve id → `Arc`, released
//!    before the per-agent lock is taken.
//! 3. per-agent `Mutex` — one at a time, except nowhere (cross-agent reads
//!    go through position snapshots instead).
//! 4. per-patch `Mutex` — at most two at once, ascending position order.
//! 5. `requested_moves` — leaf.
//! 6. `tick` — leaf; guards the barrier counters only.
//!
//! The barrier itself is the pair `(acted, active)` in [`TickState`]: an
//! action increments `acted`, and the thread that makes `acted == active`
//! flips `stepping` and runs the step.  `acted` is zeroed at the start of
//! the step, while every active agent's `acted` flag is still set — no new
//! action can slip in between the reset and the flag clearing.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};

use gw_core::{
    ActionPolicy, AgentId, Direction, GwError, GwResult, MoveConflictPolicy, Position,
    SimulatorConfig, TurnDirection,
};
use gw_map::{DiffusionTable, PatchImage, WorldMap};

use crate::agent::{AgentImage, AgentState};
use crate::collision::{self, MoveRequest};
use crate::observer::{StepObserver, StepOutcome};
use crate::perception;
use crate::view::{MapPatch, MapView};

// ── Barrier state ─────────────────────────────────────────────────────────────

#[derive(Debug)]
struct TickState {
    /// Monotone tick counter; advances exactly once per completed barrier.
    time: u64,
    /// Active agents that have acted in the current tick.
    acted: u64,
    /// Number of active agents (the barrier size).
    active: u64,
    /// A step is currently executing; suppresses re-triggering.
    stepping: bool,
}

impl TickState {
    /// If the barrier is full, claim the step for the calling thread.
    fn try_close(&mut self) -> bool {
        if !self.stepping && self.active > 0 && self.acted >= self.active {
            self.stepping = true;
            true
        } else {
            false
        }
    }

    /// Count one submitted action and, if the barrier is now full, claim
    /// the step for the caller.
    fn try_close_after_increment(&mut self) -> bool {
        self.acted += 1;
        self.try_close()
    }
}

// ── Simulator ─────────────────────────────────────────────────────────────────

type AgentSlot = Arc<Mutex<AgentState>>;

/// The simulation core shared among all controller threads.
pub struct Simulator {
    config: Arc<SimulatorConfig>,
    map: WorldMap,
    diffusion: DiffusionTable,

    /// Dense agent table indexed by `AgentId`; removal leaves a tombstone
    /// so ids are never reused.
    agents: RwLock<Vec<Option<AgentSlot>>>,

    /// Pending move requests for the current tick, keyed by target cell;
    /// within one cell, submission order is preserved.
    requested_moves: Mutex<FxHashMap<Position, Vec<MoveRequest>>>,

    tick: Mutex<TickState>,
    structure: Mutex<()>,
    observer: RwLock<Option<Arc<dyn StepObserver>>>,
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator").finish_non_exhaustive()
    }
}

impl Simulator {
    /// Validate the configuration, build the diffusion table, and return an
    /// empty simulator at tick 0.
    pub fn new(config: SimulatorConfig) -> GwResult<Simulator> {
        config.validate()?;
        let diffusion = DiffusionTable::new(
            config.scent_decay,
            config.scent_diffusion,
            config.diffusion_radius(),
            config.removed_item_lifetime,
        )?;
        let config = Arc::new(config);
        Ok(Simulator {
            map: WorldMap::new(Arc::clone(&config)),
            config,
            diffusion,
            agents: RwLock::new(Vec::new()),
            requested_moves: Mutex::new(FxHashMap::default()),
            tick: Mutex::new(TickState {
                time: 0,
                acted: 0,
                active: 0,
                stepping: false,
            }),
            structure: Mutex::new(()),
            observer: RwLock::new(None),
        })
    }

    #[inline]
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    #[inline]
    pub fn world(&self) -> &WorldMap {
        &self.map
    }

    #[inline]
    pub fn diffusion(&self) -> &DiffusionTable {
        &self.diffusion
    }

    pub fn time(&self) -> u64 {
        self.tick.lock().time
    }

    /// Register the step callback (replacing any previous one).
    pub fn set_observer(&self, observer: Arc<dyn StepObserver>) {
        *self.observer.write() = Some(observer);
    }

    pub fn clear_observer(&self) {
        *self.observer.write() = None;
    }

    // ── Agent lifecycle ───────────────────────────────────────────────────

    /// Spawn a new agent at the origin, facing up.
    ///
    /// The new agent's perception is initialized immediately (fixing the
    /// origin neighborhood on the first spawn) and it counts as having
    /// acted, so it is not required to act before the tick that spawned it
    /// completes.
    pub fn add_agent(&self) -> GwResult<AgentId> {
        let guard = self.structure.lock();

        let positions = self.position_snapshot();
        if self.config.conflict_policy != MoveConflictPolicy::NoCollisions
            && positions.values().any(|&p| p == Position::ORIGIN)
        {
            return Err(GwError::AgentAlreadyExists);
        }

        let id = AgentId(self.agents.read().len() as u64);
        let mut state = AgentState::spawn(&self.config)?;
        state.acted = true;

        let now = self.tick.lock().time;
        perception::refresh_agent(
            &self.config,
            &self.diffusion,
            &self.map,
            id,
            &mut state,
            &positions,
            now,
        );

        let (patch_pos, _) = self.map.world_to_patch(state.position);
        self.map.get_or_create(patch_pos).lock().add_agent(id);
        self.agents.write().push(Some(Arc::new(Mutex::new(state))));

        let close = {
            let mut tick = self.tick.lock();
            tick.active += 1;
            tick.acted += 1;
            tick.try_close()
        };
        drop(guard);
        if close {
            self.step();
        }
        Ok(id)
    }

    /// Remove an agent: its patch residency and any pending move request
    /// are voided, and its table slot becomes a tombstone.
    pub fn remove_agent(&self, id: AgentId) -> GwResult<()> {
        let guard = self.structure.lock();

        let slot = self.agents.write().get_mut(id.index()).and_then(Option::take);
        let Some(slot) = slot else {
            return Err(GwError::InvalidAgentId(id));
        };

        let (was_active, had_acted) = {
            let mut state = slot.lock();
            // A straggler thread may still hold the old Arc; deactivating
            // makes any late action fail instead of touching a ghost.
            let flags = (state.active, state.acted);
            state.active = false;

            if state.acted {
                let mut requests = self.requested_moves.lock();
                if let Some(entry) = requests.get_mut(&state.requested_position) {
                    entry.retain(|r| r.agent != id);
                    if entry.is_empty() {
                        requests.remove(&state.requested_position);
                    }
                }
            }

            let (patch_pos, _) = self.map.world_to_patch(state.position);
            if let Some(patch) = self.map.get_if_exists(patch_pos) {
                patch.lock().remove_agent(id);
            }
            flags
        };

        let close = {
            let mut tick = self.tick.lock();
            if was_active {
                tick.active -= 1;
                if had_acted {
                    tick.acted -= 1;
                }
            }
            tick.try_close()
        };
        drop(guard);
        if close {
            self.step();
        }
        Ok(())
    }

    /// Activate or deactivate an agent.  Deactivating removes it from the
    /// barrier count (possibly closing the tick); reactivating re-adds it
    /// pre-acted, like a fresh spawn, so it is not required to act in the
    /// tick it rejoins.
    pub fn set_active(&self, id: AgentId, active: bool) -> GwResult<()> {
        let guard = self.structure.lock();
        let slot = self.slot(id)?;

        let close = {
            let mut state = slot.lock();
            if state.active == active {
                false
            } else {
                state.active = active;
                let mut tick = self.tick.lock();
                if active {
                    state.acted = true;
                    tick.active += 1;
                    tick.acted += 1;
                } else {
                    tick.active -= 1;
                    if state.acted {
                        tick.acted -= 1;
                    }
                }
                tick.try_close()
            }
        };
        drop(guard);
        if close {
            self.step();
        }
        Ok(())
    }

    pub fn is_active(&self, id: AgentId) -> GwResult<bool> {
        Ok(self.slot(id)?.lock().active)
    }

    /// Ids of all live agents, ascending.
    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.agents
            .read()
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| AgentId(i as u64))
            .collect()
    }

    /// Plain-data copy of one agent's state.
    pub fn agent_state(&self, id: AgentId) -> GwResult<AgentImage> {
        let slot = self.slot(id)?;
        let state = slot.lock();
        Ok(AgentImage::of(id, &state))
    }

    // ── Actions ───────────────────────────────────────────────────────────

    /// Request a relative move: `Up` is forward, `Down` backward, and so
    /// on, in the agent's own frame.
    pub fn move_agent(&self, id: AgentId, direction: Direction, steps: u32) -> GwResult<()> {
        if steps == 0 || steps > self.config.max_steps_per_move {
            return Err(GwError::ViolatedPermissions);
        }
        let policy = self.config.allowed_moves[direction.as_u8() as usize];
        if policy == ActionPolicy::Disallowed {
            return Err(GwError::ViolatedPermissions);
        }
        self.submit_action(id, |state| {
            state.requested_direction = state.direction;
            state.requested_position = if policy == ActionPolicy::Ignored {
                state.position
            } else {
                let (dx, dy) = direction.delta();
                let (wx, wy) = state
                    .direction
                    .to_world(dx * steps as i64, dy * steps as i64);
                state.position + Position::new(wx, wy)
            };
            Ok(())
        })
    }

    /// Request a turn relative to the current facing.  Turning agents stand
    /// still and therefore keep their cell in collision resolution.
    pub fn turn_agent(&self, id: AgentId, turn: TurnDirection) -> GwResult<()> {
        let policy = self.config.allowed_turns[turn.as_u8() as usize];
        if policy == ActionPolicy::Disallowed {
            return Err(GwError::ViolatedPermissions);
        }
        self.submit_action(id, |state| {
            state.requested_position = state.position;
            state.requested_direction = if policy == ActionPolicy::Ignored {
                state.direction
            } else {
                state.direction.compose(turn)
            };
            Ok(())
        })
    }

    /// Explicitly do nothing this tick.
    pub fn no_op(&self, id: AgentId) -> GwResult<()> {
        if !self.config.no_op_allowed {
            return Err(GwError::ViolatedPermissions);
        }
        self.submit_action(id, |state| {
            state.requested_position = state.position;
            state.requested_direction = state.direction;
            Ok(())
        })
    }

    /// Shared action plumbing: validate the agent, apply `fill` to set the
    /// requested move, register it, and close the barrier if this was the
    /// last pending action.
    fn submit_action(
        &self,
        id: AgentId,
        fill: impl FnOnce(&mut AgentState) -> GwResult<()>,
    ) -> GwResult<()> {
        let slot = self.slot(id)?;
        {
            let mut state = slot.lock();
            if !state.active || state.acted {
                return Err(GwError::AgentAlreadyActed(id));
            }
            fill(&mut state)?;
            state.acted = true;
            let request = MoveRequest {
                agent: id,
                from: state.position,
                to: state.requested_position,
            };
            self.requested_moves
                .lock()
                .entry(request.to)
                .or_default()
                .push(request);
        }

        let close = self.tick.lock().try_close_after_increment();
        if close {
            self.step();
        }
        Ok(())
    }

    // ── The step procedure ────────────────────────────────────────────────

    /// Run steps until the barrier stays open.  Entered by the thread whose
    /// action (or structural change) filled the barrier; `stepping` was
    /// already claimed under the tick lock.
    fn step(&self) {
        let _guard = self.structure.lock();
        loop {
            let outcome = self.run_step();
            if let Some(observer) = self.observer.read().clone() {
                observer.on_step(&outcome);
            }
            let mut tick = self.tick.lock();
            tick.stepping = false;
            if !tick.try_close() {
                break;
            }
        }
    }

    fn run_step(&self) -> StepOutcome {
        // Phase 0: zero the barrier counter.  Every active agent's `acted`
        // flag is still set, so no action can be counted before the flags
        // clear in phase 3.
        let time_before = {
            let mut tick = self.tick.lock();
            tick.acted = 0;
            tick.time
        };

        let requests = std::mem::take(&mut *self.requested_moves.lock());
        let slots = self.live_slots();

        // Phase 1: collision resolution.
        let acting: FxHashSet<AgentId> = requests
            .values()
            .flatten()
            .map(|r| r.agent)
            .collect();

        let mut occupied: FxHashSet<Position> = FxHashSet::default();
        for (id, slot) in &slots {
            if !acting.contains(id) {
                occupied.insert(slot.lock().position);
            }
        }

        let blocked_cells: FxHashSet<Position> = requests
            .keys()
            .copied()
            .filter(|&cell| self.cell_blocks_movement(cell))
            .collect();

        let winners = collision::resolve(
            self.config.conflict_policy,
            &requests,
            &blocked_cells,
            &occupied,
            self.config.random_seed as u64,
            time_before,
        );

        // Phase 2: advance time.
        let now = {
            let mut tick = self.tick.lock();
            tick.time += 1;
            tick.time
        };

        // Phase 3: apply winning moves and collect, ascending id order.
        let mut acted: Vec<AgentId> = acting.iter().copied().collect();
        acted.sort_unstable();
        for &id in &acted {
            let Some((_, slot)) = slots.iter().find(|(sid, _)| *sid == id) else {
                continue;
            };
            let mut state = slot.lock();
            if winners.contains(&id) {
                state.direction = state.requested_direction;
                if state.position != state.requested_position {
                    self.transfer_residency(id, state.position, state.requested_position);
                    state.position = state.requested_position;
                }
                self.collect_at(&mut state, now);
            }
        }

        // All acted flags clear together, including agents that were marked
        // acted without a request (fresh spawns, reactivations).
        for (_, slot) in &slots {
            slot.lock().acted = false;
        }

        // Phase 4: refresh perception against the post-move world.
        let positions = self.position_snapshot();
        self.refresh_all(&slots, &positions, now);

        StepOutcome { time: now, acted }
    }

    /// Move an agent's residency entry between patches, locking both in
    /// ascending position order.
    fn transfer_residency(&self, id: AgentId, from: Position, to: Position) {
        let (old_pos, _) = self.map.world_to_patch(from);
        let (new_pos, _) = self.map.world_to_patch(to);
        if old_pos == new_pos {
            return;
        }
        let old_patch = self.map.get_or_create(old_pos);
        let new_patch = self.map.get_or_create(new_pos);
        if old_pos < new_pos {
            let mut old = old_patch.lock();
            let mut new = new_patch.lock();
            old.remove_agent(id);
            new.add_agent(id);
        } else {
            let mut new = new_patch.lock();
            let mut old = old_patch.lock();
            old.remove_agent(id);
            new.add_agent(id);
        }
    }

    /// Auto-collect every eligible undeleted item under the agent.
    ///
    /// Eligibility: for every type `t`, `collected[t]` must reach the
    /// collected type's `required_counts[t]`.  Collection marks the item
    /// deleted at the current tick, increments the agent's counter, and
    /// deducts the per-type costs (saturating at zero).
    fn collect_at(&self, state: &mut AgentState, now: u64) {
        let (patch_pos, _) = self.map.world_to_patch(state.position);
        let Some(patch) = self.map.get_if_exists(patch_pos) else {
            return;
        };
        let mut interior = patch.lock();
        for item in interior.items.iter_mut() {
            if item.location != state.position || item.is_deleted() {
                continue;
            }
            let ty = &self.config.item_types[item.item_type as usize];
            let eligible = ty
                .required_counts
                .iter()
                .zip(&state.collected)
                .all(|(&need, &have)| have >= need);
            if !eligible {
                continue;
            }
            item.deletion_time = now;
            state.collected[item.item_type as usize] += 1;
            for (have, &cost) in state.collected.iter_mut().zip(&ty.required_costs) {
                *have = have.saturating_sub(cost);
            }
        }
    }

    fn refresh_all(
        &self,
        slots: &[(AgentId, AgentSlot)],
        positions: &FxHashMap<AgentId, Position>,
        now: u64,
    ) {
        let refresh_one = |(id, slot): &(AgentId, AgentSlot)| {
            let mut state = slot.lock();
            if state.active {
                perception::refresh_agent(
                    &self.config,
                    &self.diffusion,
                    &self.map,
                    *id,
                    &mut state,
                    positions,
                    now,
                );
            }
        };

        #[cfg(not(feature = "parallel"))]
        slots.iter().for_each(refresh_one);

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            slots.par_iter().for_each(refresh_one);
        }
    }

    /// `true` when the cell holds an undeleted movement-blocking item.
    /// Only already-materialized patches are consulted; moving into
    /// ungenerated terrain is never blocked.
    fn cell_blocks_movement(&self, cell: Position) -> bool {
        let (patch_pos, _) = self.map.world_to_patch(cell);
        let Some(patch) = self.map.get_if_exists(patch_pos) else {
            return false;
        };
        let interior = patch.lock();
        interior.item_at(cell).is_some_and(|idx| {
            self.config.item_types[interior.items[idx].item_type as usize].blocks_movement
        })
    }

    // ── Snapshots ─────────────────────────────────────────────────────────

    /// Region snapshot of the fixed patches intersecting the rectangle
    /// `[bottom_left, top_right]` (inclusive world coordinates).
    pub fn map_view(&self, bottom_left: Position, top_right: Position) -> MapView {
        let n = self.config.patch_size as i64;
        let now = self.time();
        let lifetime = self.config.removed_item_lifetime as u64;
        let (lo, _) = self.map.world_to_patch(bottom_left);
        let (hi, _) = self.map.world_to_patch(top_right);

        let mut patches = Vec::new();
        for px in lo.x..=hi.x {
            for py in lo.y..=hi.y {
                let patch_pos = Position::new(px, py);
                let Some(patch) = self.map.get_if_exists(patch_pos) else {
                    continue;
                };
                if !patch.is_fixed() {
                    continue;
                }
                patches.push(self.render_patch(patch_pos, patch.as_ref(), now, lifetime, n));
            }
        }
        MapView { patches }
    }

    fn render_patch(
        &self,
        patch_pos: Position,
        patch: &gw_map::Patch,
        now: u64,
        lifetime: u64,
        n: i64,
    ) -> MapPatch {
        let s = self.config.scent_dim as usize;
        let c = self.config.color_dim as usize;
        let cells = (n * n) as usize;

        let (items, agents) = {
            let mut interior = patch.lock();
            interior.reap(now, lifetime);
            (interior.items.clone(), interior.agents.clone())
        };

        // Scent sources: every item in the 3×3 patch neighborhood.
        let mut sources = Vec::new();
        for dy in -1..=1 {
            for dx in -1..=1 {
                let neighbor = Position::new(patch_pos.x + dx, patch_pos.y + dy);
                if neighbor == patch_pos {
                    sources.extend(items.iter().copied());
                } else if let Some(p) = self.map.get_if_exists(neighbor) {
                    sources.extend(p.lock().items.iter().copied());
                }
            }
        }

        let origin = Position::new(patch_pos.x * n, patch_pos.y * n);
        let cell_index = |pos: Position| -> usize {
            ((pos.y - origin.y) * n + (pos.x - origin.x)) as usize
        };

        let mut scent = vec![0.0_f32; cells * s];
        for cy in 0..n {
            for cx in 0..n {
                let cell = Position::new(origin.x + cx, origin.y + cy);
                let base = cell_index(cell) * s;
                for item in &sources {
                    let ty = &self.config.item_types[item.item_type as usize];
                    let age = (now - item.creation_time).min(lifetime - 1);
                    let mut factor =
                        self.diffusion
                            .value(age, item.location.x - cell.x, item.location.y - cell.y);
                    if item.is_deleted() {
                        factor -= self.diffusion.value(
                            now - item.deletion_time,
                            item.location.x - cell.x,
                            item.location.y - cell.y,
                        );
                    }
                    if factor != 0.0 {
                        for (k, &v) in ty.scent.iter().enumerate() {
                            scent[base + k] += factor as f32 * v;
                        }
                    }
                }
            }
        }

        let mut vision = vec![0.0_f32; cells * c];
        for item in &items {
            if item.is_deleted() {
                continue;
            }
            let base = cell_index(item.location) * c;
            let ty = &self.config.item_types[item.item_type as usize];
            for (k, &v) in ty.color.iter().enumerate() {
                vision[base + k] += v;
            }
        }
        let positions = self.position_snapshot();
        for &agent in &agents {
            if let Some(&pos) = positions.get(&agent) {
                // A concurrent step may have moved the agent out of this
                // patch between the residency read and the snapshot.
                let inside = (origin.x..origin.x + n).contains(&pos.x)
                    && (origin.y..origin.y + n).contains(&pos.y);
                if !inside {
                    continue;
                }
                let base = cell_index(pos) * c;
                for (k, &v) in self.config.agent_color.iter().enumerate() {
                    vision[base + k] += v;
                }
            }
        }

        MapPatch {
            position: patch_pos,
            scent,
            vision,
            items,
            agents,
        }
    }

    /// Plain-data image of the entire simulator, for the save-file codec.
    pub fn snapshot(&self) -> SimulatorImage {
        let _guard = self.structure.lock();
        let (time, acted) = {
            let tick = self.tick.lock();
            (tick.time, tick.acted)
        };
        let agents: Vec<Option<AgentImage>> = self
            .agents
            .read()
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.as_ref()
                    .map(|s| AgentImage::of(AgentId(i as u64), &s.lock()))
            })
            .collect();

        let mut requested_moves: Vec<MoveRequest> = Vec::new();
        {
            let requests = self.requested_moves.lock();
            let mut cells: Vec<&Position> = requests.keys().collect();
            cells.sort_unstable();
            for cell in cells {
                requested_moves.extend(requests[cell].iter().copied());
            }
        }

        SimulatorImage {
            config: (*self.config).clone(),
            time,
            acted,
            agents,
            patches: self.map.export_patches(),
            requested_moves,
        }
    }

    /// Rebuild a simulator from a saved image.  Every lock and counter is
    /// constructed fresh; only plain data comes from the image.
    pub fn restore(image: SimulatorImage) -> GwResult<Simulator> {
        image.config.validate()?;
        let diffusion = DiffusionTable::new(
            image.config.scent_decay,
            image.config.scent_diffusion,
            image.config.diffusion_radius(),
            image.config.removed_item_lifetime,
        )?;
        let config = Arc::new(image.config);

        let active = image
            .agents
            .iter()
            .flatten()
            .filter(|a| a.active)
            .count() as u64;
        let agents: Vec<Option<AgentSlot>> = image
            .agents
            .into_iter()
            .map(|slot| slot.map(|img| Arc::new(Mutex::new(img.into_state()))))
            .collect();

        let mut requested_moves: FxHashMap<Position, Vec<MoveRequest>> = FxHashMap::default();
        for request in image.requested_moves {
            requested_moves.entry(request.to).or_default().push(request);
        }

        Ok(Simulator {
            map: WorldMap::from_images(Arc::clone(&config), image.patches),
            config,
            diffusion,
            agents: RwLock::new(agents),
            requested_moves: Mutex::new(requested_moves),
            tick: Mutex::new(TickState {
                time: image.time,
                acted: image.acted,
                active,
                stepping: false,
            }),
            structure: Mutex::new(()),
            observer: RwLock::new(None),
        })
    }

    // ── Internal helpers ──────────────────────────────────────────────────

    fn slot(&self, id: AgentId) -> GwResult<AgentSlot> {
        self.agents
            .read()
            .get(id.index())
            .and_then(|s| s.as_ref().cloned())
            .ok_or(GwError::InvalidAgentId(id))
    }

    fn live_slots(&self) -> Vec<(AgentId, AgentSlot)> {
        self.agents
            .read()
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|s| (AgentId(i as u64), Arc::clone(s))))
            .collect()
    }

    fn position_snapshot(&self) -> FxHashMap<AgentId, Position> {
        self.live_slots()
            .into_iter()
            .map(|(id, slot)| (id, slot.lock().position))
            .collect()
    }
}

// ── SimulatorImage ────────────────────────────────────────────────────────────

/// Plain-data form of a whole simulator: what a save file holds.
///
/// Patches are sorted by position and requested moves by target cell
/// (submission order preserved within a cell), so serialization is
/// deterministic.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulatorImage {
    pub config: SimulatorConfig,
    pub time: u64,
    pub acted: u64,
    pub agents: Vec<Option<AgentImage>>,
    pub patches: Vec<PatchImage>,
    pub requested_moves: Vec<MoveRequest>,
}
