//! Per-agent mutable state.

use gw_core::{AgentId, Direction, GwResult, Position, SimulatorConfig};

/// Everything the simulator tracks about one agent.
///
/// Lives behind a per-agent mutex inside the simulator's dense agent table.
/// `scent` and `vision` always reflect the world at the current tick;
/// `vision` is stored in the agent's own frame, rotated so the agent faces
/// up.
#[derive(Clone, Debug)]
pub struct AgentState {
    pub position: Position,
    pub direction: Direction,

    /// Dense scent reading at the agent's cell, length `scent_dim`.
    pub scent: Vec<f32>,

    /// Dense `(2R+1) × (2R+1) × C` color raster, row-major in the agent's
    /// frame (row 0 is the row furthest ahead).
    pub vision: Vec<f32>,

    /// Items collected so far, one counter per item type.
    pub collected: Vec<u64>,

    /// Whether this agent has submitted its action for the current tick.
    pub acted: bool,

    /// Inactive agents neither act nor count toward the barrier.
    pub active: bool,

    pub requested_position: Position,
    pub requested_direction: Direction,
}

impl AgentState {
    /// Fresh agent at the spawn cell, facing up, with zeroed perception.
    ///
    /// The perception buffers are the simulator's largest per-agent
    /// allocations, so they are the one place agent creation can fail
    /// with `OutOfMemory`.
    pub fn spawn(config: &SimulatorConfig) -> GwResult<AgentState> {
        let mut scent = Vec::new();
        scent.try_reserve_exact(config.scent_dim as usize)?;
        scent.resize(config.scent_dim as usize, 0.0);

        let mut vision = Vec::new();
        vision.try_reserve_exact(config.vision_len())?;
        vision.resize(config.vision_len(), 0.0);

        let mut collected = Vec::new();
        collected.try_reserve_exact(config.item_types.len())?;
        collected.resize(config.item_types.len(), 0);

        Ok(AgentState {
            position: Position::ORIGIN,
            direction: Direction::Up,
            scent,
            vision,
            collected,
            acted: false,
            active: true,
            requested_position: Position::ORIGIN,
            requested_direction: Direction::Up,
        })
    }

    /// Value of one vision pixel, for tests and tooling.
    /// `row`/`col` index the raster, `channel` the color component.
    pub fn vision_at(&self, config: &SimulatorConfig, row: usize, col: usize, channel: usize) -> f32 {
        let side = config.vision_side();
        let c = config.color_dim as usize;
        self.vision[(row * side + col) * c + channel]
    }
}

/// Plain-data copy of one agent, tagged with its id.
///
/// This is the form that crosses the wire and lands in save files; the
/// save file additionally records `active`, which the protocol omits.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentImage {
    pub id: AgentId,
    pub position: Position,
    pub direction: Direction,
    pub scent: Vec<f32>,
    pub vision: Vec<f32>,
    pub acted: bool,
    pub active: bool,
    pub requested_position: Position,
    pub requested_direction: Direction,
    pub collected: Vec<u64>,
}

impl AgentImage {
    pub fn of(id: AgentId, state: &AgentState) -> AgentImage {
        AgentImage {
            id,
            position: state.position,
            direction: state.direction,
            scent: state.scent.clone(),
            vision: state.vision.clone(),
            acted: state.acted,
            active: state.active,
            requested_position: state.requested_position,
            requested_direction: state.requested_direction,
            collected: state.collected.clone(),
        }
    }

    /// Value of one vision pixel, for tests and tooling.
    /// `row`/`col` index the raster, `channel` the color component.
    pub fn vision_at(&self, config: &SimulatorConfig, row: usize, col: usize, channel: usize) -> f32 {
        let side = config.vision_side();
        let c = config.color_dim as usize;
        self.vision[(row * side + col) * c + channel]
    }

    /// Rebuild live state from an image (locks are the simulator's concern).
    pub fn into_state(self) -> AgentState {
        AgentState {
            position: self.position,
            direction: self.direction,
            scent: self.scent,
            vision: self.vision,
            collected: self.collected,
            acted: self.acted,
            active: self.active,
            requested_position: self.requested_position,
            requested_direction: self.requested_direction,
        }
    }
}
