//! Primitive readers/writers and the codecs for every compound type.
//!
//! Decoders take `io::Read` and distinguish two failure modes:
//! [`DecodeError::Incomplete`] (the stream ended mid-object — a socket
//! reader waits for more bytes) and [`DecodeError::Malformed`] (the bytes
//! can never parse — the message is dropped).  Which side of the
//! connection the error is charged to is the caller's business, hence the
//! [`DecodeError::server`]/[`DecodeError::client`] adapters.
//!
//! Length-prefixed containers are decoded element by element, so a hostile
//! length prefix costs bytes actually sent, never a giant up-front
//! allocation.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use gw_core::{
    ActionPolicy, AgentId, Direction, GwError, IntensityFn, InteractionFn, Item, ItemType,
    MoveConflictPolicy, Position, SimulatorConfig, TurnDirection,
};
use gw_map::PatchImage;
use gw_sim::{AgentImage, MapPatch, MapView};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why a decode failed.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The input ended before the object did.  On a socket this means
    /// "wait for more bytes", not "protocol violation".
    #[error("input ended mid-object")]
    Incomplete,

    /// The bytes cannot parse no matter how many more arrive.
    #[error("{0}")]
    Malformed(String),
}

impl DecodeError {
    pub fn malformed(msg: impl Into<String>) -> DecodeError {
        DecodeError::Malformed(msg.into())
    }

    /// Charge the failure to the server side of the taxonomy.
    pub fn server(self) -> GwError {
        GwError::ServerParse(self.to_string())
    }

    /// Charge the failure to the client side of the taxonomy.
    pub fn client(self) -> GwError {
        GwError::ClientParse(self.to_string())
    }
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> DecodeError {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            DecodeError::Incomplete
        } else {
            DecodeError::Malformed(e.to_string())
        }
    }
}

pub type DecodeResult<T> = Result<T, DecodeError>;

// ── Primitives ────────────────────────────────────────────────────────────────

pub fn put_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_u8(v)
}

pub fn put_bool<W: Write>(w: &mut W, v: bool) -> io::Result<()> {
    w.write_u8(v as u8)
}

pub fn put_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_u32::<LittleEndian>(v)
}

pub fn put_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_u64::<LittleEndian>(v)
}

pub fn put_i64<W: Write>(w: &mut W, v: i64) -> io::Result<()> {
    w.write_i64::<LittleEndian>(v)
}

pub fn put_f32<W: Write>(w: &mut W, v: f32) -> io::Result<()> {
    w.write_f32::<LittleEndian>(v)
}

pub fn get_u8<R: Read>(r: &mut R) -> DecodeResult<u8> {
    Ok(r.read_u8()?)
}

pub fn get_bool<R: Read>(r: &mut R) -> DecodeResult<bool> {
    match r.read_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(DecodeError::malformed(format!("invalid bool byte {other}"))),
    }
}

pub fn get_u32<R: Read>(r: &mut R) -> DecodeResult<u32> {
    Ok(r.read_u32::<LittleEndian>()?)
}

pub fn get_u64<R: Read>(r: &mut R) -> DecodeResult<u64> {
    Ok(r.read_u64::<LittleEndian>()?)
}

pub fn get_i64<R: Read>(r: &mut R) -> DecodeResult<i64> {
    Ok(r.read_i64::<LittleEndian>()?)
}

pub fn get_f32<R: Read>(r: &mut R) -> DecodeResult<f32> {
    Ok(r.read_f32::<LittleEndian>()?)
}

/// Write `values` raw; the length is known to both sides from the config.
pub fn put_f32s<W: Write>(w: &mut W, values: &[f32]) -> io::Result<()> {
    for &v in values {
        put_f32(w, v)?;
    }
    Ok(())
}

/// Read exactly `len` floats (config-derived length).
pub fn get_f32s<R: Read>(r: &mut R, len: usize) -> DecodeResult<Vec<f32>> {
    let mut out = Vec::new();
    for _ in 0..len {
        out.push(get_f32(r)?);
    }
    Ok(out)
}

pub fn put_u64s<W: Write>(w: &mut W, values: &[u64]) -> io::Result<()> {
    for &v in values {
        put_u64(w, v)?;
    }
    Ok(())
}

pub fn get_u64s<R: Read>(r: &mut R, len: usize) -> DecodeResult<Vec<u64>> {
    let mut out = Vec::new();
    for _ in 0..len {
        out.push(get_u64(r)?);
    }
    Ok(out)
}

/// Length-prefixed UTF-8 string.
pub fn put_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    put_u32(w, s.len() as u32)?;
    w.write_all(s.as_bytes())
}

pub fn get_string<R: Read>(r: &mut R) -> DecodeResult<String> {
    let len = get_u32(r)? as usize;
    if len > (1 << 20) {
        return Err(DecodeError::malformed("string length out of range"));
    }
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| DecodeError::malformed("string is not UTF-8"))
}

/// Length-prefixed agent-id list.
pub fn put_agent_ids<W: Write>(w: &mut W, ids: &[AgentId]) -> io::Result<()> {
    put_u32(w, ids.len() as u32)?;
    for id in ids {
        put_u64(w, id.0)?;
    }
    Ok(())
}

pub fn get_agent_ids<R: Read>(r: &mut R) -> DecodeResult<Vec<AgentId>> {
    let len = get_u32(r)? as usize;
    let mut out = Vec::new();
    for _ in 0..len {
        out.push(AgentId(get_u64(r)?));
    }
    Ok(out)
}

// ── Small enums and positions ─────────────────────────────────────────────────

pub fn put_position<W: Write>(w: &mut W, p: Position) -> io::Result<()> {
    put_i64(w, p.x)?;
    put_i64(w, p.y)
}

pub fn get_position<R: Read>(r: &mut R) -> DecodeResult<Position> {
    Ok(Position::new(get_i64(r)?, get_i64(r)?))
}

pub fn put_direction<W: Write>(w: &mut W, d: Direction) -> io::Result<()> {
    put_u8(w, d.as_u8())
}

pub fn get_direction<R: Read>(r: &mut R) -> DecodeResult<Direction> {
    let v = get_u8(r)?;
    Direction::from_u8(v).ok_or_else(|| DecodeError::malformed(format!("invalid direction {v}")))
}

pub fn put_turn<W: Write>(w: &mut W, t: TurnDirection) -> io::Result<()> {
    put_u8(w, t.as_u8())
}

pub fn get_turn<R: Read>(r: &mut R) -> DecodeResult<TurnDirection> {
    let v = get_u8(r)?;
    TurnDirection::from_u8(v)
        .ok_or_else(|| DecodeError::malformed(format!("invalid turn direction {v}")))
}

fn get_action_policy<R: Read>(r: &mut R) -> DecodeResult<ActionPolicy> {
    let v = get_u8(r)?;
    ActionPolicy::from_u8(v)
        .ok_or_else(|| DecodeError::malformed(format!("invalid action policy {v}")))
}

// ── Energy kernels ────────────────────────────────────────────────────────────

/// Kernels serialize as `{kind_id: u32, arg_count: u32, args: f32...}`.
pub fn put_intensity<W: Write>(w: &mut W, f: &IntensityFn) -> io::Result<()> {
    put_u32(w, f.kind_id())?;
    put_u32(w, f.args().len() as u32)?;
    put_f32s(w, f.args())
}

pub fn get_intensity<R: Read>(r: &mut R) -> DecodeResult<IntensityFn> {
    let kind = get_u32(r)?;
    let argc = get_u32(r)? as usize;
    let args = get_f32s(r, argc)?;
    IntensityFn::from_parts(kind, args).map_err(|e| DecodeError::malformed(e.to_string()))
}

pub fn put_interaction<W: Write>(w: &mut W, f: &InteractionFn) -> io::Result<()> {
    let args = f.args();
    put_u32(w, f.kind_id())?;
    put_u32(w, args.len() as u32)?;
    put_f32s(w, &args)
}

pub fn get_interaction<R: Read>(r: &mut R) -> DecodeResult<InteractionFn> {
    let kind = get_u32(r)?;
    let argc = get_u32(r)? as usize;
    let args = get_f32s(r, argc)?;
    InteractionFn::from_parts(kind, args).map_err(|e| DecodeError::malformed(e.to_string()))
}

// ── Item types and configuration ──────────────────────────────────────────────

fn put_item_type<W: Write>(w: &mut W, ty: &ItemType, type_count: usize) -> io::Result<()> {
    debug_assert_eq!(ty.required_counts.len(), type_count);
    put_string(w, &ty.name)?;
    put_f32s(w, &ty.scent)?;
    put_f32s(w, &ty.color)?;
    put_u64s(w, &ty.required_counts)?;
    put_u64s(w, &ty.required_costs)?;
    put_bool(w, ty.blocks_movement)?;
    put_intensity(w, &ty.intensity)?;
    for f in &ty.interactions {
        put_interaction(w, f)?;
    }
    Ok(())
}

fn get_item_type<R: Read>(
    r: &mut R,
    scent_dim: usize,
    color_dim: usize,
    type_count: usize,
) -> DecodeResult<ItemType> {
    let name = get_string(r)?;
    let scent = get_f32s(r, scent_dim)?;
    let color = get_f32s(r, color_dim)?;
    let required_counts = get_u64s(r, type_count)?;
    let required_costs = get_u64s(r, type_count)?;
    let blocks_movement = get_bool(r)?;
    let intensity = get_intensity(r)?;
    let mut interactions = Vec::new();
    for _ in 0..type_count {
        interactions.push(get_interaction(r)?);
    }
    Ok(ItemType {
        name,
        scent,
        color,
        required_counts,
        required_costs,
        blocks_movement,
        intensity,
        interactions,
    })
}

/// Field order follows the recognized-options list; the dims come first so
/// the per-type arrays after them have known lengths.
pub fn put_config<W: Write>(w: &mut W, cfg: &SimulatorConfig) -> io::Result<()> {
    put_u32(w, cfg.random_seed)?;
    put_u32(w, cfg.max_steps_per_move)?;
    put_u32(w, cfg.scent_dim)?;
    put_u32(w, cfg.color_dim)?;
    put_u32(w, cfg.vision_range)?;
    for p in cfg.allowed_moves {
        put_u8(w, p.as_u8())?;
    }
    for p in cfg.allowed_turns {
        put_u8(w, p.as_u8())?;
    }
    put_bool(w, cfg.no_op_allowed)?;
    put_u32(w, cfg.patch_size)?;
    put_u32(w, cfg.mcmc_iterations)?;
    put_u32(w, cfg.item_types.len() as u32)?;
    for ty in &cfg.item_types {
        put_item_type(w, ty, cfg.item_types.len())?;
    }
    put_f32s(w, &cfg.agent_color)?;
    put_u8(w, cfg.conflict_policy.as_u8())?;
    put_f32(w, cfg.scent_decay)?;
    put_f32(w, cfg.scent_diffusion)?;
    put_u32(w, cfg.removed_item_lifetime)
}

/// Decode and validate a configuration.
pub fn get_config<R: Read>(r: &mut R) -> DecodeResult<SimulatorConfig> {
    let random_seed = get_u32(r)?;
    let max_steps_per_move = get_u32(r)?;
    let scent_dim = get_u32(r)?;
    let color_dim = get_u32(r)?;
    let vision_range = get_u32(r)?;
    let mut allowed_moves = [ActionPolicy::Allowed; 4];
    for p in &mut allowed_moves {
        *p = get_action_policy(r)?;
    }
    let mut allowed_turns = [ActionPolicy::Allowed; 4];
    for p in &mut allowed_turns {
        *p = get_action_policy(r)?;
    }
    let no_op_allowed = get_bool(r)?;
    let patch_size = get_u32(r)?;
    let mcmc_iterations = get_u32(r)?;
    let type_count = get_u32(r)? as usize;
    let mut item_types = Vec::new();
    for _ in 0..type_count {
        item_types.push(get_item_type(
            r,
            scent_dim as usize,
            color_dim as usize,
            type_count,
        )?);
    }
    let agent_color = get_f32s(r, color_dim as usize)?;
    let conflict_policy = {
        let v = get_u8(r)?;
        MoveConflictPolicy::from_u8(v)
            .ok_or_else(|| DecodeError::malformed(format!("invalid conflict policy {v}")))?
    };
    let scent_decay = get_f32(r)?;
    let scent_diffusion = get_f32(r)?;
    let removed_item_lifetime = get_u32(r)?;

    let cfg = SimulatorConfig {
        random_seed,
        max_steps_per_move,
        scent_dim,
        color_dim,
        vision_range,
        allowed_moves,
        allowed_turns,
        no_op_allowed,
        patch_size,
        mcmc_iterations,
        item_types,
        agent_color,
        conflict_policy,
        scent_decay,
        scent_diffusion,
        removed_item_lifetime,
    };
    cfg.validate()
        .map_err(|e| DecodeError::malformed(e.to_string()))?;
    Ok(cfg)
}

// ── Items, patches, agents ────────────────────────────────────────────────────

pub fn put_item<W: Write>(w: &mut W, item: &Item) -> io::Result<()> {
    put_u32(w, item.item_type)?;
    put_position(w, item.location)?;
    put_u64(w, item.creation_time)?;
    put_u64(w, item.deletion_time)
}

pub fn get_item<R: Read>(r: &mut R, cfg: &SimulatorConfig) -> DecodeResult<Item> {
    let item_type = get_u32(r)?;
    if item_type as usize >= cfg.item_types.len() {
        return Err(DecodeError::malformed(format!(
            "item type index {item_type} out of range"
        )));
    }
    Ok(Item {
        item_type,
        location: get_position(r)?,
        creation_time: get_u64(r)?,
        deletion_time: get_u64(r)?,
    })
}

pub fn put_patch_image<W: Write>(w: &mut W, patch: &PatchImage) -> io::Result<()> {
    put_position(w, patch.position)?;
    put_bool(w, patch.fixed)?;
    put_u32(w, patch.items.len() as u32)?;
    for item in &patch.items {
        put_item(w, item)?;
    }
    put_agent_ids(w, &patch.agents)
}

pub fn get_patch_image<R: Read>(r: &mut R, cfg: &SimulatorConfig) -> DecodeResult<PatchImage> {
    let position = get_position(r)?;
    let fixed = get_bool(r)?;
    let item_count = get_u32(r)? as usize;
    let mut items = Vec::new();
    for _ in 0..item_count {
        items.push(get_item(r, cfg)?);
    }
    let agents = get_agent_ids(r)?;
    Ok(PatchImage {
        position,
        fixed,
        items,
        agents,
    })
}

/// Protocol form of an agent state.  The `active` flag travels only in
/// save files (the caller appends it there); the id travels separately.
pub fn put_agent_state<W: Write>(w: &mut W, agent: &AgentImage) -> io::Result<()> {
    put_position(w, agent.position)?;
    put_direction(w, agent.direction)?;
    put_f32s(w, &agent.scent)?;
    put_f32s(w, &agent.vision)?;
    put_bool(w, agent.acted)?;
    put_position(w, agent.requested_position)?;
    put_direction(w, agent.requested_direction)?;
    put_u64s(w, &agent.collected)
}

pub fn get_agent_state<R: Read>(
    r: &mut R,
    cfg: &SimulatorConfig,
    id: AgentId,
) -> DecodeResult<AgentImage> {
    Ok(AgentImage {
        id,
        position: get_position(r)?,
        direction: get_direction(r)?,
        scent: get_f32s(r, cfg.scent_dim as usize)?,
        vision: get_f32s(r, cfg.vision_len())?,
        acted: get_bool(r)?,
        active: true,
        requested_position: get_position(r)?,
        requested_direction: get_direction(r)?,
        collected: get_u64s(r, cfg.item_types.len())?,
    })
}

// ── Map views ─────────────────────────────────────────────────────────────────

pub fn put_map_view<W: Write>(w: &mut W, view: &MapView, cfg: &SimulatorConfig) -> io::Result<()> {
    put_u32(w, view.patches.len() as u32)?;
    for patch in &view.patches {
        debug_assert_eq!(
            patch.scent.len(),
            (cfg.patch_size * cfg.patch_size * cfg.scent_dim) as usize
        );
        put_position(w, patch.position)?;
        put_f32s(w, &patch.scent)?;
        put_f32s(w, &patch.vision)?;
        put_u32(w, patch.items.len() as u32)?;
        for item in &patch.items {
            put_item(w, item)?;
        }
        put_agent_ids(w, &patch.agents)?;
    }
    Ok(())
}

pub fn get_map_view<R: Read>(r: &mut R, cfg: &SimulatorConfig) -> DecodeResult<MapView> {
    let cells = (cfg.patch_size * cfg.patch_size) as usize;
    let patch_count = get_u32(r)? as usize;
    let mut patches = Vec::new();
    for _ in 0..patch_count {
        let position = get_position(r)?;
        let scent = get_f32s(r, cells * cfg.scent_dim as usize)?;
        let vision = get_f32s(r, cells * cfg.color_dim as usize)?;
        let item_count = get_u32(r)? as usize;
        let mut items = Vec::new();
        for _ in 0..item_count {
            items.push(get_item(r, cfg)?);
        }
        let agents = get_agent_ids(r)?;
        patches.push(MapPatch {
            position,
            scent,
            vision,
            items,
            agents,
        });
    }
    Ok(MapView { patches })
}
