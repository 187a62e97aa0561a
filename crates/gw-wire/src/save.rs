//! Save-file format: magic, version, then the full simulator image.
//!
//! A save is a single forward-only stream; patches are sorted by position
//! and requested moves by target cell, so identical simulators produce
//! byte-identical files.  An I/O failure mid-write aborts the save and
//! leaves the simulator untouched (the snapshot is taken before any byte
//! hits disk); a failure mid-read aborts the load before a simulator is
//! constructed.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use gw_core::{AgentId, GwError, GwResult};
use gw_sim::{AgentImage, Simulator, SimulatorImage};

use crate::codec::{self, DecodeError, DecodeResult};

/// `"GWJB"` little-endian.
pub const MAGIC: u32 = 0x4A42_4757;
pub const VERSION: u32 = 1;

// ── Image codec ───────────────────────────────────────────────────────────────

pub fn put_simulator_image<W: Write>(w: &mut W, image: &SimulatorImage) -> io::Result<()> {
    codec::put_u32(w, MAGIC)?;
    codec::put_u32(w, VERSION)?;
    codec::put_u64(w, image.time)?;
    codec::put_u64(w, image.acted)?;
    codec::put_config(w, &image.config)?;

    codec::put_u64(w, image.agents.len() as u64)?;
    for slot in &image.agents {
        codec::put_bool(w, slot.is_some())?;
        if let Some(agent) = slot {
            codec::put_agent_state(w, agent)?;
            codec::put_bool(w, agent.active)?;
        }
    }

    codec::put_u64(w, image.patches.len() as u64)?;
    for patch in &image.patches {
        codec::put_patch_image(w, patch)?;
    }

    codec::put_u32(w, image.requested_moves.len() as u32)?;
    for request in &image.requested_moves {
        codec::put_u64(w, request.agent.0)?;
        codec::put_position(w, request.from)?;
        codec::put_position(w, request.to)?;
    }
    Ok(())
}

pub fn get_simulator_image<R: Read>(r: &mut R) -> DecodeResult<SimulatorImage> {
    let magic = codec::get_u32(r)?;
    if magic != MAGIC {
        return Err(DecodeError::malformed("not a gridworld save file"));
    }
    let version = codec::get_u32(r)?;
    if version != VERSION {
        return Err(DecodeError::malformed(format!(
            "unsupported save version {version}"
        )));
    }
    let time = codec::get_u64(r)?;
    let acted = codec::get_u64(r)?;
    let config = codec::get_config(r)?;

    let slot_count = codec::get_u64(r)?;
    let mut agents: Vec<Option<AgentImage>> = Vec::new();
    for index in 0..slot_count {
        agents.push(if codec::get_bool(r)? {
            let mut agent = codec::get_agent_state(r, &config, AgentId(index))?;
            agent.active = codec::get_bool(r)?;
            Some(agent)
        } else {
            None
        });
    }

    let patch_count = codec::get_u64(r)?;
    let mut patches = Vec::new();
    for _ in 0..patch_count {
        patches.push(codec::get_patch_image(r, &config)?);
    }

    let request_count = codec::get_u32(r)? as usize;
    let mut requested_moves = Vec::new();
    for _ in 0..request_count {
        requested_moves.push(gw_sim::collision::MoveRequest {
            agent: AgentId(codec::get_u64(r)?),
            from: codec::get_position(r)?,
            to: codec::get_position(r)?,
        });
    }

    Ok(SimulatorImage {
        config,
        time,
        acted,
        agents,
        patches,
        requested_moves,
    })
}

// ── File operations ───────────────────────────────────────────────────────────

/// Write the simulator's current state to `path`.
pub fn save<P: AsRef<Path>>(sim: &Simulator, path: P) -> GwResult<()> {
    let image = sim.snapshot();
    let mut w = BufWriter::new(File::create(path)?);
    put_simulator_image(&mut w, &image)?;
    w.flush()?;
    Ok(())
}

/// Load a simulator from `path`.
///
/// A short or corrupt file surfaces as `Io` with `InvalidData`; nothing is
/// constructed until the whole image has parsed and validated.
pub fn load<P: AsRef<Path>>(path: P) -> GwResult<Simulator> {
    let mut r = BufReader::new(File::open(path)?);
    let image = get_simulator_image(&mut r)
        .map_err(|e| GwError::Io(io::Error::new(io::ErrorKind::InvalidData, e.to_string())))?;
    Simulator::restore(image)
}
