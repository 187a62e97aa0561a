//! The three connection-setup frames.
//!
//! On accept the server sends a [`ServerHello`] (current tick plus the full
//! configuration).  The client answers with a [`ClientIntro`] naming the
//! agent ids it owns, and the server replies with one present-flagged state
//! per claimed id — after which both sides switch to tagged messages.

use std::io::{self, Cursor, Read, Write};

use gw_core::{AgentId, SimulatorConfig};
use gw_sim::AgentImage;

use crate::codec::{self, DecodeResult};

/// First frame on the wire, server → client.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerHello {
    pub sim_time: u64,
    pub config: SimulatorConfig,
}

impl ServerHello {
    pub fn encode(&self, out: &mut Vec<u8>) -> io::Result<()> {
        codec::put_u64(out, self.sim_time)?;
        codec::put_config(out, &self.config)
    }

    pub fn decode(buf: &[u8]) -> DecodeResult<(ServerHello, usize)> {
        let mut r = Cursor::new(buf);
        let sim_time = codec::get_u64(&mut r)?;
        let config = codec::get_config(&mut r)?;
        Ok((ServerHello { sim_time, config }, r.position() as usize))
    }
}

/// Second frame, client → server: the agent ids this client owns.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientIntro {
    pub agents: Vec<AgentId>,
}

impl ClientIntro {
    pub fn encode(&self, out: &mut Vec<u8>) -> io::Result<()> {
        codec::put_agent_ids(out, &self.agents)
    }

    pub fn decode(buf: &[u8]) -> DecodeResult<(ClientIntro, usize)> {
        let mut r = Cursor::new(buf);
        let agents = codec::get_agent_ids(&mut r)?;
        Ok((ClientIntro { agents }, r.position() as usize))
    }
}

/// Third frame, server → client: one present-flagged state per id claimed
/// in the intro, in the same order.
pub fn put_owned_states<W: Write>(
    w: &mut W,
    states: &[Option<AgentImage>],
) -> io::Result<()> {
    for state in states {
        codec::put_bool(w, state.is_some())?;
        if let Some(state) = state {
            codec::put_agent_state(w, state)?;
        }
    }
    Ok(())
}

pub fn get_owned_states<R: Read>(
    r: &mut R,
    cfg: &SimulatorConfig,
    claimed: &[AgentId],
) -> DecodeResult<Vec<Option<AgentImage>>> {
    let mut states = Vec::new();
    for &id in claimed {
        states.push(if codec::get_bool(r)? {
            Some(codec::get_agent_state(r, cfg, id)?)
        } else {
            None
        });
    }
    Ok(states)
}
