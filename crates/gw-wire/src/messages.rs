//! Typed protocol messages and their tag-prefixed framing.
//!
//! Every message starts with a 64-bit tag.  Requests and responses share
//! one numeric space; the sender's role determines direction.  Messages
//! carry no length prefix — each is self-describing given the
//! configuration both sides hold after the handshake — so stream decoders
//! treat [`DecodeError::Incomplete`] as "buffer more bytes".

use std::io::{self, Cursor};

use gw_core::{AgentId, Direction, Position, SimulatorConfig, TurnDirection};
use gw_sim::{AgentImage, MapView};

use crate::codec::{self, DecodeError, DecodeResult};

// ── Tags ──────────────────────────────────────────────────────────────────────

pub const TAG_ADD_AGENT: u64 = 0;
pub const TAG_ADD_AGENT_RESP: u64 = 1;
pub const TAG_MOVE: u64 = 2;
pub const TAG_MOVE_RESP: u64 = 3;
pub const TAG_TURN: u64 = 4;
pub const TAG_TURN_RESP: u64 = 5;
pub const TAG_GET_MAP: u64 = 6;
pub const TAG_GET_MAP_RESP: u64 = 7;
pub const TAG_STEP_RESP: u64 = 8;
pub const TAG_NO_OP: u64 = 9;
pub const TAG_NO_OP_RESP: u64 = 10;
pub const TAG_REMOVE_AGENT: u64 = 11;
pub const TAG_REMOVE_AGENT_RESP: u64 = 12;
pub const TAG_SET_ACTIVE: u64 = 13;
pub const TAG_SET_ACTIVE_RESP: u64 = 14;
pub const TAG_IS_ACTIVE: u64 = 15;
pub const TAG_IS_ACTIVE_RESP: u64 = 16;
pub const TAG_GET_AGENT_IDS: u64 = 17;
pub const TAG_GET_AGENT_IDS_RESP: u64 = 18;
pub const TAG_GET_AGENT_STATES: u64 = 19;
pub const TAG_GET_AGENT_STATES_RESP: u64 = 20;

// ── Message types ─────────────────────────────────────────────────────────────

/// Client → server.
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    AddAgent,
    Move {
        agent: AgentId,
        direction: Direction,
        steps: u32,
    },
    Turn {
        agent: AgentId,
        turn: TurnDirection,
    },
    NoOp {
        agent: AgentId,
    },
    RemoveAgent {
        agent: AgentId,
    },
    SetActive {
        agent: AgentId,
        active: bool,
    },
    IsActive {
        agent: AgentId,
    },
    GetMap {
        bottom_left: Position,
        top_right: Position,
    },
    GetAgentIds,
    GetAgentStates {
        agents: Vec<AgentId>,
    },
}

/// Server → client.  `Step` is a push, everything else answers a request.
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    /// `agent == AgentId::INVALID` means the spawn failed; the state is
    /// present exactly when it succeeded.
    AddAgent {
        agent: AgentId,
        state: Option<Box<AgentImage>>,
    },
    Move {
        agent: AgentId,
        success: bool,
    },
    Turn {
        agent: AgentId,
        success: bool,
    },
    NoOp {
        agent: AgentId,
        success: bool,
    },
    RemoveAgent {
        agent: AgentId,
        success: bool,
    },
    SetActive {
        agent: AgentId,
        success: bool,
    },
    IsActive {
        agent: AgentId,
        active: bool,
    },
    GetMap {
        view: MapView,
    },
    GetAgentIds {
        agents: Vec<AgentId>,
    },
    /// One entry per requested id; `None` for unknown or removed agents.
    GetAgentStates {
        states: Vec<Option<AgentImage>>,
    },
    /// Per-connection step broadcast: the receiving client's owned agents
    /// and their fresh post-step states, index-aligned.
    Step {
        agents: Vec<AgentId>,
        states: Vec<AgentImage>,
    },
}

// ── Encoding ──────────────────────────────────────────────────────────────────

impl Request {
    pub fn encode(&self, out: &mut Vec<u8>) -> io::Result<()> {
        match *self {
            Request::AddAgent => codec::put_u64(out, TAG_ADD_AGENT),
            Request::Move {
                agent,
                direction,
                steps,
            } => {
                codec::put_u64(out, TAG_MOVE)?;
                codec::put_u64(out, agent.0)?;
                codec::put_direction(out, direction)?;
                codec::put_u32(out, steps)
            }
            Request::Turn { agent, turn } => {
                codec::put_u64(out, TAG_TURN)?;
                codec::put_u64(out, agent.0)?;
                codec::put_turn(out, turn)
            }
            Request::NoOp { agent } => {
                codec::put_u64(out, TAG_NO_OP)?;
                codec::put_u64(out, agent.0)
            }
            Request::RemoveAgent { agent } => {
                codec::put_u64(out, TAG_REMOVE_AGENT)?;
                codec::put_u64(out, agent.0)
            }
            Request::SetActive { agent, active } => {
                codec::put_u64(out, TAG_SET_ACTIVE)?;
                codec::put_u64(out, agent.0)?;
                codec::put_bool(out, active)
            }
            Request::IsActive { agent } => {
                codec::put_u64(out, TAG_IS_ACTIVE)?;
                codec::put_u64(out, agent.0)
            }
            Request::GetMap {
                bottom_left,
                top_right,
            } => {
                codec::put_u64(out, TAG_GET_MAP)?;
                codec::put_position(out, bottom_left)?;
                codec::put_position(out, top_right)
            }
            Request::GetAgentIds => codec::put_u64(out, TAG_GET_AGENT_IDS),
            Request::GetAgentStates { ref agents } => {
                codec::put_u64(out, TAG_GET_AGENT_STATES)?;
                codec::put_agent_ids(out, agents)
            }
        }
    }

    /// Decode one request from the front of `buf`, returning it and the
    /// number of bytes consumed.
    pub fn decode(buf: &[u8]) -> DecodeResult<(Request, usize)> {
        let mut r = Cursor::new(buf);
        let tag = codec::get_u64(&mut r)?;
        let request = match tag {
            TAG_ADD_AGENT => Request::AddAgent,
            TAG_MOVE => Request::Move {
                agent: AgentId(codec::get_u64(&mut r)?),
                direction: codec::get_direction(&mut r)?,
                steps: codec::get_u32(&mut r)?,
            },
            TAG_TURN => Request::Turn {
                agent: AgentId(codec::get_u64(&mut r)?),
                turn: codec::get_turn(&mut r)?,
            },
            TAG_NO_OP => Request::NoOp {
                agent: AgentId(codec::get_u64(&mut r)?),
            },
            TAG_REMOVE_AGENT => Request::RemoveAgent {
                agent: AgentId(codec::get_u64(&mut r)?),
            },
            TAG_SET_ACTIVE => Request::SetActive {
                agent: AgentId(codec::get_u64(&mut r)?),
                active: codec::get_bool(&mut r)?,
            },
            TAG_IS_ACTIVE => Request::IsActive {
                agent: AgentId(codec::get_u64(&mut r)?),
            },
            TAG_GET_MAP => Request::GetMap {
                bottom_left: codec::get_position(&mut r)?,
                top_right: codec::get_position(&mut r)?,
            },
            TAG_GET_AGENT_IDS => Request::GetAgentIds,
            TAG_GET_AGENT_STATES => Request::GetAgentStates {
                agents: codec::get_agent_ids(&mut r)?,
            },
            other => return Err(DecodeError::malformed(format!("unknown request tag {other}"))),
        };
        Ok((request, r.position() as usize))
    }
}

impl Response {
    pub fn encode(&self, out: &mut Vec<u8>, cfg: &SimulatorConfig) -> io::Result<()> {
        fn id_flag(out: &mut Vec<u8>, tag: u64, agent: AgentId, flag: bool) -> io::Result<()> {
            codec::put_u64(out, tag)?;
            codec::put_u64(out, agent.0)?;
            codec::put_bool(out, flag)
        }

        match *self {
            Response::AddAgent { agent, ref state } => {
                codec::put_u64(out, TAG_ADD_AGENT_RESP)?;
                codec::put_u64(out, agent.0)?;
                debug_assert_eq!(state.is_some(), agent != AgentId::INVALID);
                if let Some(state) = state {
                    codec::put_agent_state(out, state)?;
                }
                Ok(())
            }
            Response::Move { agent, success } => id_flag(out, TAG_MOVE_RESP, agent, success),
            Response::Turn { agent, success } => id_flag(out, TAG_TURN_RESP, agent, success),
            Response::NoOp { agent, success } => id_flag(out, TAG_NO_OP_RESP, agent, success),
            Response::RemoveAgent { agent, success } => {
                id_flag(out, TAG_REMOVE_AGENT_RESP, agent, success)
            }
            Response::SetActive { agent, success } => {
                id_flag(out, TAG_SET_ACTIVE_RESP, agent, success)
            }
            Response::IsActive { agent, active } => id_flag(out, TAG_IS_ACTIVE_RESP, agent, active),
            Response::GetMap { ref view } => {
                codec::put_u64(out, TAG_GET_MAP_RESP)?;
                codec::put_map_view(out, view, cfg)
            }
            Response::GetAgentIds { ref agents } => {
                codec::put_u64(out, TAG_GET_AGENT_IDS_RESP)?;
                codec::put_agent_ids(out, agents)
            }
            Response::GetAgentStates { ref states } => {
                codec::put_u64(out, TAG_GET_AGENT_STATES_RESP)?;
                codec::put_u32(out, states.len() as u32)?;
                for state in states {
                    codec::put_bool(out, state.is_some())?;
                    if let Some(state) = state {
                        codec::put_u64(out, state.id.0)?;
                        codec::put_agent_state(out, state)?;
                    }
                }
                Ok(())
            }
            Response::Step {
                ref agents,
                ref states,
            } => {
                debug_assert_eq!(agents.len(), states.len());
                codec::put_u64(out, TAG_STEP_RESP)?;
                codec::put_agent_ids(out, agents)?;
                for state in states {
                    codec::put_agent_state(out, state)?;
                }
                Ok(())
            }
        }
    }

    /// Decode one response from the front of `buf`, returning it and the
    /// number of bytes consumed.
    pub fn decode(buf: &[u8], cfg: &SimulatorConfig) -> DecodeResult<(Response, usize)> {
        let mut r = Cursor::new(buf);
        let tag = codec::get_u64(&mut r)?;
        let response = match tag {
            TAG_ADD_AGENT_RESP => {
                let agent = AgentId(codec::get_u64(&mut r)?);
                let state = if agent == AgentId::INVALID {
                    None
                } else {
                    Some(Box::new(codec::get_agent_state(&mut r, cfg, agent)?))
                };
                Response::AddAgent { agent, state }
            }
            TAG_MOVE_RESP => Response::Move {
                agent: AgentId(codec::get_u64(&mut r)?),
                success: codec::get_bool(&mut r)?,
            },
            TAG_TURN_RESP => Response::Turn {
                agent: AgentId(codec::get_u64(&mut r)?),
                success: codec::get_bool(&mut r)?,
            },
            TAG_NO_OP_RESP => Response::NoOp {
                agent: AgentId(codec::get_u64(&mut r)?),
                success: codec::get_bool(&mut r)?,
            },
            TAG_REMOVE_AGENT_RESP => Response::RemoveAgent {
                agent: AgentId(codec::get_u64(&mut r)?),
                success: codec::get_bool(&mut r)?,
            },
            TAG_SET_ACTIVE_RESP => Response::SetActive {
                agent: AgentId(codec::get_u64(&mut r)?),
                success: codec::get_bool(&mut r)?,
            },
            TAG_IS_ACTIVE_RESP => Response::IsActive {
                agent: AgentId(codec::get_u64(&mut r)?),
                active: codec::get_bool(&mut r)?,
            },
            TAG_GET_MAP_RESP => Response::GetMap {
                view: codec::get_map_view(&mut r, cfg)?,
            },
            TAG_GET_AGENT_IDS_RESP => Response::GetAgentIds {
                agents: codec::get_agent_ids(&mut r)?,
            },
            TAG_GET_AGENT_STATES_RESP => {
                let count = codec::get_u32(&mut r)? as usize;
                let mut states = Vec::new();
                for _ in 0..count {
                    states.push(if codec::get_bool(&mut r)? {
                        let id = AgentId(codec::get_u64(&mut r)?);
                        Some(codec::get_agent_state(&mut r, cfg, id)?)
                    } else {
                        None
                    });
                }
                Response::GetAgentStates { states }
            }
            TAG_STEP_RESP => {
                let agents = codec::get_agent_ids(&mut r)?;
                let mut states = Vec::new();
                for &id in &agents {
                    states.push(codec::get_agent_state(&mut r, cfg, id)?);
                }
                Response::Step { agents, states }
            }
            other => {
                return Err(DecodeError::malformed(format!(
                    "unknown response tag {other}"
                )));
            }
        };
        Ok((response, r.position() as usize))
    }
}

/// Encode a request into a fresh buffer (convenience for clients).
pub fn encode_request(request: &Request) -> Vec<u8> {
    let mut out = Vec::new();
    request
        .encode(&mut out)
        .expect("writing to a Vec cannot fail");
    out
}

/// Encode a response into a fresh buffer (convenience for the server).
pub fn encode_response(response: &Response, cfg: &SimulatorConfig) -> Vec<u8> {
    let mut out = Vec::new();
    response
        .encode(&mut out, cfg)
        .expect("writing to a Vec cannot fail");
    out
}
