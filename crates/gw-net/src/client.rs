//! Blocking client for the simulator server.
//!
//! One `TcpStream`, typed request methods, and a queue for [`StepPush`]es
//! that the server interleaves between a request and its response.  The
//! client imposes its own timeouts if it wants any; the simulator never
//! times a request out.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use gw_core::{
    AgentId, Direction, GwError, GwResult, Position, SimulatorConfig, TurnDirection,
};
use gw_sim::{AgentImage, MapView};
use gw_wire::codec::DecodeError;
use gw_wire::handshake::{ClientIntro, ServerHello, get_owned_states};
use gw_wire::messages::{Request, Response, encode_request};

/// One step broadcast: the client's owned agents and their fresh states.
#[derive(Clone, Debug)]
pub struct StepPush {
    pub agents: Vec<AgentId>,
    pub states: Vec<AgentImage>,
}

/// A connected remote controller.
pub struct Client {
    stream: TcpStream,
    config: SimulatorConfig,
    /// Simulator tick at handshake time.
    hello_time: u64,
    /// States of the claimed agents, in claim order (`None` = unknown id).
    owned_states: Vec<Option<AgentImage>>,
    buf: Vec<u8>,
    steps: VecDeque<StepPush>,
}

impl Client {
    /// Connect, read the server hello, claim `owned` agent ids, and read
    /// their states back.
    pub fn connect<A: ToSocketAddrs>(addr: A, owned: &[AgentId]) -> GwResult<Client> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true).ok();

        let mut client = Client {
            stream,
            config: placeholder_config(),
            hello_time: 0,
            owned_states: Vec::new(),
            buf: Vec::new(),
            steps: VecDeque::new(),
        };

        // Frame 1: server hello.
        let hello = client.read_frame(|buf| ServerHello::decode(buf))?;
        client.hello_time = hello.sim_time;
        client.config = hello.config;

        // Frame 2: our ownership claim.
        let mut intro_bytes = Vec::new();
        ClientIntro {
            agents: owned.to_vec(),
        }
        .encode(&mut intro_bytes)
        .expect("writing to a Vec cannot fail");
        client.send(&intro_bytes)?;

        // Frame 3: the claimed agents' states.  Fixed layout, so decode
        // straight off the buffered stream.
        let config = client.config.clone();
        let claimed = owned.to_vec();
        client.owned_states = client.read_frame(|buf| {
            let mut r = std::io::Cursor::new(buf);
            let states = get_owned_states(&mut r, &config, &claimed)?;
            Ok((states, r.position() as usize))
        })?;

        Ok(client)
    }

    /// The configuration received in the handshake.
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// The simulator tick at handshake time.
    pub fn hello_time(&self) -> u64 {
        self.hello_time
    }

    /// The states received for the claimed ids, in claim order.
    pub fn owned_states(&self) -> &[Option<AgentImage>] {
        &self.owned_states
    }

    // ── Typed operations ──────────────────────────────────────────────────

    /// Spawn a new agent owned by this connection.  Returns `None` when
    /// the server refused the spawn.
    pub fn add_agent(&mut self) -> GwResult<Option<AgentImage>> {
        match self.request(&Request::AddAgent)? {
            Response::AddAgent { agent, state } => {
                debug_assert!(agent != AgentId::INVALID || state.is_none());
                Ok(state.map(|s| *s))
            }
            other => Err(unexpected(other)),
        }
    }

    pub fn move_agent(
        &mut self,
        agent: AgentId,
        direction: Direction,
        steps: u32,
    ) -> GwResult<bool> {
        match self.request(&Request::Move {
            agent,
            direction,
            steps,
        })? {
            Response::Move { success, .. } => Ok(success),
            other => Err(unexpected(other)),
        }
    }

    pub fn turn_agent(&mut self, agent: AgentId, turn: TurnDirection) -> GwResult<bool> {
        match self.request(&Request::Turn { agent, turn })? {
            Response::Turn { success, .. } => Ok(success),
            other => Err(unexpected(other)),
        }
    }

    pub fn no_op(&mut self, agent: AgentId) -> GwResult<bool> {
        match self.request(&Request::NoOp { agent })? {
            Response::NoOp { success, .. } => Ok(success),
            other => Err(unexpected(other)),
        }
    }

    pub fn remove_agent(&mut self, agent: AgentId) -> GwResult<bool> {
        match self.request(&Request::RemoveAgent { agent })? {
            Response::RemoveAgent { success, .. } => Ok(success),
            other => Err(unexpected(other)),
        }
    }

    pub fn set_active(&mut self, agent: AgentId, active: bool) -> GwResult<bool> {
        match self.request(&Request::SetActive { agent, active })? {
            Response::SetActive { success, .. } => Ok(success),
            other => Err(unexpected(other)),
        }
    }

    pub fn is_active(&mut self, agent: AgentId) -> GwResult<bool> {
        match self.request(&Request::IsActive { agent })? {
            Response::IsActive { active, .. } => Ok(active),
            other => Err(unexpected(other)),
        }
    }

    pub fn get_map(&mut self, bottom_left: Position, top_right: Position) -> GwResult<MapView> {
        match self.request(&Request::GetMap {
            bottom_left,
            top_right,
        })? {
            Response::GetMap { view } => Ok(view),
            other => Err(unexpected(other)),
        }
    }

    pub fn agent_ids(&mut self) -> GwResult<Vec<AgentId>> {
        match self.request(&Request::GetAgentIds)? {
            Response::GetAgentIds { agents } => Ok(agents),
            other => Err(unexpected(other)),
        }
    }

    pub fn agent_states(&mut self, agents: &[AgentId]) -> GwResult<Vec<Option<AgentImage>>> {
        match self.request(&Request::GetAgentStates {
            agents: agents.to_vec(),
        })? {
            Response::GetAgentStates { states } => Ok(states),
            other => Err(unexpected(other)),
        }
    }

    // ── Step pushes ───────────────────────────────────────────────────────

    /// Step broadcasts received so far, oldest first.
    pub fn take_steps(&mut self) -> Vec<StepPush> {
        self.steps.drain(..).collect()
    }

    /// Block until a step broadcast arrives (draining any queued one first).
    pub fn wait_step(&mut self) -> GwResult<StepPush> {
        loop {
            if let Some(step) = self.steps.pop_front() {
                return Ok(step);
            }
            match self.next_response()? {
                Response::Step { agents, states } => return Ok(StepPush { agents, states }),
                other => return Err(unexpected(other)),
            }
        }
    }

    // ── Wire plumbing ─────────────────────────────────────────────────────

    fn send(&mut self, bytes: &[u8]) -> GwResult<()> {
        self.stream
            .write_all(bytes)
            .map_err(|_| GwError::LostConnection)
    }

    /// Send a request and return its response, queueing any step pushes
    /// that arrive in between.
    fn request(&mut self, request: &Request) -> GwResult<Response> {
        let bytes = encode_request(request);
        self.send(&bytes)?;
        loop {
            match self.next_response()? {
                Response::Step { agents, states } => {
                    self.steps.push_back(StepPush { agents, states });
                }
                other => return Ok(other),
            }
        }
    }

    /// Decode the next response, reading more bytes as needed.
    fn next_response(&mut self) -> GwResult<Response> {
        let config = self.config.clone();
        self.read_frame(|buf| Response::decode(buf, &config))
    }

    /// Run `decode` over the buffered bytes, blocking for more input while
    /// it reports `Incomplete`.
    fn read_frame<T>(
        &mut self,
        mut decode: impl FnMut(&[u8]) -> Result<(T, usize), DecodeError>,
    ) -> GwResult<T> {
        loop {
            match decode(&self.buf) {
                Ok((value, used)) => {
                    self.buf.drain(..used);
                    return Ok(value);
                }
                Err(DecodeError::Incomplete) => {
                    let mut chunk = [0u8; 4096];
                    match self.stream.read(&mut chunk) {
                        Ok(0) => return Err(GwError::LostConnection),
                        Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(_) => return Err(GwError::LostConnection),
                    }
                }
                Err(e) => return Err(e.client()),
            }
        }
    }
}

fn unexpected(response: Response) -> GwError {
    GwError::ClientParse(format!("unexpected response {response:?}"))
}

/// Stand-in config used only between `connect` and the hello frame.
fn placeholder_config() -> SimulatorConfig {
    SimulatorConfig {
        random_seed: 0,
        max_steps_per_move: 1,
        scent_dim: 1,
        color_dim: 1,
        vision_range: 0,
        allowed_moves: [gw_core::ActionPolicy::Allowed; 4],
        allowed_turns: [gw_core::ActionPolicy::Allowed; 4],
        no_op_allowed: true,
        patch_size: 2,
        mcmc_iterations: 0,
        item_types: Vec::new(),
        agent_color: vec![0.0],
        conflict_policy: gw_core::MoveConflictPolicy::NoCollisions,
        scent_decay: 1.0,
        scent_diffusion: 0.0,
        removed_item_lifetime: 1,
    }
}
