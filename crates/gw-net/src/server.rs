//! The simulator server: accept loop, worker pool, request dispatch, and
//! step broadcast.
//!
//! # Thread model
//!
//! One poll thread accepts connections and translates socket readiness
//! into tokens on the ready queue; `worker_count` workers dequeue tokens
//! and do all socket I/O and request dispatch.  The step broadcast runs on
//! whichever worker's request closed the simulator barrier: it only
//! serializes states into per-connection outboxes and re-queues the
//! affected tokens, so it stays short.
//!
//! # Per-connection locking
//!
//! `stream` → `outbox` is the only nested order (during flush); the
//! broadcast path takes `outbox` alone, and the connection set lock is
//! never held across I/O.  A connection is only ever drained by the single
//! worker holding its [`Claim`].

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, info, warn};
use mio::net::{TcpListener, TcpStream};
use mio::{Registry, Token, Waker};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use gw_core::{AgentId, GwResult};
use gw_sim::{AgentImage, Simulator, StepOutcome};
use gw_wire::codec::DecodeError;
use gw_wire::handshake::{ClientIntro, ServerHello, put_owned_states};
use gw_wire::messages::{Request, Response, encode_response};

use crate::listener::{self, Claim, FIRST_CLIENT, LISTENER, Listener, ServerState, WAKER};

/// Sentinel token used to tell a worker to exit.
const SHUTDOWN: Token = Token(usize::MAX);

// ── Connection ────────────────────────────────────────────────────────────────

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Stage {
    /// Hello queued; waiting for the client's owned-agent list.
    AwaitIntro,
    /// Handshake complete; exchanging tagged messages.
    Ready,
}

struct Connection {
    token: usize,
    peer: SocketAddr,
    stream: Mutex<TcpStream>,
    claim: Claim,
    stage: Mutex<Stage>,
    read_buf: Mutex<Vec<u8>>,
    outbox: Mutex<Vec<u8>>,
    /// Agent ids this client receives step broadcasts for.
    owned: Mutex<Vec<AgentId>>,
}

// ── Server ────────────────────────────────────────────────────────────────────

/// A running simulator server.  Dropping it stops and joins all threads.
pub struct Server {
    inner: Arc<ServerInner>,
    local_addr: SocketAddr,
    poll_thread: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
    stopped: AtomicBool,
}

struct ServerInner {
    sim: Arc<Simulator>,
    registry: Registry,
    waker: Waker,
    state: Mutex<ServerState>,
    connections: Mutex<FxHashMap<usize, Arc<Connection>>>,
    next_token: AtomicUsize,
    ready_tx: Sender<Token>,
}

impl Server {
    /// Bind `port` (0 picks an ephemeral port), spawn the poll thread and
    /// `worker_count` workers, and start broadcasting the simulator's
    /// steps to connected clients.
    pub fn start(sim: Arc<Simulator>, port: u16, worker_count: usize) -> GwResult<Server> {
        let addr: SocketAddr = format!("0.0.0.0:{port}")
            .parse()
            .expect("static address format");
        let mut tcp = TcpListener::bind(addr)?;
        let local_addr = tcp.local_addr()?;

        let (mut listener, registry, waker) = Listener::new(256)?;
        listener
            .registry()
            .register(&mut tcp, LISTENER, mio::Interest::READABLE)?;

        let (ready_tx, ready_rx) = unbounded();
        let inner = Arc::new(ServerInner {
            sim: Arc::clone(&sim),
            registry,
            waker,
            state: Mutex::new(ServerState::Starting),
            connections: Mutex::new(FxHashMap::default()),
            next_token: AtomicUsize::new(FIRST_CLIENT.0),
            ready_tx,
        });

        // Step broadcast hook: serialize owned states into each outbox and
        // re-queue the connections for a flush.
        let weak = Arc::downgrade(&inner);
        sim.set_observer(Arc::new(move |_outcome: &StepOutcome| {
            if let Some(inner) = weak.upgrade() {
                inner.broadcast();
            }
        }));

        let poll_inner = Arc::clone(&inner);
        let poll_thread = std::thread::Builder::new()
            .name("gw-net-poll".into())
            .spawn(move || poll_inner.poll_loop(listener, tcp))?;

        let mut workers = Vec::new();
        for i in 0..worker_count.max(1) {
            let worker_inner = Arc::clone(&inner);
            let rx: Receiver<Token> = ready_rx.clone();
            workers.push(
                std::thread::Builder::new()
                    .name(format!("gw-net-worker-{i}"))
                    .spawn(move || worker_loop(worker_inner, rx))?,
            );
        }

        *inner.state.lock() = ServerState::Started;
        info!("listening on {local_addr} with {} workers", workers.len());

        Ok(Server {
            inner,
            local_addr,
            poll_thread: Some(poll_thread),
            workers,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ServerState {
        *self.inner.state.lock()
    }

    /// Refuse new connections, wake and join every thread, and drop all
    /// client sockets.  Idempotent.
    pub fn stop(&mut self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.inner.state.lock() = ServerState::Stopping;
        self.inner.sim.clear_observer();
        if let Err(e) = self.inner.waker.wake() {
            warn!("waker failed during shutdown: {e}");
        }
        if let Some(poll) = self.poll_thread.take() {
            let _ = poll.join();
        }
        for _ in &self.workers {
            let _ = self.inner.ready_tx.send(SHUTDOWN);
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        self.inner.connections.lock().clear();
        info!("server stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Poll thread ───────────────────────────────────────────────────────────────

impl ServerInner {
    fn poll_loop(self: Arc<Self>, mut listener: Listener, tcp: TcpListener) {
        loop {
            if *self.state.lock() == ServerState::Stopping {
                break;
            }
            let result = listener.wait(|token| match token {
                LISTENER => self.accept_all(&tcp),
                WAKER => {} // shutdown check happens at the top of the loop
                client => self.kick(client),
            });
            if let Err(e) = result {
                warn!("poll failed: {e}");
                break;
            }
        }
        debug!("poll thread exiting");
    }

    fn accept_all(&self, tcp: &TcpListener) {
        loop {
            match tcp.accept() {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("accept failed: {e}");
                    break;
                }
            }
        }
    }

    fn admit(&self, mut stream: TcpStream, peer: SocketAddr) {
        if *self.state.lock() != ServerState::Started {
            debug!("refusing {peer}: server not started");
            return; // dropping the socket closes it
        }

        // First frame: the server hello, queued for the first flush.
        let hello = ServerHello {
            sim_time: self.sim.time(),
            config: self.sim.config().clone(),
        };
        let mut outbox = Vec::new();
        hello
            .encode(&mut outbox)
            .expect("writing to a Vec cannot fail");

        let token = Token(self.next_token.fetch_add(1, Ordering::Relaxed));
        if let Err(e) = listener::add_client(&self.registry, &mut stream, token) {
            warn!("could not register {peer}: {e}");
            return;
        }

        let conn = Arc::new(Connection {
            token: token.0,
            peer,
            stream: Mutex::new(stream),
            claim: Claim::default(),
            stage: Mutex::new(Stage::AwaitIntro),
            read_buf: Mutex::new(Vec::new()),
            outbox: Mutex::new(outbox),
            owned: Mutex::new(Vec::new()),
        });
        self.connections.lock().insert(token.0, conn);
        info!("accepted {peer}");

        // Flush the hello even if no readiness edge is pending yet.
        self.kick(token);
    }

    /// Queue a connection for a worker unless one already holds its claim
    /// (then the readiness is parked in the claim's pending bit).
    fn kick(&self, token: Token) {
        let conn = self.connections.lock().get(&token.0).cloned();
        if let Some(conn) = conn
            && conn.claim.claim()
        {
            let _ = self.ready_tx.send(token);
        }
    }
}

// ── Workers ───────────────────────────────────────────────────────────────────

fn worker_loop(inner: Arc<ServerInner>, rx: Receiver<Token>) {
    while let Ok(token) = rx.recv() {
        if token == SHUTDOWN {
            break;
        }
        inner.process(token);
    }
    debug!("worker exiting");
}

impl ServerInner {
    /// Drain one claimed connection until its readiness is exhausted.
    fn process(&self, token: Token) {
        let conn = self.connections.lock().get(&token.0).cloned();
        let Some(conn) = conn else { return };

        loop {
            conn.claim.begin_pass();
            if !self.drain(&conn) {
                self.evict(&conn);
                return;
            }
            if !conn.claim.release() {
                return;
            }
        }
    }

    /// One full pass: flush, read, handle complete messages, flush again.
    /// Returns `false` when the connection must be closed.
    fn drain(&self, conn: &Arc<Connection>) -> bool {
        if !self.flush(conn) {
            return false;
        }
        if !self.fill(conn) {
            return false;
        }
        if !self.handle_buffer(conn) {
            return false;
        }
        self.flush(conn)
    }

    /// Write as much of the outbox as the socket accepts.
    fn flush(&self, conn: &Connection) -> bool {
        let stream = conn.stream.lock();
        let mut outbox = conn.outbox.lock();
        while !outbox.is_empty() {
            match (&*stream).write(&outbox) {
                Ok(0) => return false,
                Ok(n) => {
                    outbox.drain(..n);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("write to {} failed: {e}", conn.peer);
                    return false;
                }
            }
        }
        true
    }

    /// Read until `WouldBlock`, appending to the connection buffer.
    fn fill(&self, conn: &Connection) -> bool {
        let stream = conn.stream.lock();
        let mut chunk = [0u8; 4096];
        loop {
            match (&*stream).read(&mut chunk) {
                Ok(0) => return false, // peer closed
                Ok(n) => conn.read_buf.lock().extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return true,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("read from {} failed: {e}", conn.peer);
                    return false;
                }
            }
        }
    }

    /// Decode and dispatch every complete message in the buffer.
    fn handle_buffer(&self, conn: &Arc<Connection>) -> bool {
        loop {
            let stage = *conn.stage.lock();
            match stage {
                Stage::AwaitIntro => {
                    let decoded = {
                        let buf = conn.read_buf.lock();
                        ClientIntro::decode(&buf)
                    };
                    match decoded {
                        Ok((intro, used)) => {
                            conn.read_buf.lock().drain(..used);
                            self.complete_handshake(conn, intro);
                        }
                        Err(DecodeError::Incomplete) => return true,
                        Err(e) => {
                            warn!("bad handshake from {}: {}", conn.peer, e.server());
                            return false;
                        }
                    }
                }
                Stage::Ready => {
                    let decoded = {
                        let buf = conn.read_buf.lock();
                        if buf.is_empty() {
                            return true;
                        }
                        Request::decode(&buf)
                    };
                    match decoded {
                        Ok((request, used)) => {
                            conn.read_buf.lock().drain(..used);
                            let response = self.dispatch(conn, request);
                            let bytes = encode_response(&response, self.sim.config());
                            conn.outbox.lock().extend_from_slice(&bytes);
                        }
                        Err(DecodeError::Incomplete) => return true,
                        Err(e) => {
                            // Drop the unparseable bytes, keep the client.
                            warn!("dropping message from {}: {}", conn.peer, e.server());
                            conn.read_buf.lock().clear();
                            return true;
                        }
                    }
                }
            }
        }
    }

    fn complete_handshake(&self, conn: &Arc<Connection>, intro: ClientIntro) {
        let states: Vec<Option<AgentImage>> = intro
            .agents
            .iter()
            .map(|&id| self.sim.agent_state(id).ok())
            .collect();
        {
            let mut outbox = conn.outbox.lock();
            put_owned_states(&mut *outbox, &states).expect("writing to a Vec cannot fail");
        }
        debug!("{} claims {} agents", conn.peer, intro.agents.len());
        *conn.owned.lock() = intro.agents;
        *conn.stage.lock() = Stage::Ready;
    }

    fn dispatch(&self, conn: &Arc<Connection>, request: Request) -> Response {
        match request {
            Request::AddAgent => match self.sim.add_agent() {
                Ok(id) => {
                    conn.owned.lock().push(id);
                    Response::AddAgent {
                        agent: id,
                        state: self.sim.agent_state(id).ok().map(Box::new),
                    }
                }
                Err(e) => {
                    debug!("add_agent for {} failed: {e}", conn.peer);
                    Response::AddAgent {
                        agent: AgentId::INVALID,
                        state: None,
                    }
                }
            },
            Request::Move {
                agent,
                direction,
                steps,
            } => Response::Move {
                agent,
                success: self.sim.move_agent(agent, direction, steps).is_ok(),
            },
            Request::Turn { agent, turn } => Response::Turn {
                agent,
                success: self.sim.turn_agent(agent, turn).is_ok(),
            },
            Request::NoOp { agent } => Response::NoOp {
                agent,
                success: self.sim.no_op(agent).is_ok(),
            },
            Request::RemoveAgent { agent } => {
                let removed = self.sim.remove_agent(agent).is_ok();
                if removed {
                    conn.owned.lock().retain(|&id| id != agent);
                }
                Response::RemoveAgent {
                    agent,
                    success: removed,
                }
            }
            Request::SetActive { agent, active } => Response::SetActive {
                agent,
                success: self.sim.set_active(agent, active).is_ok(),
            },
            Request::IsActive { agent } => Response::IsActive {
                agent,
                active: self.sim.is_active(agent).unwrap_or(false),
            },
            Request::GetMap {
                bottom_left,
                top_right,
            } => Response::GetMap {
                view: self.sim.map_view(bottom_left, top_right),
            },
            Request::GetAgentIds => Response::GetAgentIds {
                agents: self.sim.agent_ids(),
            },
            Request::GetAgentStates { agents } => Response::GetAgentStates {
                states: agents
                    .iter()
                    .map(|&id| self.sim.agent_state(id).ok())
                    .collect(),
            },
        }
    }

    /// Serialize each client's owned agents into its outbox and re-queue
    /// the connection for a flush.  Runs on the worker whose request
    /// closed the barrier, so it must not block on anything slow.
    fn broadcast(&self) {
        let conns: Vec<Arc<Connection>> = self.connections.lock().values().cloned().collect();
        for conn in conns {
            if *conn.stage.lock() != Stage::Ready {
                continue;
            }
            let owned = conn.owned.lock().clone();
            let mut agents = Vec::new();
            let mut states = Vec::new();
            for id in owned {
                if let Ok(state) = self.sim.agent_state(id) {
                    agents.push(id);
                    states.push(state);
                }
            }
            let bytes = encode_response(&Response::Step { agents, states }, self.sim.config());
            conn.outbox.lock().extend_from_slice(&bytes);
            self.kick(Token(conn.token));
        }
    }

    /// Drop a connection.  Its owned agents stay in the simulator; an
    /// operator removes them explicitly if they should go.
    fn evict(&self, conn: &Arc<Connection>) {
        self.connections.lock().remove(&conn.token);
        if let Err(e) = listener::remove_client(&self.registry, &mut conn.stream.lock()) {
            debug!("deregister for {} failed: {e}", conn.peer);
        }
        info!(
            "{} disconnected; {} owned agents remain in the simulator",
            conn.peer,
            conn.owned.lock().len()
        );
    }
}
