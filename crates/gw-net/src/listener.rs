//! Portable socket-readiness multiplexing.
//!
//! `mio` already abstracts the three platform backends (epoll, kqueue, and
//! IOCP-backed AFD polling); this module adds the server's delivery
//! discipline on top:
//!
//! - the listening socket is drained level-style (accept until
//!   `WouldBlock` on every wakeup), so it never needs re-arming;
//! - client sockets are registered once, edge-triggered, for
//!   read-and-write interest, and *one-shot delivery* is enforced by a
//!   per-connection claim flag rather than by re-registration: while one
//!   worker holds the claim, further readiness is recorded in a `pending`
//!   bit that the worker consumes before releasing.  At most one worker
//!   ever touches a socket, and no edge is lost.
//!
//! The [`Waker`] doubles as the shutdown signal and as the kick that makes
//! the poll thread notice queued outbound work.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use mio::{Events, Interest, Poll, Registry, Token, Waker};

/// Token reserved for the listening socket.
pub const LISTENER: Token = Token(0);
/// Token reserved for the waker.
pub const WAKER: Token = Token(1);
/// First token handed to a client connection.
pub const FIRST_CLIENT: Token = Token(2);

/// Lifecycle of the server event loop.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ServerState {
    /// Threads are being spawned; no connection has been accepted yet.
    Starting,
    /// Accepting connections and serving requests.
    Started,
    /// Draining: new connections are refused, workers are being joined.
    Stopping,
}

/// The per-connection claim used to emulate one-shot event delivery.
///
/// `claim` hands the socket to exactly one worker; readiness observed
/// while claimed is parked in `pending`.  The worker alternates
/// draining and [`release`][Self::release] until no readiness is left.
#[derive(Debug, Default)]
pub struct Claim {
    in_flight: AtomicBool,
    pending: AtomicBool,
}

impl Claim {
    /// Try to hand the socket to the calling worker.  On failure the
    /// readiness is parked for whichever worker currently holds the claim.
    pub fn claim(&self) -> bool {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            true
        } else {
            self.pending.store(true, Ordering::Release);
            false
        }
    }

    /// Forget readiness parked before a drain pass; call at the top of
    /// each pass so readiness arriving *during* the pass is re-observed.
    pub fn begin_pass(&self) {
        self.pending.store(false, Ordering::Release);
    }

    /// Release the claim.  Returns `true` if readiness was parked in the
    /// meantime and the caller re-acquired the claim — it must then run
    /// another drain pass.
    pub fn release(&self) -> bool {
        self.in_flight.store(false, Ordering::Release);
        if self.pending.load(Ordering::Acquire) {
            // Re-claim; if another thread won the race, the socket is
            // theirs and this worker is done with it.
            return self
                .in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();
        }
        false
    }
}

/// The poll half: owned by the server's main thread.
pub struct Listener {
    poll: Poll,
    events: Events,
}

impl Listener {
    pub fn new(capacity: usize) -> io::Result<(Listener, Registry, Waker)> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker = Waker::new(poll.registry(), WAKER)?;
        Ok((
            Listener {
                poll,
                events: Events::with_capacity(capacity),
            },
            registry,
            waker,
        ))
    }

    /// Block until at least one event (or a wake) arrives, then visit each
    /// ready token.
    pub fn wait(&mut self, mut visit: impl FnMut(Token)) -> io::Result<()> {
        self.poll.poll(&mut self.events, None)?;
        for event in self.events.iter() {
            visit(event.token());
        }
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }
}

/// Register a client socket: once, edge-triggered, both interests.
pub fn add_client(
    registry: &Registry,
    stream: &mut mio::net::TcpStream,
    token: Token,
) -> io::Result<()> {
    registry.register(stream, token, Interest::READABLE | Interest::WRITABLE)
}

/// Remove a client socket on eviction.
pub fn remove_client(registry: &Registry, stream: &mut mio::net::TcpStream) -> io::Result<()> {
    registry.deregister(stream)
}
