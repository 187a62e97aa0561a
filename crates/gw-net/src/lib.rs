//! `gw-net` — sharing one simulator among remote controllers over TCP.
//!
//! The [`Server`] accepts connections on its main thread, multiplexes
//! socket readiness through [`listener`], and hands ready sockets to a
//! fixed worker pool that decodes requests, drives the simulator, and
//! writes replies.  Each connection owns a set of agent ids; when the
//! simulator's barrier closes, every connected client receives a step
//! broadcast carrying only its own agents' fresh states.
//!
//! The [`Client`] is deliberately boring: one blocking socket, typed
//! request methods, and a queue for step pushes that arrive between a
//! request and its response.
//!
//! | Module       | Contents                                             |
//! |--------------|------------------------------------------------------|
//! | [`listener`] | Portable readiness multiplexer over `mio`            |
//! | [`server`]   | `Server`, per-connection state, step broadcast       |
//! | [`client`]   | Blocking `Client` with typed operations              |

pub mod client;
pub mod listener;
pub mod server;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use client::{Client, StepPush};
pub use listener::ServerState;
pub use server::Server;
