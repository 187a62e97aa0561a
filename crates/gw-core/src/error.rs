//! The closed error taxonomy for the whole workspace.
//!
//! Every fallible operation across the `gw-*` crates reports through this one
//! enum.  Parse errors carry a human-readable cause but never the raw bytes;
//! the network layer logs and drops malformed messages without tearing down
//! the connection.

use thiserror::Error;

use crate::AgentId;

/// The top-level error type for all `gw-*` crates.
#[derive(Debug, Error)]
pub enum GwError {
    #[error("allocation failed in simulator core")]
    OutOfMemory,

    #[error("agent {0} not found")]
    InvalidAgentId(AgentId),

    #[error("action disallowed by configuration")]
    ViolatedPermissions,

    #[error("agent {0} already acted this tick")]
    AgentAlreadyActed(AgentId),

    #[error("an agent already occupies the spawn cell")]
    AgentAlreadyExists,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server could not parse message: {0}")]
    ServerParse(String),

    #[error("client could not parse message: {0}")]
    ClientParse(String),

    #[error("connection lost")]
    LostConnection,
}

impl From<std::collections::TryReserveError> for GwError {
    fn from(_: std::collections::TryReserveError) -> Self {
        GwError::OutOfMemory
    }
}

/// Shorthand result type for all `gw-*` crates.
pub type GwResult<T> = Result<T, GwError>;
