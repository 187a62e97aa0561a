//! The agent identifier type.
//!
//! Agent ids are dense indices into the simulator's agent table, so `id.0 as
//! usize` is a valid slot index for live agents.  Removed agents leave a
//! tombstone; ids are never reused within one simulator lifetime.

use std::fmt;

/// Index of an agent in the simulator's dense agent table.
///
/// `INVALID` doubles as the wire-level failure sentinel: an `AddAgent`
/// response carrying `AgentId::INVALID` means the spawn was rejected.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentId(pub u64);

impl AgentId {
    /// Sentinel meaning "no valid agent" — equivalent to `u64::MAX`.
    pub const INVALID: AgentId = AgentId(u64::MAX);

    /// Cast to `usize` for direct use as an agent-table index.
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Default for AgentId {
    /// Returns the `INVALID` sentinel so uninitialized ids are visibly invalid.
    #[inline(always)]
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentId({})", self.0)
    }
}
