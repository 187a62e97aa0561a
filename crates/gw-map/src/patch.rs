//! The patch: the unit of procedural generation and of locking.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};

use gw_core::{AgentId, Item, Position};

/// Mutable interior of a patch: its items and the agents currently inside.
///
/// Guarded by the patch mutex.  When an agent crosses a patch boundary the
/// simulator takes both patches' locks in ascending position order.
#[derive(Default, Debug)]
pub struct PatchState {
    /// Unordered item instances; deleted items linger until reaped.
    pub items: Vec<Item>,

    /// Agents whose current position lies inside this patch.
    pub agents: Vec<AgentId>,
}

impl PatchState {
    /// Index of the undeleted item at `pos`, if any.
    pub fn item_at(&self, pos: Position) -> Option<usize> {
        self.items
            .iter()
            .position(|i| i.location == pos && !i.is_deleted())
    }

    pub fn add_agent(&mut self, agent: AgentId) {
        debug_assert!(!self.agents.contains(&agent));
        self.agents.push(agent);
    }

    pub fn remove_agent(&mut self, agent: AgentId) {
        if let Some(idx) = self.agents.iter().position(|&a| a == agent) {
            self.agents.swap_remove(idx);
        }
    }

    /// Drop every deleted item whose scent trail has aged out.
    pub fn reap(&mut self, now: u64, removed_item_lifetime: u64) {
        self.items.retain(|i| !i.reapable(now, removed_item_lifetime));
    }
}

/// A square of `N×N` world cells at integer patch coordinates.
///
/// `fixed` flips to `true` exactly once, under the store's generation lock,
/// after the Gibbs sampler has finalized the patch contents; it is never
/// cleared.  Reads of the flag are lock-free.
#[derive(Debug)]
pub struct Patch {
    position: Position,
    fixed: AtomicBool,
    state: Mutex<PatchState>,
}

impl Patch {
    pub fn new(position: Position) -> Patch {
        Patch {
            position,
            fixed: AtomicBool::new(false),
            state: Mutex::new(PatchState::default()),
        }
    }

    /// Patch coordinates (world cells `[x·N, (x+1)·N) × [y·N, (y+1)·N)`).
    #[inline]
    pub fn position(&self) -> Position {
        self.position
    }

    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.fixed.load(Ordering::Acquire)
    }

    /// Freeze the patch.  Only the store's fixing path calls this.
    pub(crate) fn mark_fixed(&self) {
        self.fixed.store(true, Ordering::Release);
    }

    /// Lock the mutable interior.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, PatchState> {
        self.state.lock()
    }

    /// Rebuild a patch from its serialized image.
    pub fn from_image(image: PatchImage) -> Patch {
        Patch {
            position: image.position,
            fixed: AtomicBool::new(image.fixed),
            state: Mutex::new(PatchState {
                items: image.items,
                agents: image.agents,
            }),
        }
    }

    /// Plain-data copy for serialization.
    pub fn to_image(&self) -> PatchImage {
        let state = self.lock();
        PatchImage {
            position: self.position,
            fixed: self.is_fixed(),
            items: state.items.clone(),
            agents: state.agents.clone(),
        }
    }
}

/// Plain-data form of a patch, used by the save-file codec and by map
/// snapshots.  Holds no locks; synchronization primitives are constructed
/// fresh when an image is turned back into a live [`Patch`].
#[derive(Clone, Debug, PartialEq)]
pub struct PatchImage {
    pub position: Position,
    pub fixed: bool,
    pub items: Vec<Item>,
    pub agents: Vec<AgentId>,
}
