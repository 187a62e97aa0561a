//! Per-tick resolution of conflicting move requests.
//!
//! Resolution runs once per tick, on the thread that closed the barrier,
//! over the requested-moves table accumulated during the tick.  The rules:
//!
//! 1. An agent whose requested cell is its current cell ("standing") always
//!    keeps it — it has nowhere to cascade to.
//! 2. A cell holding a movement-blocking item admits nobody.
//! 3. Among the remaining contenders for one cell, the policy picks one
//!    winner: submission order under `FirstComeFirstServed`, a uniform
//!    tick-seeded draw under `Random`.
//! 4. Losers stay where they are, which blocks their current cells; agents
//!    that won a blocked cell lose in turn.  Repeats to fixpoint.
//!
//! Under `NoCollisions` only rule 2 applies.

use rand::seq::SliceRandom;
use rustc_hash::{FxHashMap, FxHashSet};

use gw_core::rng::rng_for;
use gw_core::{AgentId, MoveConflictPolicy, Position};

/// One agent's pending move, in submission order within its target cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MoveRequest {
    pub agent: AgentId,
    pub from: Position,
    pub to: Position,
}

/// Decide which requests succeed.
///
/// `blocked_cells` holds the target cells rejected because of blocking
/// items; `occupied` holds the current positions of agents that did not act
/// this tick (they cannot vacate).  Returns the set of agents whose
/// requested position is granted.
pub fn resolve(
    policy: MoveConflictPolicy,
    requests: &FxHashMap<Position, Vec<MoveRequest>>,
    blocked_cells: &FxHashSet<Position>,
    occupied: &FxHashSet<Position>,
    seed: u64,
    tick: u64,
) -> FxHashSet<AgentId> {
    let mut winners: FxHashSet<AgentId> = FxHashSet::default();
    // Target cell of each tentative winner that is actually moving.
    let mut moving: Vec<MoveRequest> = Vec::new();
    // Cells that will still be occupied after the step.
    let mut blocked: FxHashSet<Position> = occupied.clone();

    if policy == MoveConflictPolicy::NoCollisions {
        for contenders in requests.values() {
            for req in contenders {
                if req.from == req.to || !blocked_cells.contains(&req.to) {
                    winners.insert(req.agent);
                }
            }
        }
        return winners;
    }

    let mut rng = rng_for(seed, tick);

    // Contested cells are visited in position order so the outcome depends
    // only on the requests and the tick, not on hash-map iteration order
    // (a reloaded simulator must replay the exact same draws).
    let mut cells: Vec<(&Position, &Vec<MoveRequest>)> = requests.iter().collect();
    cells.sort_unstable_by_key(|(pos, _)| **pos);

    for (&cell, contenders) in cells {
        // Rule 2: a blocking item rejects the whole cell.
        if blocked_cells.contains(&cell) {
            for req in contenders {
                if req.from == req.to {
                    // A stander on a blocking-item cell keeps its cell (the
                    // item appeared under it); it just isn't going anywhere.
                    winners.insert(req.agent);
                } else {
                    blocked.insert(req.from);
                }
            }
            continue;
        }

        // Rule 1: a stander wins its own cell outright.
        let stander = contenders.iter().find(|r| r.from == r.to);
        let winner = match stander {
            Some(req) => *req,
            None => match policy {
                MoveConflictPolicy::FirstComeFirstServed => contenders[0],
                MoveConflictPolicy::Random => {
                    *contenders.choose(&mut rng).expect("contender list is never empty")
                }
                MoveConflictPolicy::NoCollisions => unreachable!("handled above"),
            },
        };

        winners.insert(winner.agent);
        for req in contenders {
            if req.agent != winner.agent {
                blocked.insert(req.from);
            }
        }
        if winner.from != winner.to {
            moving.push(winner);
        } else {
            blocked.insert(winner.from);
        }
    }

    // Rule 4: cascade losses until no mover targets a blocked cell.
    loop {
        let mut changed = false;
        moving.retain(|req| {
            if blocked.contains(&req.to) {
                winners.remove(&req.agent);
                blocked.insert(req.from);
                changed = true;
                false
            } else {
                true
            }
        });
        if !changed {
            return winners;
        }
    }
}
