//! Deterministic seed derivation.
//!
//! # Determinism strategy
//!
//! No RNG in the simulator carries state across operations.  Every random
//! stream is a fresh `SmallRng` derived from the master seed and a context
//! key:
//!
//!   Gibbs sampling   → key = center patch position
//!   collision draws  → key = tick counter
//!
//! The mixing constant is the 64-bit fractional part of the golden ratio,
//! which spreads consecutive keys uniformly across the seed space.  This
//! means:
//!
//! - Fixing a patch neighborhood draws the same items no matter which agent
//!   or thread triggered it, and no matter what was sampled before.
//! - A simulator reloaded from a save file replays the exact draws a
//!   never-saved simulator would have made — there is no RNG state to
//!   persist or to forget to persist.

use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::Position;

/// 64-bit fractional golden-ratio constant for seed mixing.
pub const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Derive a well-spread seed from a master seed and a context key.
#[inline]
pub fn mix(seed: u64, key: u64) -> u64 {
    seed ^ key.wrapping_mul(MIXING_CONSTANT)
}

/// Collapse a position into a 64-bit key for [`mix`].
#[inline]
pub fn position_key(p: Position) -> u64 {
    (p.x as u64)
        .wrapping_mul(MIXING_CONSTANT)
        .wrapping_add((p.y as u64).wrapping_mul(0xc2b2_ae3d_27d4_eb4f))
}

/// A `SmallRng` seeded from `(seed, key)`.
#[inline]
pub fn rng_for(seed: u64, key: u64) -> SmallRng {
    SmallRng::seed_from_u64(mix(seed, key))
}
