//! Precomputed scent diffusion table.
//!
//! # Model
//!
//! Scent spreads by a discrete heat equation with per-step decay `λ` and
//! diffusion rate `α`:
//!
//!   G(t+1, c) = λ · (G(t, c) + α · Σ G(t, 4-neighbors of c))
//!
//! starting from a unit impulse `G(0) = δ₀`.  An item emits one unit of
//! scent every tick it exists, so the *present* contribution of a source
//! that appeared `age` ticks ago is the running sum `Σ_{k=0..age} G(k)` —
//! that cumulative field is what the table stores.  The perception pass
//! then handles deleted items by subtraction: a source that stopped
//! emitting at age `a'` contributes `value(age) − value(a')`, a sliding
//! window of `G` terms that decays smoothly to zero as both ages grow.
//!
//! The field is symmetric under reflection of either axis, so only the
//! non-negative quadrant is stored; lookups reflect into it.  `λ + 4α ≤ 1`
//! keeps the kernel non-expanding (total mass never grows step over step).

use gw_core::{GwError, GwResult};

/// Table of accumulated scent contributions, indexed by
/// `(age_ticks, |dx|, |dy|)`.
#[derive(Clone, Debug)]
pub struct DiffusionTable {
    radius: usize,
    horizon: usize,
    /// Quadrant values, laid out `[age][dx][dy]`, length `horizon · (R+1)²`.
    values: Vec<f64>,
}

impl DiffusionTable {
    /// Solve the heat equation for `horizon` steps on a `(2R+1)²` grid and
    /// store the accumulated quadrant.
    ///
    /// Fails with `InvalidConfig` when `decay + 4·diffusion > 1`, when the
    /// parameters are outside their ranges, or when the solution turns
    /// non-finite.
    pub fn new(decay: f32, diffusion: f32, radius: u32, horizon: u32) -> GwResult<DiffusionTable> {
        if !(decay > 0.0 && decay <= 1.0) || !(0.0..=0.25).contains(&diffusion) {
            return Err(GwError::InvalidConfig(
                "scent decay must lie in (0, 1] and diffusion in [0, 1/4]".into(),
            ));
        }
        if decay + 4.0 * diffusion > 1.0 {
            return Err(GwError::InvalidConfig(
                "scent_decay + 4 * scent_diffusion must not exceed 1".into(),
            ));
        }
        if horizon == 0 {
            return Err(GwError::InvalidConfig(
                "diffusion horizon must be nonzero".into(),
            ));
        }

        let r = radius as usize;
        let h = horizon as usize;
        let side = 2 * r + 1;
        let lambda = decay as f64;
        let alpha = diffusion as f64;

        // Full-grid impulse response; scent leaving the grid is absorbed.
        let mut impulse = vec![0.0_f64; side * side];
        let mut next = vec![0.0_f64; side * side];
        impulse[r * side + r] = 1.0;

        let mut cumulative = impulse.clone();

        let quadrant = (r + 1) * (r + 1);
        let mut values = Vec::new();
        values.try_reserve_exact(h * quadrant)?;

        let copy_quadrant = |cum: &[f64], out: &mut Vec<f64>| {
            for dx in 0..=r {
                for dy in 0..=r {
                    out.push(cum[(r + dx) * side + (r + dy)]);
                }
            }
        };
        copy_quadrant(&cumulative, &mut values); // age 0

        for _age in 1..h {
            for x in 0..side {
                for y in 0..side {
                    let mut neighbors = 0.0;
                    if x > 0 {
                        neighbors += impulse[(x - 1) * side + y];
                    }
                    if x + 1 < side {
                        neighbors += impulse[(x + 1) * side + y];
                    }
                    if y > 0 {
                        neighbors += impulse[x * side + y - 1];
                    }
                    if y + 1 < side {
                        neighbors += impulse[x * side + y + 1];
                    }
                    next[x * side + y] = lambda * (impulse[x * side + y] + alpha * neighbors);
                }
            }
            std::mem::swap(&mut impulse, &mut next);
            for (cum, g) in cumulative.iter_mut().zip(&impulse) {
                *cum += g;
            }
            copy_quadrant(&cumulative, &mut values);
        }

        if values.iter().any(|v| !v.is_finite()) {
            return Err(GwError::InvalidConfig(
                "diffusion table overflowed to a non-finite value".into(),
            ));
        }

        Ok(DiffusionTable {
            radius: r,
            horizon: h,
            values,
        })
    }

    /// Accumulated contribution of a unit-per-tick source that appeared
    /// `age` ticks ago, at offset `(dx, dy)` from it.
    ///
    /// Zero outside `0 ≤ age < horizon` and `|dx|, |dy| ≤ radius`.
    #[inline]
    pub fn value(&self, age: u64, dx: i64, dy: i64) -> f64 {
        let (dx, dy) = (dx.unsigned_abs() as usize, dy.unsigned_abs() as usize);
        if age >= self.horizon as u64 || dx > self.radius || dy > self.radius {
            return 0.0;
        }
        let quadrant = (self.radius + 1) * (self.radius + 1);
        self.values[age as usize * quadrant + dx * (self.radius + 1) + dy]
    }

    #[inline]
    pub fn radius(&self) -> u32 {
        self.radius as u32
    }

    #[inline]
    pub fn horizon(&self) -> u32 {
        self.horizon as u32
    }
}
