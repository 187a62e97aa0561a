//! The closed registry of Gibbs energy kernels.
//!
//! Item placement is sampled from a Gibbs random field whose log-density is
//! a sum of per-cell *intensity* terms and pairwise *interaction* terms.
//! Both kinds of kernel form a closed catalog: each variant has a stable
//! numeric kind id and a flat `f32` argument array on the wire, and
//! deserialization of an unknown id fails with `InvalidConfig` — foreign
//! kernels cannot cross the wire or the save file.
//!
//! Dispatch is an exhaustive match; there are no function pointers.

use crate::{GwError, GwResult, Position};

// ── Intensity kernels ─────────────────────────────────────────────────────────

/// Per-cell log-bias for placing an item of a given type.
///
/// Maps `(world_position, item_type) → ℝ`.  The position parameter is part
/// of the contract (kernels may in principle vary over space) even though
/// neither built-in variant uses it.
#[derive(Clone, Debug, PartialEq)]
pub enum IntensityFn {
    /// Always 0.
    Zero,
    /// One baseline log-intensity per item type, indexed by type.
    Constant(Vec<f32>),
}

impl IntensityFn {
    pub const KIND_ZERO: u32 = 0;
    pub const KIND_CONSTANT: u32 = 1;

    #[inline]
    pub fn value(&self, _pos: Position, item_type: usize) -> f32 {
        match self {
            IntensityFn::Zero => 0.0,
            IntensityFn::Constant(baselines) => baselines[item_type],
        }
    }

    pub fn kind_id(&self) -> u32 {
        match self {
            IntensityFn::Zero => Self::KIND_ZERO,
            IntensityFn::Constant(_) => Self::KIND_CONSTANT,
        }
    }

    pub fn args(&self) -> &[f32] {
        match self {
            IntensityFn::Zero => &[],
            IntensityFn::Constant(baselines) => baselines,
        }
    }

    /// Reassemble a kernel from its wire form `{kind_id, args}`.
    ///
    /// Argument-count validation against the item-type count happens in
    /// [`SimulatorConfig::validate`][crate::SimulatorConfig::validate]; here
    /// only the shape constraints that are independent of the config apply.
    pub fn from_parts(kind_id: u32, args: Vec<f32>) -> GwResult<IntensityFn> {
        match kind_id {
            Self::KIND_ZERO => {
                if !args.is_empty() {
                    return Err(GwError::InvalidConfig(
                        "intensity kernel Zero takes no arguments".into(),
                    ));
                }
                Ok(IntensityFn::Zero)
            }
            Self::KIND_CONSTANT => {
                if args.is_empty() {
                    return Err(GwError::InvalidConfig(
                        "intensity kernel Constant needs at least one baseline".into(),
                    ));
                }
                Ok(IntensityFn::Constant(args))
            }
            other => Err(GwError::InvalidConfig(format!(
                "unknown intensity kernel id {other}"
            ))),
        }
    }
}

// ── Interaction kernels ───────────────────────────────────────────────────────

/// Pairwise log-contribution to co-occurrence of two item instances.
///
/// Maps `(pos_a, pos_b) → ℝ`.  The type pair is resolved *before* dispatch:
/// each `ItemType` holds one `InteractionFn` per other type, so the kernel
/// itself only sees positions.
#[derive(Clone, Debug, PartialEq)]
pub enum InteractionFn {
    /// Always 0.
    Zero,

    /// Two nested squared-distance boxes:
    /// `value1` inside `cutoff1`, else `value2` inside `cutoff2`, else 0.
    PiecewiseBox {
        cutoff1: f32,
        cutoff2: f32,
        value1: f32,
        value2: f32,
    },

    /// Cross-shaped kernel branching on Chebyshev distance and whether the
    /// two positions are axis-aligned (`Δx = 0 ∨ Δy = 0`).
    Cross {
        near: f32,
        far: f32,
        near_axis: f32,
        near_misaligned: f32,
        far_axis: f32,
        far_misaligned: f32,
    },
}

impl InteractionFn {
    pub const KIND_ZERO: u32 = 0;
    pub const KIND_PIECEWISE_BOX: u32 = 1;
    pub const KIND_CROSS: u32 = 2;

    pub fn value(&self, a: Position, b: Position) -> f32 {
        match *self {
            InteractionFn::Zero => 0.0,

            InteractionFn::PiecewiseBox {
                cutoff1,
                cutoff2,
                value1,
                value2,
            } => {
                let d2 = a.squared_distance(b);
                if d2 < cutoff1 {
                    value1
                } else if d2 < cutoff2 {
                    value2
                } else {
                    0.0
                }
            }

            InteractionFn::Cross {
                near,
                far,
                near_axis,
                near_misaligned,
                far_axis,
                far_misaligned,
            } => {
                let cheb = a.chebyshev(b) as f32;
                let aligned = a.axis_aligned(b);
                if cheb < near {
                    if aligned { near_axis } else { near_misaligned }
                } else if cheb < far {
                    if aligned { far_axis } else { far_misaligned }
                } else {
                    0.0
                }
            }
        }
    }

    pub fn kind_id(&self) -> u32 {
        match self {
            InteractionFn::Zero => Self::KIND_ZERO,
            InteractionFn::PiecewiseBox { .. } => Self::KIND_PIECEWISE_BOX,
            InteractionFn::Cross { .. } => Self::KIND_CROSS,
        }
    }

    pub fn args(&self) -> Vec<f32> {
        match *self {
            InteractionFn::Zero => vec![],
            InteractionFn::PiecewiseBox {
                cutoff1,
                cutoff2,
                value1,
                value2,
            } => vec![cutoff1, cutoff2, value1, value2],
            InteractionFn::Cross {
                near,
                far,
                near_axis,
                near_misaligned,
                far_axis,
                far_misaligned,
            } => vec![near, far, near_axis, near_misaligned, far_axis, far_misaligned],
        }
    }

    /// Reassemble a kernel from its wire form `{kind_id, args}`.
    pub fn from_parts(kind_id: u32, args: Vec<f32>) -> GwResult<InteractionFn> {
        match (kind_id, args.as_slice()) {
            (Self::KIND_ZERO, []) => Ok(InteractionFn::Zero),
            (Self::KIND_ZERO, _) => Err(GwError::InvalidConfig(
                "interaction kernel Zero takes no arguments".into(),
            )),

            (Self::KIND_PIECEWISE_BOX, &[cutoff1, cutoff2, value1, value2]) => {
                Ok(InteractionFn::PiecewiseBox {
                    cutoff1,
                    cutoff2,
                    value1,
                    value2,
                })
            }
            (Self::KIND_PIECEWISE_BOX, other) => Err(GwError::InvalidConfig(format!(
                "interaction kernel PiecewiseBox takes 4 arguments, got {}",
                other.len()
            ))),

            (Self::KIND_CROSS, &[near, far, near_axis, near_misaligned, far_axis, far_misaligned]) => {
                Ok(InteractionFn::Cross {
                    near,
                    far,
                    near_axis,
                    near_misaligned,
                    far_axis,
                    far_misaligned,
                })
            }
            (Self::KIND_CROSS, other) => Err(GwError::InvalidConfig(format!(
                "interaction kernel Cross takes 6 arguments, got {}",
                other.len()
            ))),

            (other, _) => Err(GwError::InvalidConfig(format!(
                "unknown interaction kernel id {other}"
            ))),
        }
    }
}
