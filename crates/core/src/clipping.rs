//! Gradient clipping for bounded sensitivity.

use ndarray::{ArrayViewD, ArrayViewMutD, Zip};

use crate::tensor::{sum_of_squares, Scalar};

/// A fixed collection of parameter (or gradient) arrays.
///
/// Two values of the same type must yield leaves of matching shapes, in the
/// same order.
pub trait ParamTree {
    /// Read-only views of every leaf.
    fn leaves(&self) -> Vec<ArrayViewD<'_, Scalar>>;

    /// Mutable views of every leaf.
    fn leaves_mut(&mut self) -> Vec<ArrayViewMutD<'_, Scalar>>;
}

/// Result of a clipping operation.
#[derive(Clone, Debug)]
pub struct ClipReport {
    /// Original global L2 norm before clipping.
    pub original_norm: f64,
    /// Whether clipping was applied.
    pub clipped: bool,
    /// Scale factor applied (1.0 if not clipped).
    pub scale: f64,
}

/// Global L2 norm across all leaves.
pub fn global_l2_norm<T: ParamTree + ?Sized>(tree: &T) -> f64 {
    tree.leaves()
        .iter()
        .map(|leaf| sum_of_squares(leaf))
        .sum::<f64>()
        .sqrt()
}

/// Multiply every leaf by `factor`.
pub fn scale_tree<T: ParamTree + ?Sized>(tree: &mut T, factor: f64) {
    for mut leaf in tree.leaves_mut() {
        leaf.mapv_inplace(|v| v * factor);
    }
}

/// `acc += weight * other`, leaf by leaf.
///
/// # Panics
///
/// Panics if the trees disagree in structure.
pub fn accumulate<T: ParamTree + ?Sized>(acc: &mut T, other: &T, weight: f64) {
    let src = other.leaves();
    let mut dst = acc.leaves_mut();
    assert_eq!(dst.len(), src.len(), "trees must share structure");
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        Zip::from(d).and(s).for_each(|d, &s| *d += weight * s);
    }
}

/// Clip a tree in place to a maximum global L2 norm.
///
/// A non-finite norm or an invalid bound zeroes the tree.
pub fn clip_tree<T: ParamTree + ?Sized>(tree: &mut T, max_norm: f64) -> ClipReport {
    let norm = global_l2_norm(tree);

    if !max_norm.is_finite() || max_norm <= 0.0 || !norm.is_finite() {
        for mut leaf in tree.leaves_mut() {
            leaf.fill(0.0);
        }
        return ClipReport {
            original_norm: norm,
            clipped: true,
            scale: 0.0,
        };
    }

    if norm <= max_norm {
        return ClipReport {
            original_norm: norm,
            clipped: false,
            scale: 1.0,
        };
    }

    let scale = max_norm / norm;
    scale_tree(tree, scale);
    ClipReport {
        original_norm: norm,
        clipped: true,
        scale,
    }
}
