//! Scalar type and low-level array operations.

use ndarray::{ArrayBase, ArrayView1, Data, Dimension};

/// Scalar type used for features, parameters, and gradients.
pub type Scalar = f64;

/// Sum of squares of an array, propagating NaN and infinity.
pub fn sum_of_squares<S, D>(t: &ArrayBase<S, D>) -> f64
where
    S: Data<Elem = Scalar>,
    D: Dimension,
{
    let mut sum_sq = 0.0;
    for &v in t.iter() {
        if v.is_nan() {
            return f64::NAN;
        }
        if !v.is_finite() {
            return f64::INFINITY;
        }
        sum_sq += v * v;
    }
    sum_sq
}

/// Compute L2 norm of an array, handling NaN/inf.
pub fn l2_norm<S, D>(t: &ArrayBase<S, D>) -> f64
where
    S: Data<Elem = Scalar>,
    D: Dimension,
{
    sum_of_squares(t).sqrt()
}

/// Index of the largest entry; ties resolve to the lowest index.
pub fn argmax(row: ArrayView1<'_, Scalar>) -> usize {
    let mut best = 0usize;
    let mut best_val = f64::NEG_INFINITY;
    for (i, &v) in row.iter().enumerate() {
        if v > best_val {
            best = i;
            best_val = v;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_l2_norm() {
        let t = array![3.0, 4.0];
        assert!((l2_norm(&t) - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_l2_norm_nan() {
        let t = array![1.0, f64::NAN, 2.0];
        assert!(l2_norm(&t).is_nan());
    }

    #[test]
    fn argmax_prefers_first_tie() {
        let row = array![0.2, 0.4, 0.4];
        assert_eq!(argmax(row.view()), 1);
    }
}
