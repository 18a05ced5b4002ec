//! Gradient aggregation for plain SGD and DP-SGD.

use rand::Rng;

use mia_privacy_core::{accumulate, clip_tree, scale_tree, GaussianMechanism, MiaError, ParamTree, Result};

/// How the microbatch gradients of a batch become one update direction.
#[derive(Clone, Debug, PartialEq)]
pub enum OptimizerMode {
    /// Differentially private SGD.
    ///
    /// The batch is split into `num_microbatches` contiguous groups. Each
    /// group's mean gradient is clipped to `l2_norm_clip`, the clipped means
    /// are summed, Gaussian noise with standard deviation
    /// `l2_norm_clip * noise_multiplier` is added, and the sum is divided by
    /// `num_microbatches`.
    DpSgd {
        /// Per-microbatch L2 clipping bound.
        l2_norm_clip: f64,
        /// Noise standard deviation relative to the clipping bound.
        noise_multiplier: f64,
        /// Number of microbatches per batch.
        num_microbatches: usize,
        /// Step size.
        learning_rate: f64,
    },
    /// Unclipped, noiseless mini-batch gradient descent.
    Sgd {
        /// Step size.
        learning_rate: f64,
    },
}

impl OptimizerMode {
    /// Step size.
    pub fn learning_rate(&self) -> f64 {
        match self {
            OptimizerMode::DpSgd { learning_rate, .. } | OptimizerMode::Sgd { learning_rate } => {
                *learning_rate
            }
        }
    }

    /// Whether updates are clipped and noised.
    pub fn is_private(&self) -> bool {
        matches!(self, OptimizerMode::DpSgd { .. })
    }

    /// Validate against the batch size the optimizer will see.
    pub fn validate(&self, batch_size: usize) -> Result<()> {
        let lr = self.learning_rate();
        if !lr.is_finite() || lr <= 0.0 {
            return Err(MiaError::invalid("learning_rate must be positive"));
        }
        if let OptimizerMode::DpSgd {
            l2_norm_clip,
            noise_multiplier,
            num_microbatches,
            ..
        } = *self
        {
            if !l2_norm_clip.is_finite() || l2_norm_clip <= 0.0 {
                return Err(MiaError::invalid("l2_norm_clip must be positive"));
            }
            if !noise_multiplier.is_finite() || noise_multiplier < 0.0 {
                return Err(MiaError::invalid("noise_multiplier must be non-negative"));
            }
            if num_microbatches == 0 || batch_size % num_microbatches != 0 {
                return Err(MiaError::invalid(format!(
                    "num_microbatches ({num_microbatches}) must divide batch_size ({batch_size})"
                )));
            }
        }
        Ok(())
    }

    /// Rows per microbatch for a batch of `batch_len` rows. Plain SGD
    /// treats the whole batch as one microbatch.
    pub fn microbatch_size(&self, batch_len: usize) -> usize {
        match *self {
            OptimizerMode::DpSgd {
                num_microbatches, ..
            } if num_microbatches > 0 => (batch_len / num_microbatches).max(1),
            _ => batch_len,
        }
    }

    /// Combine the mean gradients of a batch's microbatches into one update
    /// direction.
    ///
    /// # Panics
    ///
    /// Panics if `microbatches` is empty.
    pub fn combine<T, R>(&self, microbatches: &[T], rng: &mut R) -> T
    where
        T: ParamTree + Clone,
        R: Rng + ?Sized,
    {
        assert!(!microbatches.is_empty(), "batch must be non-empty");
        match *self {
            OptimizerMode::Sgd { .. } => mean(microbatches),
            OptimizerMode::DpSgd {
                l2_norm_clip,
                noise_multiplier,
                ..
            } => {
                let mut total = zeroed(&microbatches[0]);
                for micro in microbatches {
                    let mut grad = micro.clone();
                    clip_tree(&mut grad, l2_norm_clip);
                    accumulate(&mut total, &grad, 1.0);
                }
                GaussianMechanism::new(noise_multiplier, l2_norm_clip).apply(&mut total, rng);
                scale_tree(&mut total, 1.0 / microbatches.len() as f64);
                total
            }
        }
    }
}

fn zeroed<T: ParamTree + Clone>(like: &T) -> T {
    let mut out = like.clone();
    for mut leaf in out.leaves_mut() {
        leaf.fill(0.0);
    }
    out
}

fn mean<T: ParamTree + Clone>(grads: &[T]) -> T {
    let mut out = zeroed(&grads[0]);
    let weight = 1.0 / grads.len() as f64;
    for g in grads {
        accumulate(&mut out, g, weight);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mia_privacy_core::global_l2_norm;
    use ndarray::{array, Array1, ArrayViewD, ArrayViewMutD};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[derive(Clone, Debug)]
    struct Vector(Array1<f64>);

    impl ParamTree for Vector {
        fn leaves(&self) -> Vec<ArrayViewD<'_, f64>> {
            vec![self.0.view().into_dyn()]
        }

        fn leaves_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
            vec![self.0.view_mut().into_dyn()]
        }
    }

    fn dp(noise_multiplier: f64, num_microbatches: usize) -> OptimizerMode {
        OptimizerMode::DpSgd {
            l2_norm_clip: 1.0,
            noise_multiplier,
            num_microbatches,
            learning_rate: 0.1,
        }
    }

    #[test]
    fn sgd_averages() {
        let grads = vec![Vector(array![2.0, 0.0]), Vector(array![0.0, 4.0])];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let out = OptimizerMode::Sgd { learning_rate: 0.1 }.combine(&grads, &mut rng);
        assert_eq!(out.0, array![1.0, 2.0]);
    }

    #[test]
    fn microbatch_sizes() {
        assert_eq!(OptimizerMode::Sgd { learning_rate: 0.1 }.microbatch_size(8), 8);
        assert_eq!(dp(1.0, 4).microbatch_size(8), 2);
        assert_eq!(dp(1.0, 8).microbatch_size(8), 1);
    }

    #[test]
    fn dp_without_noise_clips_each_microbatch() {
        let grads = vec![Vector(array![3.0, 4.0]), Vector(array![0.1, 0.0])];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let out = dp(0.0, 2).combine(&grads, &mut rng);
        // (3, 4) clips to (0.6, 0.8); (0.1, 0) is already inside the bound.
        assert_relative_eq!(out.0[0], (0.6 + 0.1) / 2.0, epsilon = 1e-12);
        assert_relative_eq!(out.0[1], 0.8 / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn non_finite_microbatch_is_zeroed_by_clipping() {
        let grads = vec![Vector(array![f64::NAN, 1.0]), Vector(array![0.2, 0.0])];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let out = dp(0.0, 2).combine(&grads, &mut rng);
        assert_relative_eq!(out.0[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(out.0[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn dp_update_norm_is_bounded_without_noise() {
        let grads: Vec<Vector> = (0..4)
            .map(|i| Vector(array![i as f64 * 10.0, -5.0]))
            .collect();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let out = dp(0.0, 4).combine(&grads, &mut rng);
        assert!(global_l2_norm(&out) <= 1.0 + 1e-12);
    }

    #[test]
    fn dp_noise_is_seeded() {
        let grads = vec![Vector(Array1::zeros(16)); 2];
        let a = dp(1.4, 2).combine(&grads, &mut ChaCha8Rng::seed_from_u64(5));
        let b = dp(1.4, 2).combine(&grads, &mut ChaCha8Rng::seed_from_u64(5));
        assert_eq!(a.0, b.0);
        assert!(a.0.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn validate_requires_dividing_microbatches() {
        assert!(dp(1.0, 4).validate(8).is_ok());
        assert!(dp(1.0, 3).validate(8).is_err());
        assert!(dp(1.0, 0).validate(8).is_err());
        assert!(dp(-1.0, 4).validate(8).is_err());
        assert!(OptimizerMode::Sgd { learning_rate: 0.0 }.validate(8).is_err());
    }
}
