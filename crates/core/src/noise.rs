//! Gaussian noise for differentially private aggregation.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::clipping::ParamTree;

/// Add i.i.d. Gaussian noise to every leaf of a parameter tree.
pub fn add_gaussian_noise_tree<T, R>(tree: &mut T, sigma: f64, rng: &mut R)
where
    T: ParamTree + ?Sized,
    R: Rng + ?Sized,
{
    // Zero, negative, or non-finite sigma adds nothing.
    let Ok(dist) = Normal::new(0.0, sigma) else {
        return;
    };
    if sigma <= 0.0 {
        return;
    }
    for mut leaf in tree.leaves_mut() {
        leaf.mapv_inplace(|x| x + dist.sample(&mut *rng));
    }
}

/// Gaussian noise scaled to an L2 sensitivity: `sigma = noise_mult * sensitivity`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussianMechanism {
    /// Noise standard deviation per unit of sensitivity.
    pub noise_mult: f64,
    /// L2 bound on one contribution (the clipping norm).
    pub sensitivity: f64,
}

impl GaussianMechanism {
    /// Mechanism for contributions clipped to `sensitivity`.
    pub fn new(noise_mult: f64, sensitivity: f64) -> Self {
        Self {
            noise_mult,
            sensitivity,
        }
    }

    /// Noise standard deviation.
    pub fn sigma(&self) -> f64 {
        self.noise_mult * self.sensitivity
    }

    /// Add noise to every leaf of a tree.
    pub fn apply<T, R>(&self, tree: &mut T, rng: &mut R)
    where
        T: ParamTree + ?Sized,
        R: Rng + ?Sized,
    {
        add_gaussian_noise_tree(tree, self.sigma(), rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, ArrayViewD, ArrayViewMutD};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    struct Flat(Array1<f64>);

    impl ParamTree for Flat {
        fn leaves(&self) -> Vec<ArrayViewD<'_, f64>> {
            vec![self.0.view().into_dyn()]
        }

        fn leaves_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
            vec![self.0.view_mut().into_dyn()]
        }
    }

    #[test]
    fn seeded_noise_repeats() {
        let noisy = |seed| {
            let mut tree = Flat(Array1::zeros(64));
            add_gaussian_noise_tree(&mut tree, 0.7, &mut ChaCha8Rng::seed_from_u64(seed));
            tree.0
        };
        assert_eq!(noisy(42), noisy(42));
        assert_ne!(noisy(42), noisy(43));
    }

    #[test]
    fn mechanism_noise_has_expected_spread() {
        let mut rng = ChaCha8Rng::seed_from_u64(123);
        let mut tree = Flat(Array1::zeros(10_000));
        GaussianMechanism::new(1.4, 1.8).apply(&mut tree, &mut rng);

        let n = tree.0.len() as f64;
        let mean = tree.0.sum() / n;
        let var = tree.0.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let expected = (1.4f64 * 1.8).powi(2);

        assert!(mean.abs() < 0.1);
        assert!((var - expected).abs() / expected < 0.05);
    }

    #[test]
    fn zero_sigma_is_noop() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut tree = Flat(Array1::ones(4));
        add_gaussian_noise_tree(&mut tree, 0.0, &mut rng);
        assert!(tree.0.iter().all(|&v| v == 1.0));
    }
}
