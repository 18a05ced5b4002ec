//! Privacy parameters and the resulting budget.

use std::fmt;

use mia_privacy_core::{MiaError, Result};

use crate::rdp::{default_orders, RdpAccountant};

/// Scalar hyperparameters of a DP-SGD run, as seen by the accountant.
#[derive(Clone, Debug, PartialEq)]
pub struct PrivacyParams {
    /// Noise multiplier (sigma / clipping norm).
    pub noise_multiplier: f64,
    /// Expected batch size.
    pub batch_size: usize,
    /// Number of optimizer steps.
    pub steps: u64,
    /// Number of training examples.
    pub dataset_size: usize,
    /// Target delta.
    pub target_delta: f64,
    /// Rényi orders to evaluate.
    pub candidate_orders: Vec<f64>,
}

impl PrivacyParams {
    /// Parameters with the default order set.
    pub fn new(
        noise_multiplier: f64,
        batch_size: usize,
        steps: u64,
        dataset_size: usize,
        target_delta: f64,
    ) -> Self {
        Self {
            noise_multiplier,
            batch_size,
            steps,
            dataset_size,
            target_delta,
            candidate_orders: default_orders(),
        }
    }

    /// Replace the candidate orders.
    pub fn with_orders(mut self, orders: Vec<f64>) -> Self {
        self.candidate_orders = orders;
        self
    }

    /// Probability that any one example lands in a batch.
    pub fn sampling_probability(&self) -> f64 {
        self.batch_size as f64 / self.dataset_size as f64
    }

    /// Validate parameters.
    pub fn validate(&self) -> Result<()> {
        if !self.noise_multiplier.is_finite() || self.noise_multiplier < 0.0 {
            return Err(MiaError::invalid("noise_multiplier must be non-negative"));
        }
        if self.dataset_size == 0 {
            return Err(MiaError::invalid("dataset_size must be positive"));
        }
        if self.batch_size == 0 || self.batch_size > self.dataset_size {
            return Err(MiaError::invalid(
                "batch_size must be in [1, dataset_size]",
            ));
        }
        if !self.target_delta.is_finite() || self.target_delta <= 0.0 || self.target_delta >= 1.0
        {
            return Err(MiaError::invalid("target_delta must be in (0, 1)"));
        }
        if !self.candidate_orders.iter().any(|&a| a.is_finite() && a > 1.0) {
            return Err(MiaError::invalid(
                "candidate_orders must contain an order above 1",
            ));
        }
        Ok(())
    }
}

/// An (epsilon, delta) guarantee, or the absence of one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PrivacyBudget {
    /// A finite guarantee.
    Bounded {
        /// Privacy loss bound.
        epsilon: f64,
        /// Delta the bound holds for.
        delta: f64,
        /// Rényi order attaining the minimum.
        optimal_order: f64,
    },
    /// No guarantee: training added no noise, or no order gives a finite bound.
    Unbounded,
}

impl PrivacyBudget {
    /// Epsilon, with `f64::INFINITY` standing in for an unbounded budget.
    pub fn epsilon(&self) -> f64 {
        match self {
            PrivacyBudget::Bounded { epsilon, .. } => *epsilon,
            PrivacyBudget::Unbounded => f64::INFINITY,
        }
    }

    /// Whether a finite guarantee exists.
    pub fn is_bounded(&self) -> bool {
        matches!(self, PrivacyBudget::Bounded { .. })
    }
}

impl fmt::Display for PrivacyBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivacyBudget::Bounded {
                epsilon,
                delta,
                optimal_order,
            } => write!(
                f,
                "eps={epsilon:.4} at delta={delta:.0e} (order {optimal_order})"
            ),
            PrivacyBudget::Unbounded => write!(f, "eps=inf"),
        }
    }
}

/// Compose `steps` subsampled-Gaussian steps and convert to (epsilon, delta).
///
/// A zero noise multiplier yields [`PrivacyBudget::Unbounded`] whatever the other
/// fields hold.
pub fn compute_epsilon(params: &PrivacyParams) -> Result<PrivacyBudget> {
    if params.noise_multiplier.is_nan() || params.noise_multiplier < 0.0 {
        return Err(MiaError::invalid("noise_multiplier must be non-negative"));
    }
    if params.noise_multiplier == 0.0 {
        return Ok(PrivacyBudget::Unbounded);
    }
    params.validate()?;

    let q = params.sampling_probability();
    let mut acct = RdpAccountant::with_orders(params.candidate_orders.clone());
    acct.steps(params.noise_multiplier, q, params.steps);
    let (epsilon, order) = acct.epsilon_and_order(params.target_delta);

    let budget = match order {
        Some(optimal_order) if epsilon.is_finite() => PrivacyBudget::Bounded {
            epsilon,
            delta: params.target_delta,
            optimal_order,
        },
        _ => PrivacyBudget::Unbounded,
    };
    tracing::debug!(q, steps = params.steps, %budget, "computed privacy budget");
    Ok(budget)
}

/// Optimizer steps taken by `epochs` passes over `dataset_size` examples.
pub fn steps_for_epochs(epochs: usize, dataset_size: usize, batch_size: usize) -> u64 {
    if batch_size == 0 {
        return 0;
    }
    (epochs as u64).saturating_mul(dataset_size as u64) / batch_size as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(noise: f64) -> PrivacyParams {
        PrivacyParams::new(noise, 8, steps_for_epochs(10, 50_000, 8), 50_000, 1e-5)
    }

    #[test]
    fn zero_noise_is_unbounded() {
        let budget = compute_epsilon(&params(0.0)).expect("budget");
        assert_eq!(budget, PrivacyBudget::Unbounded);
        assert!(budget.epsilon().is_infinite());
        assert!(budget.epsilon() > 0.0);
    }

    #[test]
    fn zero_noise_is_unbounded_for_any_shape() {
        for (batch, steps, n) in [(1, 1, 1), (64, 0, 100), (256, 1_000_000, 60_000)] {
            let p = PrivacyParams::new(0.0, batch, steps, n, 1e-3);
            assert_eq!(compute_epsilon(&p).expect("budget"), PrivacyBudget::Unbounded);
        }
        // Degenerate shapes still get the sentinel when there is no noise.
        for (batch, n, delta) in [(8, 0, 1e-5), (200, 100, 1e-5), (8, 100, 0.0), (0, 0, 2.0)] {
            let p = PrivacyParams::new(0.0, batch, 10, n, delta);
            assert_eq!(compute_epsilon(&p).expect("budget"), PrivacyBudget::Unbounded);
        }
    }

    #[test]
    fn reference_configuration_is_bounded() {
        let budget = compute_epsilon(&params(1.4)).expect("budget");
        assert!(budget.is_bounded());
        let eps = budget.epsilon();
        assert!(eps > 0.0 && eps < 10.0, "eps = {eps}");
    }

    #[test]
    fn more_noise_means_smaller_epsilon() {
        let mut last = f64::INFINITY;
        for noise in [0.5, 0.8, 1.1, 1.4, 2.0, 4.0] {
            let eps = compute_epsilon(&params(noise)).expect("budget").epsilon();
            assert!(eps <= last + 1e-9);
            last = eps;
        }
    }

    #[test]
    fn zero_steps_spend_only_conversion_slack() {
        let p = PrivacyParams::new(1.0, 8, 0, 1000, 1e-5);
        let eps = compute_epsilon(&p).expect("budget").epsilon();
        // ln(1/delta) / (63 - 1) at the largest default order.
        assert!((eps - (1e5f64).ln() / 62.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_invalid_inputs() {
        assert!(compute_epsilon(&PrivacyParams::new(-1.0, 8, 10, 100, 1e-5)).is_err());
        assert!(compute_epsilon(&PrivacyParams::new(1.0, 8, 10, 0, 1e-5)).is_err());
        assert!(compute_epsilon(&PrivacyParams::new(1.0, 200, 10, 100, 1e-5)).is_err());
        assert!(compute_epsilon(&PrivacyParams::new(1.0, 8, 10, 100, 0.0)).is_err());
        assert!(compute_epsilon(&params(1.0).with_orders(vec![0.5, 1.0])).is_err());
    }

    #[test]
    fn steps_round_down() {
        assert_eq!(steps_for_epochs(10, 50_000, 8), 62_500);
        assert_eq!(steps_for_epochs(3, 10, 4), 7);
        assert_eq!(steps_for_epochs(3, 10, 0), 0);
    }
}
