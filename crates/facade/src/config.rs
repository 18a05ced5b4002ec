//! The single configuration object for an end-to-end audit run.

use mia_privacy_accounting::default_orders;
use mia_privacy_audit::AttackFeatures;
use mia_privacy_core::{MiaError, Result};
use mia_privacy_models::{OptimizerMode, RandomForestConfig, TrainConfig};

/// Hyperparameters for partitioning, target/shadow training, the attack
/// classifier, and privacy accounting.
#[derive(Clone, Debug)]
pub struct ExperimentConfig {
    /// Seed for the one random source threaded through the run.
    pub seed: u64,
    /// Training epochs for target and shadow models.
    pub epochs: usize,
    /// Training batch size; also the divisor for the second and third splits.
    pub batch_size: usize,
    /// Fraction of each batch used as the number of DP microbatches.
    pub microbatches_perc: f64,
    /// SGD step size.
    pub learning_rate: f64,
    /// DP noise standard deviation relative to the clipping bound.
    pub noise_multiplier: f64,
    /// DP per-microbatch clipping bound.
    pub l2_norm_clip: f64,
    /// Train with DP-SGD rather than plain SGD.
    pub dpsgd: bool,
    /// Number of shadow models.
    pub num_shadow_models: usize,
    /// Fraction of all rows sent to the shadow side in the first split.
    pub shadow_fraction: f64,
    /// Batch divisor for the first (target vs shadow) split.
    pub target_split_batch: usize,
    /// Fraction of the shadow side held out as never-seen rows.
    pub unused_fraction: f64,
    /// Fraction of the target side used for validation.
    pub valid_fraction: f64,
    /// Attack classifier settings.
    pub attack_forest: RandomForestConfig,
    /// Attack feature row layout.
    pub attack_features: AttackFeatures,
    /// Target delta for the (ε, δ) conversion.
    pub target_delta: f64,
    /// Rényi orders searched by the accountant.
    pub candidate_orders: Vec<f64>,
    /// Z-score feature columns before partitioning.
    pub standardize: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            seed: 19122,
            epochs: 10,
            batch_size: 8,
            microbatches_perc: 0.5,
            learning_rate: 0.01,
            noise_multiplier: 1.4,
            l2_norm_clip: 1.8,
            dpsgd: true,
            num_shadow_models: 1,
            shadow_fraction: 0.5,
            target_split_batch: 80,
            unused_fraction: 0.3,
            valid_fraction: 0.2,
            attack_forest: RandomForestConfig::default(),
            attack_features: AttackFeatures::Confidence,
            target_delta: 1e-5,
            candidate_orders: default_orders(),
            standardize: false,
        }
    }
}

impl ExperimentConfig {
    /// Number of DP microbatches per batch.
    pub fn num_microbatches(&self) -> usize {
        (self.microbatches_perc * self.batch_size as f64) as usize
    }

    /// Optimizer selected by `dpsgd`.
    pub fn optimizer(&self) -> OptimizerMode {
        if self.dpsgd {
            OptimizerMode::DpSgd {
                l2_norm_clip: self.l2_norm_clip,
                noise_multiplier: self.noise_multiplier,
                num_microbatches: self.num_microbatches(),
                learning_rate: self.learning_rate,
            }
        } else {
            OptimizerMode::Sgd {
                learning_rate: self.learning_rate,
            }
        }
    }

    /// Schedule shared by target and shadow models.
    pub fn train_config(&self) -> TrainConfig {
        TrainConfig {
            epochs: self.epochs,
            batch_size: self.batch_size,
            optimizer: self.optimizer(),
        }
    }

    /// Noise multiplier the accountant should see: zero for non-private runs.
    pub fn effective_noise_multiplier(&self) -> f64 {
        if self.dpsgd {
            self.noise_multiplier
        } else {
            0.0
        }
    }

    /// Reject inconsistent settings before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.target_split_batch == 0 {
            return Err(MiaError::invalid("batch sizes must be positive"));
        }
        for (name, f) in [
            ("shadow_fraction", self.shadow_fraction),
            ("unused_fraction", self.unused_fraction),
            ("valid_fraction", self.valid_fraction),
        ] {
            if !(f > 0.0 && f < 1.0) {
                return Err(MiaError::invalid(format!("{name} must be in (0, 1)")));
            }
        }
        if !(self.microbatches_perc > 0.0 && self.microbatches_perc <= 1.0) {
            return Err(MiaError::invalid("microbatches_perc must be in (0, 1]"));
        }
        if self.num_shadow_models == 0 {
            return Err(MiaError::invalid("num_shadow_models must be positive"));
        }
        if !(self.target_delta > 0.0 && self.target_delta < 1.0) {
            return Err(MiaError::invalid("target_delta must be in (0, 1)"));
        }
        if self.candidate_orders.iter().all(|&a| !(a > 1.0)) {
            return Err(MiaError::invalid("candidate_orders needs an order above 1"));
        }
        self.attack_forest.validate()?;
        self.train_config().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_private() {
        let cfg = ExperimentConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.num_microbatches(), 4);
        assert!(cfg.optimizer().is_private());
        assert_eq!(cfg.attack_forest.max_depth, 2);
    }

    #[test]
    fn non_private_run_reports_zero_noise() {
        let cfg = ExperimentConfig {
            dpsgd: false,
            ..ExperimentConfig::default()
        };
        assert_eq!(cfg.effective_noise_multiplier(), 0.0);
        assert!(!cfg.optimizer().is_private());
    }

    #[test]
    fn rejects_bad_values() {
        let bad = [
            ExperimentConfig {
                batch_size: 0,
                ..ExperimentConfig::default()
            },
            ExperimentConfig {
                shadow_fraction: 1.0,
                ..ExperimentConfig::default()
            },
            ExperimentConfig {
                microbatches_perc: 0.375,
                ..ExperimentConfig::default()
            },
            ExperimentConfig {
                l2_norm_clip: 0.0,
                ..ExperimentConfig::default()
            },
            ExperimentConfig {
                noise_multiplier: -1.0,
                ..ExperimentConfig::default()
            },
        ];
        for cfg in bad {
            assert!(cfg.validate().is_err(), "{cfg:?}");
        }
    }
}
