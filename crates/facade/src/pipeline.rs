//! End-to-end shadow-model membership-inference audit.

use std::fmt;

use rand::Rng;

use mia_privacy_accounting::{compute_epsilon, steps_for_epochs, PrivacyBudget, PrivacyParams};
use mia_privacy_audit::{prepare_attack_data, AttackMetrics, ShadowModelBundle};
use mia_privacy_core::{accuracy, split_to_be_divisible, Dataset, Estimator, MiaError, Result};
use mia_privacy_models::ConvNetEstimator;

use crate::config::ExperimentConfig;

/// Row counts of every pool the run used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionSizes {
    /// Target model training rows (the attack's "in" pool).
    pub target_train: usize,
    /// Target model validation rows.
    pub target_valid: usize,
    /// Rows the shadow models sample from.
    pub shadow: usize,
    /// Rows no model ever trains on (the attack's "out" pool).
    pub unused: usize,
    /// Rows in the shadow-derived attack training table.
    pub attack_train: usize,
    /// Rows in the target-derived attack evaluation table.
    pub attack_eval: usize,
}

/// Outcome of [`run_experiment`].
#[derive(Clone, Debug)]
pub struct ExperimentReport {
    /// Pool sizes.
    pub sizes: PartitionSizes,
    /// Target model accuracy on its own training rows.
    pub target_train_accuracy: f64,
    /// Target model accuracy on held-out validation rows.
    pub target_valid_accuracy: f64,
    /// Attack quality against the target model.
    pub attack: AttackMetrics,
    /// Theoretical guarantee of the target model's training run.
    pub budget: PrivacyBudget,
}

impl fmt::Display for ExperimentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "attack accuracy: {}", self.attack.accuracy)?;
        writeln!(f, "Precision: {}", self.attack.precision)?;
        writeln!(f, "Recall: {}", self.attack.recall)?;
        writeln!(f, "F1-Score: {}", self.attack.f1)?;
        write!(f, "Privacy Budget Epsilon: {}", self.budget.epsilon())
    }
}

/// Accounting inputs for a target model trained on `train_size` rows.
pub fn privacy_params(config: &ExperimentConfig, train_size: usize) -> PrivacyParams {
    PrivacyParams::new(
        config.effective_noise_multiplier(),
        config.batch_size,
        steps_for_epochs(config.epochs, train_size, config.batch_size),
        train_size,
        config.target_delta,
    )
    .with_orders(config.candidate_orders.clone())
}

/// The four pools a run draws from.
#[derive(Clone, Debug)]
pub struct ExperimentPools {
    /// Target model training rows.
    pub train: Dataset,
    /// Target model validation rows.
    pub valid: Dataset,
    /// Rows the shadow models sample from.
    pub shadow: Dataset,
    /// Rows no model ever trains on.
    pub unused: Dataset,
}

/// Split `data` into target training/validation, shadow and never-seen pools.
///
/// Partitioning runs in three stages: target vs shadow (batch divisor
/// `target_split_batch`), shadow vs never-seen rows, and target training vs
/// validation. The pools are pairwise disjoint. An empty training, shadow or
/// never-seen pool is reported against the rows that entered its stage.
pub fn partition_pools<R: Rng + ?Sized>(
    config: &ExperimentConfig,
    data: &Dataset,
    rng: &mut R,
) -> Result<ExperimentPools> {
    let first = split_to_be_divisible(data, config.shadow_fraction, config.target_split_batch, rng)?;
    let (target, shadow) = (first.kept, first.split);
    let second = split_to_be_divisible(&shadow, config.unused_fraction, config.batch_size, rng)?;
    let third = split_to_be_divisible(&target, config.valid_fraction, config.batch_size, rng)?;

    let pools = ExperimentPools {
        train: third.kept,
        valid: third.split,
        shadow: second.kept,
        unused: second.split,
    };
    for (pool, rows, source) in [
        ("target training pool", pools.train.len(), target.len()),
        ("shadow pool", pools.shadow.len(), shadow.len()),
        ("unused pool", pools.unused.len(), shadow.len()),
    ] {
        if rows == 0 {
            tracing::warn!(pool, source_rows = source, "partition came out empty");
            return Err(MiaError::insufficient(pool, config.batch_size, source));
        }
    }
    Ok(pools)
}

/// Partition `dataset`, train the target and shadow models, fit and score
/// the attack, and account for the target's privacy budget.
///
/// Any failure aborts the whole run.
pub fn run_experiment<R: Rng + ?Sized>(
    config: &ExperimentConfig,
    dataset: &Dataset,
    rng: &mut R,
) -> Result<ExperimentReport> {
    config.validate()?;
    let mut data = dataset.clone();
    if config.standardize {
        data.standardize();
    }

    let ExperimentPools {
        train,
        valid,
        shadow,
        unused,
    } = partition_pools(config, &data, rng)?;
    tracing::info!(
        train = train.len(),
        valid = valid.len(),
        shadow = shadow.len(),
        unused = unused.len(),
        "partitioned"
    );

    let estimator = ConvNetEstimator::new(data.num_classes().max(2), config.train_config());

    tracing::info!("training target model");
    let target_model = estimator.fit(&train, Some(&valid), rng)?;
    let target_train_accuracy = accuracy(&target_model, &train)?;
    let target_valid_accuracy = accuracy(&target_model, &valid)?;
    tracing::info!(
        train_accuracy = target_train_accuracy,
        valid_accuracy = target_valid_accuracy,
        "target model trained"
    );

    tracing::info!(models = config.num_shadow_models, "training shadow models");
    let bundle = ShadowModelBundle::new(estimator, shadow.len() / 2, config.num_shadow_models)
        .with_features(config.attack_features);
    let attack_train = bundle.fit_transform(&shadow, rng)?;

    tracing::info!(rows = attack_train.len(), "training attack model");
    let attack_model = config.attack_forest.fit(&attack_train, None, rng)?;

    let attack_eval = prepare_attack_data(&target_model, &train, &unused, config.attack_features)?;
    let attack = AttackMetrics::evaluate(&attack_model, &attack_eval)?;
    tracing::info!(%attack, "attack evaluated");

    let budget = compute_epsilon(&privacy_params(config, train.len()))?;
    tracing::info!(%budget, "privacy budget");

    Ok(ExperimentReport {
        sizes: PartitionSizes {
            target_train: train.len(),
            target_valid: valid.len(),
            shadow: shadow.len(),
            unused: unused.len(),
            attack_train: attack_train.len(),
            attack_eval: attack_eval.len(),
        },
        target_train_accuracy,
        target_valid_accuracy,
        attack,
        budget,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accountant_sees_training_pool() {
        let cfg = ExperimentConfig::default();
        let params = privacy_params(&cfg, 384);
        assert_eq!(params.dataset_size, 384);
        assert_eq!(params.steps, 10 * 48);
        assert_eq!(params.noise_multiplier, 1.4);
    }

    #[test]
    fn sgd_run_has_no_guarantee() {
        let cfg = ExperimentConfig {
            dpsgd: false,
            ..ExperimentConfig::default()
        };
        let budget = compute_epsilon(&privacy_params(&cfg, 384)).unwrap();
        assert_eq!(budget, PrivacyBudget::Unbounded);
    }
}
