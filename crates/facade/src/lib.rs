//! Shadow-model membership-inference auditing with differential-privacy
//! accounting.
//!
//! This crate re-exports the workspace crates and adds the pieces that tie
//! them into one run: [`ExperimentConfig`], the adult-table loader, and
//! [`run_experiment`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod data;
pub mod pipeline;

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use mia_privacy_accounting as accounting;
pub use mia_privacy_audit as audit;
pub use mia_privacy_core as core;
pub use mia_privacy_models as models;

pub use accounting::{
    calibrate_noise_multiplier, compute_epsilon, compute_rdp, default_orders, get_privacy_spent,
    steps_for_epochs, PrivacyBudget, PrivacyParams, RdpAccountant,
};
pub use audit::{
    prepare_attack_data, AttackFeatures, AttackMetrics, ConfusionCounts, ShadowModelBundle,
};
pub use config::ExperimentConfig;
pub use mia_privacy_core::{split_to_be_divisible, Dataset, Estimator, MiaError, Predictor, Result};
pub use data::{load_adult, parse_adult, synthetic_dataset};
pub use models::{ConvNetEstimator, OptimizerMode, RandomForestConfig, TrainConfig};
pub use pipeline::{
    partition_pools, privacy_params, run_experiment, ExperimentPools, ExperimentReport,
    PartitionSizes,
};

/// Everything needed to configure and run an audit.
pub mod prelude {
    pub use crate::config::ExperimentConfig;
    pub use crate::data::{load_adult, parse_adult, synthetic_dataset};
    pub use crate::pipeline::{
        partition_pools, run_experiment, ExperimentPools, ExperimentReport, PartitionSizes,
    };
    pub use mia_privacy_accounting::prelude::*;
    pub use mia_privacy_audit::prelude::*;
    pub use mia_privacy_core::prelude::*;
    pub use mia_privacy_models::prelude::*;
}
