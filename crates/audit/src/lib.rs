//! Empirical membership-inference auditing.
//!
//! A [`ShadowModelBundle`] trains shadow copies of the target architecture
//! and labels their confidence vectors by membership; the attack classifier
//! fitted on that table is then scored on rows from the target model with
//! [`prepare_attack_data`] and [`AttackMetrics`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod features;
mod metrics;
mod shadow;

pub use features::{attack_rows, prepare_attack_data, AttackFeatures};
pub use metrics::{epsilon_lower_bound, roc_auc, AttackMetrics, ConfusionCounts};
pub use shadow::ShadowModelBundle;

/// Common imports for auditing.
pub mod prelude {
    pub use crate::{
        attack_rows, epsilon_lower_bound, prepare_attack_data, roc_auc, AttackFeatures,
        AttackMetrics, ConfusionCounts, ShadowModelBundle,
    };
}
