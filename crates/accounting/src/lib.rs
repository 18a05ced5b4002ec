//! Privacy accounting for differentially private training.
//!
//! Converts DP-SGD hyperparameters into an (epsilon, delta) bound by
//! composing the Rényi divergence of the subsampled Gaussian mechanism over
//! all training steps and minimizing over a set of Rényi orders.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod calibrate;
pub mod params;
pub mod rdp;

pub use calibrate::calibrate_noise_multiplier;
pub use params::{compute_epsilon, steps_for_epochs, PrivacyBudget, PrivacyParams};
pub use rdp::{compute_rdp, default_orders, get_privacy_spent, RdpAccountant};

/// Common imports for privacy accounting.
pub mod prelude {
    pub use crate::{
        calibrate_noise_multiplier, compute_epsilon, compute_rdp, default_orders,
        get_privacy_spent, steps_for_epochs, PrivacyBudget, PrivacyParams, RdpAccountant,
    };
}
