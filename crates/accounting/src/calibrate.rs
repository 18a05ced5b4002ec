//! Calibration of DP-SGD hyperparameters against a target epsilon.

use mia_privacy_core::{MiaError, Result};

use crate::params::{compute_epsilon, PrivacyParams};

/// Find the smallest noise multiplier whose epsilon stays within
/// `target_epsilon`.
///
/// `base.noise_multiplier` is ignored. The search brackets from
/// `initial_max_noise`, doubling until the target is met, then bisects to
/// within `tol`.
pub fn calibrate_noise_multiplier(
    target_epsilon: f64,
    base: &PrivacyParams,
    initial_max_noise: f64,
    tol: f64,
) -> Result<f64> {
    if !target_epsilon.is_finite() || target_epsilon <= 0.0 {
        return Err(MiaError::invalid("target_epsilon must be positive"));
    }
    if !tol.is_finite() || tol <= 0.0 {
        return Err(MiaError::invalid("tol must be positive"));
    }

    let epsilon_for = |noise: f64| -> Result<f64> {
        let mut params = base.clone();
        params.noise_multiplier = noise;
        Ok(compute_epsilon(&params)?.epsilon())
    };

    let mut lo = 0.0f64;
    let mut hi = initial_max_noise.max(tol);
    let mut expansions = 0usize;
    while epsilon_for(hi)? > target_epsilon {
        lo = hi;
        hi *= 2.0;
        expansions += 1;
        if expansions > 60 {
            return Err(MiaError::invalid(
                "target epsilon unreachable with any finite noise multiplier",
            ));
        }
    }

    while hi - lo > tol {
        let mid = 0.5 * (lo + hi);
        if epsilon_for(mid)? <= target_epsilon {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    tracing::debug!(target_epsilon, noise_multiplier = hi, "calibrated noise multiplier");
    Ok(hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::steps_for_epochs;

    fn base() -> PrivacyParams {
        PrivacyParams::new(0.0, 8, steps_for_epochs(10, 20_000, 8), 20_000, 1e-5)
    }

    #[test]
    fn calibrated_noise_meets_target() {
        let sigma = calibrate_noise_multiplier(2.0, &base(), 4.0, 1e-3).expect("sigma");
        let mut p = base();
        p.noise_multiplier = sigma;
        let eps = compute_epsilon(&p).expect("budget").epsilon();
        assert!(eps <= 2.0 + 1e-9);

        p.noise_multiplier = (sigma - 0.01).max(1e-3);
        let looser = compute_epsilon(&p).expect("budget").epsilon();
        assert!(looser > 2.0);
    }

    #[test]
    fn expands_bracket_when_needed() {
        let sigma = calibrate_noise_multiplier(0.1, &base(), 0.5, 1e-2).expect("sigma");
        assert!(sigma > 0.5);
    }

    #[test]
    fn rejects_non_positive_target() {
        assert!(calibrate_noise_multiplier(0.0, &base(), 1.0, 1e-3).is_err());
    }
}
