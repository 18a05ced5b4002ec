use mia_privacy::prelude::*;
use proptest::prelude::*;

#[test]
fn reference_hyperparameters_give_a_moderate_epsilon() {
    // Ten epochs over 50k rows at batch 8 with noise 1.4.
    let steps = steps_for_epochs(10, 50_000, 8);
    let params = PrivacyParams::new(1.4, 8, steps, 50_000, 1e-5);
    let budget = compute_epsilon(&params).unwrap();
    let eps = budget.epsilon();
    assert!(eps.is_finite() && eps > 0.0 && eps < 5.0, "{eps}");
}

#[test]
fn calibrated_noise_meets_target() {
    let base = PrivacyParams::new(1.0, 64, 1000, 60_000, 1e-5);
    let sigma = calibrate_noise_multiplier(2.0, &base, 10.0, 1e-3).unwrap();
    let params = PrivacyParams {
        noise_multiplier: sigma,
        ..base
    };
    assert!(compute_epsilon(&params).unwrap().epsilon() <= 2.0 + 1e-6);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn zero_noise_is_always_unbounded(
        batch in 0usize..512,
        steps in 0u64..10_000,
        dataset in 0usize..100_000,
        delta in prop_oneof![Just(0.0), Just(1.0), Just(-0.5), Just(f64::NAN), 1e-9f64..1.0],
    ) {
        let params = PrivacyParams::new(0.0, batch, steps, dataset, delta);
        prop_assert_eq!(compute_epsilon(&params).unwrap(), PrivacyBudget::Unbounded);
    }
}

#[test]
fn zero_noise_ignores_degenerate_shapes() {
    for params in [
        PrivacyParams::new(0.0, 8, 10, 0, 1e-5),
        PrivacyParams::new(0.0, 200, 10, 100, 1e-5),
        PrivacyParams::new(0.0, 8, 10, 100, 0.0),
        PrivacyParams::new(0.0, 8, 10, 100, 1e-5).with_orders(Vec::new()),
    ] {
        assert_eq!(compute_epsilon(&params).unwrap(), PrivacyBudget::Unbounded);
    }
}

#[test]
fn negative_or_nan_noise_is_rejected() {
    for sigma in [-1.0, f64::NAN] {
        let params = PrivacyParams::new(sigma, 8, 10, 100, 1e-5);
        assert!(matches!(
            compute_epsilon(&params),
            Err(MiaError::InvalidParameters { .. })
        ));
    }
}
