//! What-if budget planning: epsilon across noise levels, and the noise
//! needed for a target epsilon.

use mia_privacy::{
    calibrate_noise_multiplier, compute_epsilon, steps_for_epochs, PrivacyParams,
};

fn main() -> mia_privacy::Result<()> {
    let (n, batch, epochs, delta) = (50_000, 8, 10, 1e-5);
    let steps = steps_for_epochs(epochs, n, batch);

    for noise in [0.0, 0.6, 1.0, 1.4, 2.0] {
        let budget = compute_epsilon(&PrivacyParams::new(noise, batch, steps, n, delta))?;
        println!("noise {noise:>4}: {budget}");
    }

    let base = PrivacyParams::new(1.0, batch, steps, n, delta);
    let sigma = calibrate_noise_multiplier(1.0, &base, 5.0, 1e-3)?;
    println!("noise for eps <= 1.0: {sigma:.3}");
    Ok(())
}
