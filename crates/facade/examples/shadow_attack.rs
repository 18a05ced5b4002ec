//! Attack a DP-SGD model and an unprotected one on the same synthetic table.

use mia_privacy::{run_experiment, synthetic_dataset, ExperimentConfig};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn main() -> mia_privacy::Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let data = synthetic_dataset(1500, 14, &mut rng)?;

    for dpsgd in [true, false] {
        let config = ExperimentConfig {
            dpsgd,
            epochs: 3,
            ..ExperimentConfig::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let report = run_experiment(&config, &data, &mut rng)?;
        println!(
            "dpsgd={dpsgd}: target train/valid acc {:.3}/{:.3}",
            report.target_train_accuracy, report.target_valid_accuracy
        );
        println!("  {}", report.attack);
        println!("  {}", report.budget);
    }
    Ok(())
}
