//! `mia-audit [DATA_PATH]`: run the default audit on the adult table, or on
//! a synthetic table when no path is given.

use anyhow::Context;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use mia_privacy::{load_adult, run_experiment, synthetic_dataset, ExperimentConfig};

const SYNTHETIC_ROWS: usize = 2000;
const SYNTHETIC_FEATURES: usize = 14;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ExperimentConfig::default();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let dataset = match std::env::args_os().nth(1) {
        Some(path) => load_adult(&path)
            .with_context(|| format!("loading {}", path.to_string_lossy()))?,
        None => {
            tracing::info!(rows = SYNTHETIC_ROWS, "no data path given; using a synthetic table");
            synthetic_dataset(SYNTHETIC_ROWS, SYNTHETIC_FEATURES, &mut rng)?
        }
    };

    let report = run_experiment(&config, &dataset, &mut rng).context("audit run failed")?;
    println!("{report}");
    Ok(())
}
