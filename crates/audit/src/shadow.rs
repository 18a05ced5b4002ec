//! Shadow-model ensemble that labels confidence vectors by membership.

use rand::Rng;

use mia_privacy_core::{sample_disjoint, Dataset, Estimator, MiaError, Result};

use crate::features::{attack_rows, AttackFeatures};

/// Trains `num_models` shadow models and turns their outputs into attack
/// training rows.
///
/// Every shadow model draws `2 * shadow_dataset_size` distinct rows: the first
/// half trains the model and is labeled 1, the second half is never seen and
/// is labeled 0. Draws are independent across models.
#[derive(Clone, Debug)]
pub struct ShadowModelBundle<E> {
    estimator: E,
    shadow_dataset_size: usize,
    num_models: usize,
    layout: AttackFeatures,
}

impl<E: Estimator> ShadowModelBundle<E> {
    /// A bundle fitting `num_models` copies of `estimator`.
    pub fn new(estimator: E, shadow_dataset_size: usize, num_models: usize) -> Self {
        Self {
            estimator,
            shadow_dataset_size,
            num_models,
            layout: AttackFeatures::default(),
        }
    }

    /// Choose the attack feature layout.
    pub fn with_features(mut self, layout: AttackFeatures) -> Self {
        self.layout = layout;
        self
    }

    /// Rows each shadow model trains on.
    pub fn shadow_dataset_size(&self) -> usize {
        self.shadow_dataset_size
    }

    /// Number of shadow models.
    pub fn num_models(&self) -> usize {
        self.num_models
    }

    /// Fit every shadow model on `data` and return the concatenated attack
    /// table. Fails on the first model that fails; no partial table is
    /// returned.
    pub fn fit_transform<R: Rng + ?Sized>(&self, data: &Dataset, rng: &mut R) -> Result<Dataset> {
        if self.num_models == 0 {
            return Err(MiaError::invalid("num_models must be positive"));
        }
        if self.shadow_dataset_size == 0 {
            return Err(MiaError::invalid("shadow_dataset_size must be positive"));
        }
        let per_model = 2 * self.shadow_dataset_size;
        if per_model > data.len() {
            return Err(MiaError::insufficient("shadow sample", per_model, data.len()));
        }

        let mut parts = Vec::with_capacity(2 * self.num_models);
        for model_idx in 0..self.num_models {
            let groups = sample_disjoint(
                data.len(),
                &[self.shadow_dataset_size, self.shadow_dataset_size],
                rng,
            )?;
            let shadow_in = data.select(&groups[0]);
            let shadow_out = data.select(&groups[1]);

            let model = self.estimator.fit(&shadow_in, None, rng)?;
            parts.push(attack_rows(&model, &shadow_in, true, self.layout)?);
            parts.push(attack_rows(&model, &shadow_out, false, self.layout)?);
            tracing::debug!(model = model_idx, rows = per_model, "shadow model fitted");
        }

        let table = Dataset::concat(&parts)?;
        tracing::info!(
            models = self.num_models,
            rows = table.len(),
            "shadow attack table built"
        );
        Ok(table)
    }
}
