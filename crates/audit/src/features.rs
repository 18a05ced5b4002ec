//! Attack feature rows built from a model's confidence vectors.

use ndarray::{concatenate, Array1, Axis};

use mia_privacy_core::{Dataset, MiaError, Predictor, Result, Scalar};

/// Layout of one attack feature row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AttackFeatures {
    /// The model's confidence vector.
    #[default]
    Confidence,
    /// The confidence vector followed by the sample's true class code.
    ConfidenceWithLabel,
}

impl AttackFeatures {
    /// Feature width for a model over `num_classes` classes.
    pub fn width(self, num_classes: usize) -> usize {
        match self {
            AttackFeatures::Confidence => num_classes,
            AttackFeatures::ConfidenceWithLabel => num_classes + 1,
        }
    }
}

/// Query `model` on every row of `data` and tag the rows with `member`.
pub fn attack_rows<P: Predictor + ?Sized>(
    model: &P,
    data: &Dataset,
    member: bool,
    layout: AttackFeatures,
) -> Result<Dataset> {
    let proba = model.predict_proba(data.features())?;
    if proba.nrows() != data.len() {
        return Err(MiaError::ShapeMismatch {
            features: proba.nrows(),
            labels: data.len(),
        });
    }
    let features = match layout {
        AttackFeatures::Confidence => proba,
        AttackFeatures::ConfidenceWithLabel => {
            let labels = data
                .labels()
                .mapv(|l| l as Scalar)
                .insert_axis(Axis(1));
            concatenate(Axis(1), &[proba.view(), labels.view()])
                .map_err(|e| MiaError::invalid(e.to_string()))?
        }
    };
    let labels = Array1::from_elem(data.len(), usize::from(member));
    Dataset::new(features, labels)
}

/// Evaluation rows for the attack classifier.
///
/// Both pools are cut to the shorter pool's length; `in_pool` rows are
/// labeled 1 and `out_pool` rows 0, with the members first.
pub fn prepare_attack_data<P: Predictor + ?Sized>(
    model: &P,
    in_pool: &Dataset,
    out_pool: &Dataset,
    layout: AttackFeatures,
) -> Result<Dataset> {
    if in_pool.num_features() != out_pool.num_features() {
        return Err(MiaError::invalid(format!(
            "in pool has {} columns, out pool has {}",
            in_pool.num_features(),
            out_pool.num_features()
        )));
    }
    let n = in_pool.len().min(out_pool.len());
    if n < in_pool.len().max(out_pool.len()) {
        tracing::debug!(
            in_rows = in_pool.len(),
            out_rows = out_pool.len(),
            kept = n,
            "truncating attack pools to equal length"
        );
    }
    let members = attack_rows(model, &in_pool.head(n), true, layout)?;
    let non_members = attack_rows(model, &out_pool.head(n), false, layout)?;
    Dataset::concat(&[members, non_members])
}
