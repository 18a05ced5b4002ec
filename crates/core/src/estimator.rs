//! Seams between the audit pipeline and the learning engine.
//!
//! Target, shadow, and attack models are all reached through these two
//! traits: an [`Estimator`] is a recipe that fits a fresh model, and the
//! fitted [`Predictor`] is only ever queried afterwards.

use ndarray::{Array1, Array2, Axis};
use rand::Rng;

use crate::dataset::Dataset;
use crate::error::Result;
use crate::tensor::{argmax, Scalar};

/// A fitted classifier.
pub trait Predictor {
    /// Per-row confidence vectors over the class space.
    fn predict_proba(&self, features: &Array2<Scalar>) -> Result<Array2<Scalar>>;

    /// Per-row predicted class codes.
    fn predict(&self, features: &Array2<Scalar>) -> Result<Array1<usize>> {
        let proba = self.predict_proba(features)?;
        Ok(proba.axis_iter(Axis(0)).map(argmax).collect())
    }
}

/// A model recipe that produces a freshly initialized, fitted [`Predictor`].
pub trait Estimator {
    /// The fitted model type.
    type Model: Predictor;

    /// Fit a new model on `train`, optionally reporting on `valid`.
    fn fit<R: Rng + ?Sized>(
        &self,
        train: &Dataset,
        valid: Option<&Dataset>,
        rng: &mut R,
    ) -> Result<Self::Model>;
}

/// Fraction of rows whose predicted class matches the label.
pub fn accuracy<P: Predictor + ?Sized>(model: &P, data: &Dataset) -> Result<f64> {
    if data.is_empty() {
        return Ok(0.0);
    }
    let predicted = model.predict(data.features())?;
    let hits = predicted
        .iter()
        .zip(data.labels().iter())
        .filter(|(p, l)| p == l)
        .count();
    Ok(hits as f64 / data.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    struct FirstColumn;

    impl Predictor for FirstColumn {
        fn predict_proba(&self, features: &Array2<Scalar>) -> Result<Array2<Scalar>> {
            let mut out = Array2::zeros((features.nrows(), 2));
            for (i, row) in features.rows().into_iter().enumerate() {
                let p = row[0].clamp(0.0, 1.0);
                out[[i, 0]] = 1.0 - p;
                out[[i, 1]] = p;
            }
            Ok(out)
        }
    }

    #[test]
    fn predict_takes_argmax() {
        let preds = FirstColumn
            .predict(&array![[0.9], [0.1], [0.6]])
            .expect("predict");
        assert_eq!(preds, array![1, 0, 1]);
    }

    #[test]
    fn accuracy_counts_matches() {
        let data = Dataset::new(array![[0.9], [0.1], [0.6], [0.2]], array![1, 0, 0, 1])
            .expect("dataset");
        let acc = accuracy(&FirstColumn, &data).expect("accuracy");
        assert!((acc - 0.5).abs() < 1e-12);
    }
}
