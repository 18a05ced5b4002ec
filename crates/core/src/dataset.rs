//! Labeled tabular data held in memory.

use ndarray::{Array1, Array2, Axis, Slice};

use crate::error::{MiaError, Result};
use crate::tensor::Scalar;

/// Feature rows paired with integer class codes.
///
/// Row `i` of `features` is labeled by `labels[i]`; the constructor rejects
/// tables where the two disagree in length.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    features: Array2<Scalar>,
    labels: Array1<usize>,
}

impl Dataset {
    /// Pair a feature matrix with its labels.
    pub fn new(features: Array2<Scalar>, labels: Array1<usize>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(MiaError::ShapeMismatch {
                features: features.nrows(),
                labels: labels.len(),
            });
        }
        Ok(Self { features, labels })
    }

    /// An empty dataset with `num_features` columns.
    pub fn empty(num_features: usize) -> Self {
        Self {
            features: Array2::zeros((0, num_features)),
            labels: Array1::zeros(0),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of feature columns.
    pub fn num_features(&self) -> usize {
        self.features.ncols()
    }

    /// Number of classes implied by the largest label code.
    pub fn num_classes(&self) -> usize {
        self.labels.iter().copied().max().map_or(0, |m| m + 1)
    }

    /// Feature matrix.
    pub fn features(&self) -> &Array2<Scalar> {
        &self.features
    }

    /// Label column.
    pub fn labels(&self) -> &Array1<usize> {
        &self.labels
    }

    /// Gather the given rows, in order.
    ///
    /// # Panics
    ///
    /// Panics if any index is out of bounds.
    pub fn select(&self, indices: &[usize]) -> Self {
        let features = self.features.select(Axis(0), indices);
        let labels = indices.iter().map(|&i| self.labels[i]).collect();
        Self { features, labels }
    }

    /// The first `n` rows (or all rows if fewer).
    pub fn head(&self, n: usize) -> Self {
        let n = n.min(self.len());
        Self {
            features: self.features.slice_axis(Axis(0), Slice::from(..n)).to_owned(),
            labels: self.labels.slice_axis(Axis(0), Slice::from(..n)).to_owned(),
        }
    }

    /// Row counts per class code.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_classes()];
        for &l in &self.labels {
            counts[l] += 1;
        }
        counts
    }

    /// Stack datasets row-wise, in order.
    pub fn concat(parts: &[Dataset]) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Err(MiaError::invalid("cannot concatenate zero datasets"));
        };
        let width = first.num_features();
        if let Some(bad) = parts.iter().find(|p| p.num_features() != width) {
            return Err(MiaError::invalid(format!(
                "cannot stack {} feature columns onto {width}",
                bad.num_features()
            )));
        }
        let features: Vec<_> = parts.iter().map(|p| p.features.view()).collect();
        let labels: Vec<_> = parts.iter().map(|p| p.labels.view()).collect();
        let features = ndarray::concatenate(Axis(0), &features)
            .map_err(|e| MiaError::invalid(e.to_string()))?;
        let labels = ndarray::concatenate(Axis(0), &labels)
            .map_err(|e| MiaError::invalid(e.to_string()))?;
        Self::new(features, labels)
    }

    /// Z-score every column in place. Constant columns become zero.
    pub fn standardize(&mut self) {
        if self.is_empty() {
            return;
        }
        for mut col in self.features.columns_mut() {
            let n = col.len() as f64;
            let mean = col.sum() / n;
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            if std > 0.0 && std.is_finite() {
                col.mapv_inplace(|v| (v - mean) / std);
            } else {
                col.fill(0.0);
            }
        }
    }
}
