//! Attack evaluation: binary classification metrics with "member" as the
//! positive class, plus the empirical privacy bound they imply.

use std::fmt;

use ndarray::Axis;

use mia_privacy_core::{argmax, Dataset, MiaError, Predictor, Result};

/// Counts of the binary confusion matrix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConfusionCounts {
    /// Members predicted as members.
    pub true_positives: usize,
    /// Non-members predicted as members.
    pub false_positives: usize,
    /// Non-members predicted as non-members.
    pub true_negatives: usize,
    /// Members predicted as non-members.
    pub false_negatives: usize,
}

impl ConfusionCounts {
    /// Tally predictions against ground truth. Any non-zero code counts as
    /// "member".
    pub fn tally(predicted: &[usize], truth: &[usize]) -> Result<Self> {
        if predicted.len() != truth.len() {
            return Err(MiaError::ShapeMismatch {
                features: predicted.len(),
                labels: truth.len(),
            });
        }
        let mut c = Self::default();
        for (&p, &t) in predicted.iter().zip(truth) {
            match (p != 0, t != 0) {
                (true, true) => c.true_positives += 1,
                (true, false) => c.false_positives += 1,
                (false, false) => c.true_negatives += 1,
                (false, true) => c.false_negatives += 1,
            }
        }
        Ok(c)
    }

    /// Total rows tallied.
    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }
}

/// Attack quality on one evaluation table.
#[derive(Clone, Debug, PartialEq)]
pub struct AttackMetrics {
    /// Raw rate of `predicted == truth`.
    pub agreement: f64,
    /// Binary accuracy.
    pub accuracy: f64,
    /// Precision for the member class.
    pub precision: f64,
    /// Recall for the member class.
    pub recall: f64,
    /// Harmonic mean of precision and recall.
    pub f1: f64,
    /// Confusion matrix.
    pub counts: ConfusionCounts,
    /// True positive rate.
    pub tpr: f64,
    /// False positive rate.
    pub fpr: f64,
    /// Empirical epsilon lower bound implied by (TPR, FPR).
    pub epsilon_lower: f64,
    /// ROC AUC of the membership scores, when scores were available.
    pub auc: Option<f64>,
}

impl AttackMetrics {
    /// Metrics from hard predictions.
    pub fn from_predictions(predicted: &[usize], truth: &[usize]) -> Result<Self> {
        let counts = ConfusionCounts::tally(predicted, truth)?;
        let agreement = if predicted.is_empty() {
            0.0
        } else {
            predicted.iter().zip(truth).filter(|(p, t)| p == t).count() as f64
                / predicted.len() as f64
        };
        let accuracy = ratio(
            counts.true_positives + counts.true_negatives,
            counts.total(),
            "accuracy",
        );
        let precision = ratio(
            counts.true_positives,
            counts.true_positives + counts.false_positives,
            "precision",
        );
        let recall = ratio(
            counts.true_positives,
            counts.true_positives + counts.false_negatives,
            "recall",
        );
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        let tpr = recall;
        let fpr = ratio(
            counts.false_positives,
            counts.false_positives + counts.true_negatives,
            "false positive rate",
        );
        Ok(Self {
            agreement,
            accuracy,
            precision,
            recall,
            f1,
            counts,
            tpr,
            fpr,
            epsilon_lower: epsilon_lower_bound(tpr, fpr),
            auc: None,
        })
    }

    /// Attach ROC AUC from per-row membership scores (higher means "member").
    pub fn with_scores(mut self, scores: &[f64], truth: &[usize]) -> Result<Self> {
        if scores.len() != truth.len() {
            return Err(MiaError::ShapeMismatch {
                features: scores.len(),
                labels: truth.len(),
            });
        }
        let (members, non_members): (Vec<_>, Vec<_>) =
            scores.iter().zip(truth).partition(|&(_, &t)| t != 0);
        let members: Vec<f64> = members.into_iter().map(|(&s, _)| s).collect();
        let non_members: Vec<f64> = non_members.into_iter().map(|(&s, _)| s).collect();
        self.auc = Some(roc_auc(&members, &non_members));
        Ok(self)
    }

    /// Query a fitted attack model on a labeled evaluation table.
    pub fn evaluate<P: Predictor + ?Sized>(attack: &P, data: &Dataset) -> Result<Self> {
        let proba = attack.predict_proba(data.features())?;
        let predicted: Vec<usize> = proba.axis_iter(Axis(0)).map(argmax).collect();
        let truth = data.labels().to_vec();
        let metrics = Self::from_predictions(&predicted, &truth)?;
        if proba.len_of(Axis(1)) < 2 {
            return Ok(metrics);
        }
        let scores = proba.column(1).to_vec();
        metrics.with_scores(&scores, &truth)
    }
}

impl fmt::Display for AttackMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accuracy={:.4} precision={:.4} recall={:.4} f1={:.4} eps_lower={:.4}",
            self.accuracy, self.precision, self.recall, self.f1, self.epsilon_lower
        )?;
        if let Some(auc) = self.auc {
            write!(f, " auc={auc:.4}")?;
        }
        Ok(())
    }
}

fn ratio(num: usize, den: usize, what: &str) -> f64 {
    if den == 0 {
        tracing::warn!(metric = what, "zero denominator; reporting 0");
        return 0.0;
    }
    num as f64 / den as f64
}

/// Epsilon lower bound from a single (TPR, FPR) operating point:
/// `max(ln(TPR/FPR), ln((1-FPR)/(1-TPR)), 0)`.
pub fn epsilon_lower_bound(tpr: f64, fpr: f64) -> f64 {
    fn log_ratio(num: f64, den: f64) -> f64 {
        match (num > 0.0, den > 0.0) {
            (true, true) => (num / den).ln(),
            (true, false) => f64::INFINITY,
            (false, _) => 0.0,
        }
    }
    let eps1 = log_ratio(tpr, fpr);
    let eps2 = log_ratio(1.0 - fpr, 1.0 - tpr);
    eps1.max(eps2).max(0.0)
}

/// Probability that a random member outscores a random non-member, ties
/// counting half. Returns 0.5 when either side is empty.
pub fn roc_auc(member_scores: &[f64], non_member_scores: &[f64]) -> f64 {
    if member_scores.is_empty() || non_member_scores.is_empty() {
        return 0.5;
    }
    let mut u = 0.0;
    for &m in member_scores {
        for &n in non_member_scores {
            if m > n {
                u += 1.0;
            } else if m == n {
                u += 0.5;
            }
        }
    }
    u / (member_scores.len() * non_member_scores.len()) as f64
}
