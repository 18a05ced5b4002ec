//! Mini-batch training loop for [`ConvNet`].

use rand::seq::SliceRandom;
use rand::Rng;

use mia_privacy_core::{accuracy, global_l2_norm, Dataset, Estimator, MiaError, Result};

use crate::convnet::{ConvNet, ConvNetSpec};
use crate::optimizer::OptimizerMode;

/// Training schedule and optimizer.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainConfig {
    /// Passes over the training rows.
    pub epochs: usize,
    /// Rows per optimizer step. Trailing rows that do not fill a batch are
    /// skipped for the epoch.
    pub batch_size: usize,
    /// Update rule.
    pub optimizer: OptimizerMode,
}

impl TrainConfig {
    /// Validate the schedule and optimizer together.
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(MiaError::invalid("epochs must be positive"));
        }
        if self.batch_size == 0 {
            return Err(MiaError::invalid("batch_size must be positive"));
        }
        self.optimizer.validate(self.batch_size)
    }

    /// Optimizer steps taken on `train_size` rows.
    pub fn steps(&self, train_size: usize) -> u64 {
        (self.epochs as u64) * (train_size / self.batch_size.max(1)) as u64
    }
}

/// Fit a freshly initialized network on `train`.
///
/// Each epoch shuffles the rows and walks full batches. Every batch is cut
/// into the optimizer's microbatches, each gets one backward pass of its mean
/// cross-entropy with dropout active, and `params -= learning_rate * update`
/// is applied with the optimizer's combination of those gradients. A
/// non-finite loss, gradient or parameter abandons the run.
pub fn build_and_fit<R: Rng + ?Sized>(
    spec: ConvNetSpec,
    train: &Dataset,
    valid: Option<&Dataset>,
    config: &TrainConfig,
    rng: &mut R,
) -> Result<ConvNet> {
    config.validate()?;
    if train.num_features() != spec.input_width {
        return Err(MiaError::invalid(format!(
            "network expects {} features, training data has {}",
            spec.input_width,
            train.num_features()
        )));
    }
    if train.len() < config.batch_size {
        return Err(MiaError::invalid(format!(
            "training set of {} rows cannot fill a batch of {}",
            train.len(),
            config.batch_size
        )));
    }
    if let Some(&bad) = train.labels().iter().find(|&&l| l >= spec.num_classes) {
        return Err(MiaError::invalid(format!(
            "label {bad} outside {} classes",
            spec.num_classes
        )));
    }

    let mut net = ConvNet::new(spec, rng)?;
    let lr = config.optimizer.learning_rate();
    let mut order: Vec<usize> = (0..train.len()).collect();

    for epoch in 0..config.epochs {
        order.shuffle(rng);
        let mut loss_sum = 0.0;
        let mut seen = 0usize;

        let micro = config.optimizer.microbatch_size(config.batch_size);
        for batch in order.chunks_exact(config.batch_size) {
            let mut grads = Vec::with_capacity(config.batch_size / micro);
            for rows in batch.chunks(micro) {
                let x = net.batch(train.features(), rows)?;
                let labels: Vec<usize> = rows.iter().map(|&i| train.labels()[i]).collect();
                let (loss, grad) = net.microbatch_gradient(&x, &labels, rng)?;
                if !loss.is_finite() || !global_l2_norm(&grad).is_finite() {
                    return Err(MiaError::training(format!(
                        "non-finite loss at epoch {epoch}"
                    )));
                }
                loss_sum += loss * rows.len() as f64;
                grads.push(grad);
            }
            seen += batch.len();

            let update = config.optimizer.combine(&grads, rng);
            net.apply_update(&update, -lr)?;
            if !net.params()?.is_finite() {
                return Err(MiaError::training(format!(
                    "parameters diverged at epoch {epoch}"
                )));
            }
        }

        let mean_loss = loss_sum / seen.max(1) as f64;
        match valid {
            Some(v) if !v.is_empty() => {
                let val_acc = accuracy(&net, v)?;
                tracing::debug!(epoch, loss = mean_loss, val_accuracy = val_acc, "epoch done");
            }
            _ => tracing::debug!(epoch, loss = mean_loss, "epoch done"),
        }
    }

    Ok(net)
}

/// A [`ConvNet`] recipe sized from the data it is fitted on.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvNetEstimator {
    /// Output classes.
    pub num_classes: usize,
    /// Schedule and optimizer.
    pub train: TrainConfig,
}

impl ConvNetEstimator {
    /// Estimator for `num_classes` outputs.
    pub fn new(num_classes: usize, train: TrainConfig) -> Self {
        Self { num_classes, train }
    }
}

impl Estimator for ConvNetEstimator {
    type Model = ConvNet;

    fn fit<R: Rng + ?Sized>(
        &self,
        train: &Dataset,
        valid: Option<&Dataset>,
        rng: &mut R,
    ) -> Result<ConvNet> {
        let spec = ConvNetSpec::for_input(train.num_features(), self.num_classes)?;
        build_and_fit(spec, train, valid, &self.train, rng)
    }
}
