//! One-dimensional convolutional classifier over tabular rows.
//!
//! Each feature row is read as a sequence of length `input_width` with one
//! channel. Layers: conv → relu → conv → relu → dropout → max-pool →
//! flatten → dense relu → dense softmax. The forward pass runs on candle and
//! gradients come from its autograd; parameters and gradients cross into
//! ndarray as [`ConvNetParams`] so the clipping and noise helpers in
//! `mia_privacy_core` apply to them unchanged.

use candle_core::{DType, Device, Tensor, Var, D};
use candle_nn::{Conv1d, Linear, Module, VarBuilder, VarMap};
use ndarray::{Array2, ArrayD, ArrayViewD, ArrayViewMutD, IxDyn};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use mia_privacy_core::{MiaError, ParamTree, Predictor, Result, Scalar};

/// Layer shapes of the network.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvNetSpec {
    /// Sequence length (number of feature columns).
    pub input_width: usize,
    /// Filters in each convolution.
    pub filters: usize,
    /// Convolution kernel size.
    pub kernel_size: usize,
    /// Dropout rate applied after the second convolution during training.
    pub dropout: f64,
    /// Max-pooling window (and stride).
    pub pool_size: usize,
    /// Width of the hidden dense layer.
    pub hidden: usize,
    /// Size of the softmax output.
    pub num_classes: usize,
}

impl ConvNetSpec {
    /// The reference architecture for rows of `input_width` features.
    pub fn for_input(input_width: usize, num_classes: usize) -> Result<Self> {
        let spec = Self {
            input_width,
            filters: 64,
            kernel_size: 3,
            dropout: 0.5,
            pool_size: 2,
            hidden: 100,
            num_classes,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Check that every layer has a non-empty output.
    pub fn validate(&self) -> Result<()> {
        if self.kernel_size == 0 || self.filters == 0 || self.pool_size == 0 || self.hidden == 0 {
            return Err(MiaError::invalid("layer sizes must be positive"));
        }
        if self.num_classes < 2 {
            return Err(MiaError::invalid("num_classes must be at least 2"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(MiaError::invalid("dropout must be in [0, 1)"));
        }
        if self.pooled_len() == 0 {
            return Err(MiaError::invalid(format!(
                "input width {} too small for two kernels of {} and pooling of {}",
                self.input_width, self.kernel_size, self.pool_size
            )));
        }
        Ok(())
    }

    fn conv1_len(&self) -> usize {
        (self.input_width + 1).saturating_sub(self.kernel_size)
    }

    fn conv2_len(&self) -> usize {
        (self.conv1_len() + 1).saturating_sub(self.kernel_size)
    }

    fn pooled_len(&self) -> usize {
        self.conv2_len() / self.pool_size
    }

    fn flat_len(&self) -> usize {
        self.pooled_len() * self.filters
    }
}

/// Host-side copy of every trainable tensor, in parameter-name order.
///
/// Used both for parameter snapshots and for gradients.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvNetParams {
    leaves: Vec<ArrayD<Scalar>>,
}

impl ConvNetParams {
    /// All-zero tensors of the same shapes.
    pub fn zeros_like(&self) -> Self {
        Self {
            leaves: self
                .leaves
                .iter()
                .map(|l| ArrayD::zeros(l.raw_dim()))
                .collect(),
        }
    }

    /// Total number of scalars.
    pub fn num_params(&self) -> usize {
        self.leaves.iter().map(|l| l.len()).sum()
    }

    /// Whether every scalar is finite.
    pub fn is_finite(&self) -> bool {
        self.leaves.iter().all(|l| l.iter().all(|v| v.is_finite()))
    }
}

impl ParamTree for ConvNetParams {
    fn leaves(&self) -> Vec<ArrayViewD<'_, Scalar>> {
        self.leaves.iter().map(|l| l.view()).collect()
    }

    fn leaves_mut(&mut self) -> Vec<ArrayViewMutD<'_, Scalar>> {
        self.leaves.iter_mut().map(|l| l.view_mut()).collect()
    }
}

/// Candle failures surface as training failures; the run is abandoned.
fn engine(err: candle_core::Error) -> MiaError {
    MiaError::training(err.to_string())
}

fn to_host(t: &Tensor) -> Result<ArrayD<Scalar>> {
    let values = t
        .flatten_all()
        .and_then(|flat| flat.to_vec1::<Scalar>())
        .map_err(engine)?;
    ArrayD::from_shape_vec(IxDyn(t.dims()), values).map_err(|e| MiaError::training(e.to_string()))
}

/// A fitted (or freshly initialized) network.
#[derive(Debug)]
pub struct ConvNet {
    spec: ConvNetSpec,
    device: Device,
    conv1: Conv1d,
    conv2: Conv1d,
    dense1: Linear,
    dense2: Linear,
    /// Trainable variables sorted by name, shared with the layers above.
    vars: Vec<(String, Var)>,
}

impl ConvNet {
    /// A network with Glorot-uniform kernels and zero biases drawn from `rng`.
    pub fn new<R: Rng + ?Sized>(spec: ConvNetSpec, rng: &mut R) -> Result<Self> {
        spec.validate()?;
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F64, &device);
        let (f, k) = (spec.filters, spec.kernel_size);

        let conv1 = candle_nn::conv1d(1, f, k, Default::default(), vb.pp("conv1")).map_err(engine)?;
        let conv2 = candle_nn::conv1d(f, f, k, Default::default(), vb.pp("conv2")).map_err(engine)?;
        let dense1 = candle_nn::linear(spec.flat_len(), spec.hidden, vb.pp("dense1")).map_err(engine)?;
        let dense2 =
            candle_nn::linear(spec.hidden, spec.num_classes, vb.pp("dense2")).map_err(engine)?;

        let mut vars: Vec<(String, Var)> = varmap
            .data()
            .lock()
            .map_err(|_| MiaError::training("parameter map lock poisoned"))?
            .iter()
            .map(|(name, var)| (name.clone(), var.clone()))
            .collect();
        vars.sort_by(|a, b| a.0.cmp(&b.0));

        let net = Self {
            spec,
            device,
            conv1,
            conv2,
            dense1,
            dense2,
            vars,
        };
        net.initialize(rng)?;
        Ok(net)
    }

    /// Overwrite the framework's default init so weights depend only on `rng`.
    fn initialize<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<()> {
        for (name, var) in &self.vars {
            let dims = var.dims().to_vec();
            let values: Vec<Scalar> = if name.ends_with("bias") {
                vec![0.0; dims.iter().product()]
            } else {
                // Conv kernels are (out, in, k); dense kernels are (out, in).
                let receptive: usize = dims.iter().skip(2).product();
                let fans = (dims[0] + dims[1]) * receptive;
                let limit = (6.0 / fans as f64).sqrt();
                let dist = Uniform::new_inclusive(-limit, limit);
                (0..dims.iter().product::<usize>())
                    .map(|_| dist.sample(rng))
                    .collect()
            };
            let init = Tensor::from_vec(values, dims.as_slice(), &self.device).map_err(engine)?;
            var.set(&init).map_err(engine)?;
        }
        Ok(())
    }

    /// Layer shapes.
    pub fn spec(&self) -> &ConvNetSpec {
        &self.spec
    }

    /// Snapshot of the current parameters.
    pub fn params(&self) -> Result<ConvNetParams> {
        let leaves = self
            .vars
            .iter()
            .map(|(_, var)| to_host(var.as_tensor()))
            .collect::<Result<_>>()?;
        Ok(ConvNetParams { leaves })
    }

    /// `params += weight * delta`, leaf by leaf.
    pub(crate) fn apply_update(&mut self, delta: &ConvNetParams, weight: f64) -> Result<()> {
        if delta.leaves.len() != self.vars.len() {
            return Err(MiaError::training("update does not match the parameter layout"));
        }
        for ((_, var), leaf) in self.vars.iter().zip(&delta.leaves) {
            let step = Tensor::from_iter(leaf.iter().copied(), &self.device)
                .and_then(|t| t.reshape(var.dims()))
                .and_then(|t| t.affine(weight, 0.0))
                .and_then(|t| var.as_tensor().add(&t))
                .map_err(engine)?;
            var.set(&step).map_err(engine)?;
        }
        Ok(())
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.spec.input_width {
            return Err(MiaError::invalid(format!(
                "expected {} feature columns, got {width}",
                self.spec.input_width
            )));
        }
        Ok(())
    }

    /// Rows of `features` picked by `rows`, as a `(rows, width)` tensor.
    pub(crate) fn batch(&self, features: &Array2<Scalar>, rows: &[usize]) -> Result<Tensor> {
        self.check_width(features.ncols())?;
        let values = rows.iter().flat_map(|&i| features.row(i).to_vec());
        Tensor::from_iter(values, &self.device)
            .and_then(|t| t.reshape((rows.len(), self.spec.input_width)))
            .map_err(engine)
    }

    /// Inverted-dropout mask for the second convolution's output.
    fn dropout_mask<R: Rng + ?Sized>(&self, rows: usize, rng: &mut R) -> Result<Option<Tensor>> {
        if self.spec.dropout <= 0.0 {
            return Ok(None);
        }
        let keep = 1.0 - self.spec.dropout;
        let len = rows * self.spec.filters * self.spec.conv2_len();
        let values: Vec<Scalar> = (0..len)
            .map(|_| if rng.gen_bool(keep) { 1.0 / keep } else { 0.0 })
            .collect();
        Tensor::from_vec(
            values,
            (rows, self.spec.filters, self.spec.conv2_len()),
            &self.device,
        )
        .map(Some)
        .map_err(engine)
    }

    /// Logits for a `(rows, width)` batch. A dropout mask switches on
    /// training mode.
    fn logits(&self, x: &Tensor, mask: Option<&Tensor>) -> candle_core::Result<Tensor> {
        let spec = &self.spec;
        let rows = x.dim(0)?;
        let h = self.conv1.forward(&x.unsqueeze(1)?)?.relu()?;
        let mut h = self.conv2.forward(&h)?.relu()?;
        if let Some(mask) = mask {
            h = h.mul(mask)?;
        }
        let pooled = h
            .narrow(2, 0, spec.pooled_len() * spec.pool_size)?
            .reshape((rows, spec.filters, spec.pooled_len(), spec.pool_size))?
            .max(D::Minus1)?
            .flatten_from(1)?;
        let hidden = self.dense1.forward(&pooled)?.relu()?;
        self.dense2.forward(&hidden)
    }

    /// Mean cross-entropy of one microbatch and its gradient, dropout active.
    pub(crate) fn microbatch_gradient<R: Rng + ?Sized>(
        &self,
        x: &Tensor,
        labels: &[usize],
        rng: &mut R,
    ) -> Result<(f64, ConvNetParams)> {
        let mask = self.dropout_mask(labels.len(), rng)?;
        let targets = Tensor::from_iter(labels.iter().map(|&l| l as u32), &self.device)
            .map_err(engine)?;
        let loss = self
            .logits(x, mask.as_ref())
            .and_then(|logits| candle_nn::loss::cross_entropy(&logits, &targets))
            .map_err(engine)?;
        let value = loss.to_scalar::<Scalar>().map_err(engine)?;
        let grads = loss.backward().map_err(engine)?;

        let mut leaves = Vec::with_capacity(self.vars.len());
        for (name, var) in &self.vars {
            match grads.get(var.as_tensor()) {
                Some(g) => leaves.push(to_host(g)?),
                None => {
                    tracing::trace!(param = %name, "no gradient reached parameter");
                    leaves.push(ArrayD::zeros(IxDyn(var.dims())));
                }
            }
        }
        Ok((value, ConvNetParams { leaves }))
    }
}

impl Predictor for ConvNet {
    fn predict_proba(&self, features: &Array2<Scalar>) -> Result<Array2<Scalar>> {
        self.check_width(features.ncols())?;
        let n = features.nrows();
        if n == 0 {
            return Ok(Array2::zeros((0, self.spec.num_classes)));
        }
        let rows: Vec<usize> = (0..n).collect();
        let x = self.batch(features, &rows)?;
        let proba = self
            .logits(&x, None)
            .and_then(|logits| candle_nn::ops::softmax(&logits, D::Minus1))
            .and_then(|p| p.flatten_all())
            .and_then(|p| p.to_vec1::<Scalar>())
            .map_err(engine)?;
        Array2::from_shape_vec((n, self.spec.num_classes), proba)
            .map_err(|e| MiaError::training(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mia_privacy_core::global_l2_norm;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn small_spec() -> ConvNetSpec {
        ConvNetSpec {
            input_width: 8,
            filters: 3,
            kernel_size: 3,
            dropout: 0.0,
            pool_size: 2,
            hidden: 4,
            num_classes: 2,
        }
    }

    #[test]
    fn reference_shapes_for_fourteen_columns() {
        let spec = ConvNetSpec::for_input(14, 2).expect("spec");
        assert_eq!(spec.conv1_len(), 12);
        assert_eq!(spec.conv2_len(), 10);
        assert_eq!(spec.pooled_len(), 5);
        assert_eq!(spec.flat_len(), 320);

        let net = ConvNet::new(spec, &mut ChaCha8Rng::seed_from_u64(0)).expect("net");
        let params = net.params().expect("params");
        assert_eq!(params.num_params(), 256 + 12_352 + 32_100 + 202);
    }

    #[test]
    fn rejects_narrow_inputs() {
        assert!(ConvNetSpec::for_input(5, 2).is_err());
        assert!(ConvNetSpec::for_input(6, 2).is_ok());
        assert!(ConvNetSpec::for_input(14, 1).is_err());
    }

    #[test]
    fn init_depends_only_on_the_seed() {
        let a = ConvNet::new(small_spec(), &mut ChaCha8Rng::seed_from_u64(4)).expect("net");
        let b = ConvNet::new(small_spec(), &mut ChaCha8Rng::seed_from_u64(4)).expect("net");
        let c = ConvNet::new(small_spec(), &mut ChaCha8Rng::seed_from_u64(5)).expect("net");
        assert_eq!(a.params().expect("a"), b.params().expect("b"));
        assert_ne!(a.params().expect("a"), c.params().expect("c"));
    }

    #[test]
    fn probabilities_sum_to_one() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let net = ConvNet::new(small_spec(), &mut rng).expect("net");
        let x = Array2::from_shape_fn((3, 8), |(i, j)| (i as f64 - j as f64) / 4.0);
        let proba = net.predict_proba(&x).expect("proba");
        assert_eq!(proba.dim(), (3, 2));
        for row in proba.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }
        assert_eq!(net.predict_proba(&Array2::zeros((0, 8))).expect("empty").nrows(), 0);
    }

    #[test]
    fn wrong_width_is_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let net = ConvNet::new(small_spec(), &mut rng).expect("net");
        assert!(net.predict_proba(&Array2::zeros((1, 7))).is_err());
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut net = ConvNet::new(small_spec(), &mut rng).expect("net");
        let features = array![[0.5, -1.0, 0.3, 0.8, -0.2, 1.2, 0.0, -0.7]];
        let x = net.batch(&features, &[0]).expect("batch");
        let labels = [1];

        let (_, grad) = net.microbatch_gradient(&x, &labels, &mut rng).expect("grad");
        assert!(global_l2_norm(&grad) > 0.0);

        let h = 1e-6;
        let mut loss_at = |net: &ConvNet| net.microbatch_gradient(&x, &labels, &mut rng).expect("loss").0;

        // Probe a handful of coordinates in every leaf.
        for leaf in 0..grad.leaves.len() {
            for idx in [0, grad.leaves[leaf].len() / 2] {
                let mut bump = grad.zeros_like();
                bump.leaves[leaf].as_slice_mut().expect("contiguous")[idx] = h;

                net.apply_update(&bump, 1.0).expect("up");
                let up = loss_at(&net);
                net.apply_update(&bump, -2.0).expect("down");
                let down = loss_at(&net);
                net.apply_update(&bump, 1.0).expect("restore");

                let analytic = grad.leaves[leaf].as_slice().expect("contiguous")[idx];
                assert_relative_eq!(analytic, (up - down) / (2.0 * h), epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn update_moves_parameters() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut net = ConvNet::new(small_spec(), &mut rng).expect("net");
        let before = net.params().expect("before");
        let mut ones = before.zeros_like();
        for mut leaf in ones.leaves_mut() {
            leaf.fill(1.0);
        }
        net.apply_update(&ones, 0.5).expect("update");
        let after = net.params().expect("after");
        for (b, a) in before.leaves.iter().zip(&after.leaves) {
            assert!(b.iter().zip(a.iter()).all(|(x, y)| (y - x - 0.5).abs() < 1e-12));
        }
    }
}
