//! Random-forest classifier used as the attack model.
//!
//! Trees are CART with Gini impurity, grown on bootstrap resamples with a
//! random feature subset considered at every node. Forest confidence is the
//! mean of per-tree leaf class frequencies.

use ndarray::{Array2, ArrayView1};
use rand::seq::index::sample;
use rand::Rng;

use mia_privacy_core::{Dataset, Estimator, MiaError, Predictor, Result, Scalar};

/// How many features each split considers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaxFeatures {
    /// Every feature.
    All,
    /// `ceil(sqrt(num_features))` features, drawn per node.
    Sqrt,
}

impl MaxFeatures {
    fn count(self, num_features: usize) -> usize {
        match self {
            MaxFeatures::All => num_features,
            MaxFeatures::Sqrt => ((num_features as f64).sqrt().ceil() as usize).clamp(1, num_features),
        }
    }
}

/// Forest hyperparameters.
#[derive(Clone, Debug, PartialEq)]
pub struct RandomForestConfig {
    /// Number of trees.
    pub n_trees: usize,
    /// Maximum depth of every tree; the root has depth 0.
    pub max_depth: usize,
    /// Nodes with fewer rows become leaves.
    pub min_samples_split: usize,
    /// Feature subset per split.
    pub max_features: MaxFeatures,
    /// Grow each tree on a bootstrap resample.
    pub bootstrap: bool,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 2,
            min_samples_split: 2,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
        }
    }
}

impl RandomForestConfig {
    /// Validate hyperparameters.
    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(MiaError::invalid("n_trees must be positive"));
        }
        if self.min_samples_split < 2 {
            return Err(MiaError::invalid("min_samples_split must be at least 2"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
enum Node {
    Leaf {
        proba: Vec<Scalar>,
    },
    Split {
        feature: usize,
        threshold: Scalar,
        left: usize,
        right: usize,
    },
}

#[derive(Clone, Debug)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn leaf_proba(&self, row: ArrayView1<'_, Scalar>) -> &[Scalar] {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { proba } => return proba,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    at = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

struct Grower<'a> {
    config: &'a RandomForestConfig,
    data: &'a Dataset,
    num_classes: usize,
    nodes: Vec<Node>,
}

impl Grower<'_> {
    fn counts(&self, rows: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes];
        for &r in rows {
            counts[self.data.labels()[r]] += 1;
        }
        counts
    }

    fn leaf(&mut self, counts: &[usize]) -> usize {
        let total = counts.iter().sum::<usize>().max(1) as Scalar;
        let proba = counts.iter().map(|&c| c as Scalar / total).collect();
        self.nodes.push(Node::Leaf { proba });
        self.nodes.len() - 1
    }

    fn grow<R: Rng + ?Sized>(&mut self, rows: &mut [usize], depth: usize, rng: &mut R) -> usize {
        let counts = self.counts(rows);
        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        if pure || depth >= self.config.max_depth || rows.len() < self.config.min_samples_split {
            return self.leaf(&counts);
        }

        let Some((feature, threshold)) = self.best_split(rows, &counts, rng) else {
            return self.leaf(&counts);
        };

        let mut mid = 0;
        for i in 0..rows.len() {
            if self.data.features()[[rows[i], feature]] <= threshold {
                rows.swap(i, mid);
                mid += 1;
            }
        }

        let id = self.nodes.len();
        self.nodes.push(Node::Split {
            feature,
            threshold,
            left: 0,
            right: 0,
        });
        let (l_rows, r_rows) = rows.split_at_mut(mid);
        let left = self.grow(l_rows, depth + 1, rng);
        let right = self.grow(r_rows, depth + 1, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn best_split<R: Rng + ?Sized>(
        &self,
        rows: &[usize],
        counts: &[usize],
        rng: &mut R,
    ) -> Option<(usize, Scalar)> {
        let num_features = self.data.num_features();
        let candidates = sample(rng, num_features, self.config.max_features.count(num_features));
        let n = rows.len() as Scalar;
        let parent = gini(counts, rows.len());

        let mut best: Option<(Scalar, usize, Scalar)> = None;
        let mut sorted = rows.to_vec();
        for feature in candidates.iter() {
            let x = |r: usize| self.data.features()[[r, feature]];
            sorted.sort_by(|&a, &b| x(a).total_cmp(&x(b)));

            let mut left = vec![0usize; self.num_classes];
            let mut right = counts.to_vec();
            for i in 0..sorted.len() - 1 {
                let label = self.data.labels()[sorted[i]];
                left[label] += 1;
                right[label] -= 1;
                let (lo, hi) = (x(sorted[i]), x(sorted[i + 1]));
                if lo == hi {
                    continue;
                }
                let n_left = i + 1;
                let n_right = sorted.len() - n_left;
                let impurity = (n_left as Scalar * gini(&left, n_left)
                    + n_right as Scalar * gini(&right, n_right))
                    / n;
                if impurity < parent && best.map_or(true, |(b, _, _)| impurity < b) {
                    best = Some((impurity, feature, lo + (hi - lo) / 2.0));
                }
            }
        }
        best.map(|(_, feature, threshold)| (feature, threshold))
    }
}

fn gini(counts: &[usize], total: usize) -> Scalar {
    if total == 0 {
        return 0.0;
    }
    let t = total as Scalar;
    1.0 - counts.iter().map(|&c| (c as Scalar / t).powi(2)).sum::<Scalar>()
}

/// A fitted random forest.
#[derive(Clone, Debug)]
pub struct RandomForest {
    trees: Vec<Tree>,
    num_features: usize,
    num_classes: usize,
}

impl RandomForest {
    /// Number of fitted trees.
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Number of classes in the confidence vectors.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl Estimator for RandomForestConfig {
    type Model = RandomForest;

    fn fit<R: Rng + ?Sized>(
        &self,
        train: &Dataset,
        _valid: Option<&Dataset>,
        rng: &mut R,
    ) -> Result<RandomForest> {
        self.validate()?;
        if train.is_empty() {
            return Err(MiaError::insufficient("attack training set", 1, 0));
        }
        if train.num_features() == 0 {
            return Err(MiaError::invalid("attack features must have at least one column"));
        }
        let num_classes = train.num_classes().max(2);
        let n = train.len();

        let mut trees = Vec::with_capacity(self.n_trees);
        for _ in 0..self.n_trees {
            let mut rows: Vec<usize> = if self.bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            let mut grower = Grower {
                config: self,
                data: train,
                num_classes,
                nodes: Vec::new(),
            };
            grower.grow(&mut rows, 0, rng);
            trees.push(Tree {
                nodes: grower.nodes,
            });
        }
        tracing::debug!(n_trees = trees.len(), rows = n, "random forest fitted");

        Ok(RandomForest {
            trees,
            num_features: train.num_features(),
            num_classes,
        })
    }
}

impl Predictor for RandomForest {
    fn predict_proba(&self, features: &Array2<Scalar>) -> Result<Array2<Scalar>> {
        if features.ncols() != self.num_features {
            return Err(MiaError::invalid(format!(
                "forest expects {} features, got {}",
                self.num_features,
                features.ncols()
            )));
        }
        let mut out = Array2::<Scalar>::zeros((features.nrows(), self.num_classes));
        let weight = 1.0 / self.trees.len() as Scalar;
        for (row, mut dst) in features.rows().into_iter().zip(out.rows_mut()) {
            for tree in &self.trees {
                for (d, &p) in dst.iter_mut().zip(tree.leaf_proba(row)) {
                    *d += weight * p;
                }
            }
        }
        Ok(out)
    }
}
