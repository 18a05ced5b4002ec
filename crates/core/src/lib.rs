//! Core building blocks for membership-inference audits.
//!
//! This crate provides the error taxonomy, in-memory datasets, batch-aligned
//! partitioning, the estimator seams shared by target, shadow, and attack
//! models, and the clipping/noise primitives used by DP-SGD.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clipping;
pub mod dataset;
pub mod error;
pub mod estimator;
pub mod noise;
pub mod partition;
pub mod tensor;

pub use clipping::{accumulate, clip_tree, global_l2_norm, scale_tree, ClipReport, ParamTree};
pub use dataset::Dataset;
pub use error::{MiaError, Result};
pub use estimator::{accuracy, Estimator, Predictor};
pub use noise::{add_gaussian_noise_tree, GaussianMechanism};
pub use partition::{
    partition_sizes, permutation_split, sample_disjoint, split_to_be_divisible, PartitionIndices,
    Split,
};
pub use tensor::{argmax, l2_norm, Scalar};

/// Common imports for downstream users.
pub mod prelude {
    pub use crate::{
        accumulate, accuracy, add_gaussian_noise_tree, argmax, clip_tree, global_l2_norm,
        partition_sizes, permutation_split, sample_disjoint, scale_tree, split_to_be_divisible,
        ClipReport, Dataset, Estimator, GaussianMechanism, MiaError, ParamTree, PartitionIndices,
        Predictor, Result, Scalar, Split,
    };
}
