//! Learning engine for membership-inference audits.
//!
//! Target and shadow models are small 1-D convolutional networks on candle, trained
//! with plain SGD or DP-SGD. The attack model is a random forest over
//! confidence vectors. Both plug into the pipeline through
//! [`mia_privacy_core::Estimator`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod convnet;
pub mod forest;
pub mod optimizer;
pub mod trainer;

pub use convnet::{ConvNet, ConvNetParams, ConvNetSpec};
pub use forest::{MaxFeatures, RandomForest, RandomForestConfig};
pub use optimizer::OptimizerMode;
pub use trainer::{build_and_fit, ConvNetEstimator, TrainConfig};

/// Common imports for downstream users.
pub mod prelude {
    pub use crate::{
        build_and_fit, ConvNet, ConvNetEstimator, ConvNetParams, ConvNetSpec, MaxFeatures,
        OptimizerMode, RandomForest, RandomForestConfig, TrainConfig,
    };
}
