//! Error types for membership-inference audits.

use std::path::PathBuf;

/// Errors that can occur while partitioning data, training models, or
/// running an attack.
#[derive(Debug, thiserror::Error)]
pub enum MiaError {
    /// Feature rows and label rows disagree in count.
    #[error("shape mismatch: {features} feature rows vs {labels} labels")]
    ShapeMismatch {
        /// Number of feature rows.
        features: usize,
        /// Number of labels.
        labels: usize,
    },

    /// A requested partition or sample exceeds the rows available.
    #[error("insufficient data for {pool}: requested {requested} rows, only {available} available")]
    InsufficientData {
        /// Which pool or sample came up short.
        pool: &'static str,
        /// Rows requested.
        requested: usize,
        /// Rows available.
        available: usize,
    },

    /// The training engine failed; the run is abandoned.
    #[error("training failure: {msg}")]
    TrainingFailure {
        /// Human-readable error description.
        msg: String,
    },

    /// Invalid parameter provided.
    #[error("invalid parameter: {msg}")]
    InvalidParameters {
        /// Human-readable error description.
        msg: String,
    },

    /// Failed to read an input file.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Malformed input row.
    #[error("parse error on line {line}: {msg}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// Human-readable error description.
        msg: String,
    },
}

/// Result type for membership-inference operations.
pub type Result<T> = std::result::Result<T, MiaError>;

impl MiaError {
    /// Create an invalid parameter error.
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameters { msg: msg.into() }
    }

    /// Create a training failure.
    pub fn training<S: Into<String>>(msg: S) -> Self {
        Self::TrainingFailure { msg: msg.into() }
    }

    /// Create a parse error for a 1-based line.
    pub fn parse<S: Into<String>>(line: usize, msg: S) -> Self {
        Self::Parse {
            line,
            msg: msg.into(),
        }
    }

    /// Create an insufficient-data error for the named pool.
    pub fn insufficient(pool: &'static str, requested: usize, available: usize) -> Self {
        Self::InsufficientData {
            pool,
            requested,
            available,
        }
    }
}
