//! Error taxonomy for the analysis routines
//!
//! Batch operations (matrix sweeps, multi-pair comparisons) degrade most of
//! these to NaN or a recorded failure for the smallest unit; single-item
//! operations return them to the caller.

use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors produced by the cutoff and comparison engines
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// Not enough observations to fit a model or mixture
    #[error("insufficient data in {context}: need {required}, got {got}")]
    InsufficientData {
        context: String,
        required: usize,
        got: usize,
    },

    /// Standardization was requested on data containing missing values
    #[error("cannot standardize column '{column}': it contains missing values")]
    Standardization { column: String },

    /// The least-squares fit itself failed (singular design, collinearity)
    #[error("model fit failed: {reason}")]
    ModelFit { reason: String },

    /// A comparison names a group that was not supplied
    #[error("unknown group '{label}'")]
    UnknownGroup { label: String },

    /// A requested covariate column is absent from a group's table
    #[error("unknown covariate '{name}'")]
    UnknownCovariate { name: String },

    /// Covariates were requested but a group supplied no table
    #[error("no covariate table for group '{label}'")]
    MissingCovariateTable { label: String },

    /// Array dimensions disagree with each other
    #[error("shape mismatch in {context}: expected {expected}, got {got}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        got: usize,
    },

    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unrecognised multiple-comparisons method identifier
    #[error("unknown correction method '{0}'")]
    UnknownMethod(String),

    /// The sweep was cancelled or ran past its deadline
    #[error("analysis cancelled before completion")]
    Cancelled,
}

impl AnalysisError {
    pub(crate) fn insufficient(context: impl Into<String>, required: usize, got: usize) -> Self {
        Self::InsufficientData {
            context: context.into(),
            required,
            got,
        }
    }

    pub(crate) fn model_fit(reason: impl Into<String>) -> Self {
        Self::ModelFit {
            reason: reason.into(),
        }
    }
}
