//! Error types for the factorization engine

use thiserror::Error;

/// Result type alias using the crate's error
pub type Result<T> = std::result::Result<T, AlsError>;

/// Errors raised while configuring or running a factorization
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlsError {
    /// The observation matrix is empty, ragged, or does not line up with a factor matrix
    #[error("shape error: {0}")]
    Shape(String),

    /// An observation is negative or not finite
    #[error("invalid observation {value} at ({row}, {col})")]
    InvalidObservation {
        /// Row of the offending entry
        row: usize,
        /// Column of the offending entry
        col: usize,
        /// The rejected value
        value: f64,
    },

    /// A hyperparameter is outside its valid range
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// A per-vector linear solve failed
    #[error("linear solve failed for vector {index}: {reason}")]
    Numerical {
        /// Row or column whose system could not be solved
        index: usize,
        /// Solver diagnostic
        reason: String,
    },
}

impl AlsError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        AlsError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Attach the index of the vector being solved to a numerical error.
    pub(crate) fn at_index(self, index: usize) -> Self {
        match self {
            AlsError::Numerical { reason, .. } => AlsError::Numerical { index, reason },
            other => other,
        }
    }
}
