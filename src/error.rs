//! Error types for the PCA pipeline.

use thiserror::Error;

/// Errors raised by the PCA pipeline.
///
/// Every error is raised by the stage that detects it and is never retried
/// internally; the only recovery path is the opt-in `fallback_to_exact`
/// setting on [`crate::PcaConfig`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PcaError {
    /// The dataset is empty, malformed, contains non-finite values, or does
    /// not match the shape expected by a fitted component set.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A retention knob or tuning parameter is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An eigen-solver, QR or SVD routine failed.
    #[error("Numerical failure: {0}")]
    NumericalFailure(String),
}

/// Result type alias for PCA operations.
pub type Result<T> = std::result::Result<T, PcaError>;

impl PcaError {
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    #[must_use]
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    #[must_use]
    pub fn numerical_failure(msg: impl Into<String>) -> Self {
        Self::NumericalFailure(msg.into())
    }

    /// Returns true for errors coming out of the numerical kernels.
    #[must_use]
    pub const fn is_numerical_failure(&self) -> bool {
        matches!(self, Self::NumericalFailure(_))
    }
}
