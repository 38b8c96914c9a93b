use crate::error::{PcaError, Result};
use crate::selection::RetentionCriterion;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Seed used by the approximate decompositions when the caller does not pick one.
pub const DEFAULT_RANDOM_SEED: u64 = 2025;

/// Which decomposition computes the principal directions.
///
/// The string forms (`exact`, `randomized`, `randomized-block-krylov`, `quic`)
/// are accepted by [`FromStr`] and used for serde.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecompositionMethod {
    /// Full symmetric eigen-decomposition (or SVD for wide data).
    #[default]
    Exact,
    /// Randomized SVD with power iterations.
    Randomized,
    /// Randomized block Krylov subspace iteration.
    RandomizedBlockKrylov,
    /// Cosine-tree incremental subspace approximation.
    Quic,
}

impl DecompositionMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Randomized => "randomized",
            Self::RandomizedBlockKrylov => "randomized-block-krylov",
            Self::Quic => "quic",
        }
    }

    /// Returns true for the seeded, approximate methods.
    pub const fn is_approximate(&self) -> bool {
        !matches!(self, Self::Exact)
    }
}

impl fmt::Display for DecompositionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecompositionMethod {
    type Err = PcaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "randomized" => Ok(Self::Randomized),
            "randomized-block-krylov" => Ok(Self::RandomizedBlockKrylov),
            "quic" => Ok(Self::Quic),
            other => Err(PcaError::invalid_configuration(format!(
                "Unknown decomposition method '{}'; expected one of 'exact', 'randomized', 'randomized-block-krylov', 'quic'.",
                other
            ))),
        }
    }
}

/// Tuning for the randomized SVD (Halko, Martinsson, Tropp 2011).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomizedSvdConfig {
    /// Extra sketch columns beyond the target rank (`l = k + oversampling`).
    pub oversampling: usize,
    /// Number of QR-stabilized power iterations applied to the sketch.
    pub power_iterations: usize,
    /// Seed for the Gaussian test matrix. `None` draws one from the thread RNG.
    pub seed: Option<u64>,
}

impl Default for RandomizedSvdConfig {
    fn default() -> Self {
        Self {
            oversampling: 10,
            power_iterations: 2,
            seed: Some(DEFAULT_RANDOM_SEED),
        }
    }
}

/// Tuning for the randomized block Krylov decomposition (Musco & Musco 2015).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockKrylovConfig {
    /// Extra columns per Krylov block beyond the target rank.
    pub block_oversampling: usize,
    /// Number of blocks appended after the starting block.
    pub krylov_iterations: usize,
    pub seed: Option<u64>,
}

impl Default for BlockKrylovConfig {
    fn default() -> Self {
        Self {
            block_oversampling: 10,
            krylov_iterations: 2,
            seed: Some(DEFAULT_RANDOM_SEED),
        }
    }
}

/// Tuning for the QUIC cosine-tree decomposition.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuicConfig {
    /// Basis growth stops once the residual energy falls below
    /// `epsilon * ||A||_F^2`. Must lie in `(0, 1)`.
    pub epsilon: f64,
    /// Seed for length-squared pivot sampling.
    pub seed: Option<u64>,
}

impl Default for QuicConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.03,
            seed: Some(DEFAULT_RANDOM_SEED),
        }
    }
}

/// Complete configuration of one PCA run.
///
/// Passed by value into [`crate::pca`] or [`crate::PcaEngine::new`]; nothing in
/// it is mutated by the pipeline.
///
/// ```
/// use pca_engine::{DecompositionMethod, PcaConfig};
///
/// let config = PcaConfig {
///     scale: true,
///     decomposition: DecompositionMethod::Randomized,
///     new_dimensionality: 2,
///     ..PcaConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaConfig {
    /// Center and divide every feature by its standard deviation before decomposing.
    pub scale: bool,
    pub decomposition: DecompositionMethod,
    /// Desired output dimensionality. `0` keeps every component.
    pub new_dimensionality: usize,
    /// Fraction of variance to retain. `0.0` disables it; any value in
    /// `(0, 1]` overrides `new_dimensionality`.
    pub var_to_retain: f64,
    pub randomized: RandomizedSvdConfig,
    pub block_krylov: BlockKrylovConfig,
    pub quic: QuicConfig,
    /// Recompute with the exact decomposition when an approximate one hits a
    /// numerical failure.
    pub fallback_to_exact: bool,
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            scale: false,
            decomposition: DecompositionMethod::Exact,
            new_dimensionality: 0,
            var_to_retain: 0.0,
            randomized: RandomizedSvdConfig::default(),
            block_krylov: BlockKrylovConfig::default(),
            quic: QuicConfig::default(),
            fallback_to_exact: false,
        }
    }
}

impl PcaConfig {
    /// Checks every constraint that does not depend on the dataset.
    pub fn validate(&self) -> Result<()> {
        self.retention_criterion()?;

        if !(self.quic.epsilon > 0.0 && self.quic.epsilon < 1.0) {
            return Err(PcaError::invalid_configuration(format!(
                "QUIC epsilon must lie in (0, 1), got {}.",
                self.quic.epsilon
            )));
        }
        Ok(())
    }

    /// Checks the constraints that depend on the number of features `d`.
    pub fn validate_for_features(&self, n_features: usize) -> Result<()> {
        self.validate()?;
        if self.new_dimensionality > n_features {
            return Err(PcaError::invalid_configuration(format!(
                "New dimensionality ({}) cannot be greater than the existing dimensionality ({}).",
                self.new_dimensionality, n_features
            )));
        }
        Ok(())
    }

    /// The retention rule implied by `new_dimensionality` and `var_to_retain`.
    pub fn retention_criterion(&self) -> Result<RetentionCriterion> {
        RetentionCriterion::from_knobs(self.new_dimensionality, self.var_to_retain)
    }
}
