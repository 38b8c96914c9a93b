// Principal component analysis (PCA)

#![doc = include_str!("../README.md")]

pub mod config;
pub mod decomposition;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod linalg_backends;
pub mod preprocess;
pub mod projection;
pub mod selection;

pub use config::{
    BlockKrylovConfig, DecompositionMethod, PcaConfig, QuicConfig, RandomizedSvdConfig,
    DEFAULT_RANDOM_SEED,
};
pub use decomposition::{ComponentSet, DecompositionStrategy};
pub use diagnostics::DecompositionDiagnostics;
pub use engine::{PcaEngine, PcaOutput, PipelineStage, StageTimings};
pub use error::{PcaError, Result};
pub use linalg_backends::{LinAlgBackend, NdarrayLinAlgBackend};
pub use preprocess::ScaleParameters;
pub use projection::Projection;
pub use selection::RetentionCriterion;

use ndarray::{Array2, ArrayView2};

/// Runs PCA on `dataset` (`n_samples x n_features`) and returns the
/// `n_samples x k` projection onto the leading principal components.
///
/// Shorthand for [`PcaEngine::new`] followed by [`PcaEngine::run`] on the
/// default backend. Use the engine directly to also get the components,
/// scaling parameters and diagnostics.
///
/// # Errors
/// - `InvalidInput` for an empty dataset or non-finite values.
/// - `InvalidConfiguration` for out-of-range retention knobs or tuning.
/// - `NumericalFailure` when a linear-algebra kernel fails.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use pca_engine::{pca, PcaConfig};
///
/// let data = array![
///     [2.5, 2.4, 0.5],
///     [0.5, 0.7, 1.9],
///     [2.2, 2.9, 0.8],
///     [1.9, 2.2, 1.1],
///     [3.1, 3.0, 0.2],
/// ];
/// let config = PcaConfig {
///     new_dimensionality: 2,
///     ..PcaConfig::default()
/// };
/// let transformed = pca(data.view(), config).unwrap();
/// assert_eq!(transformed.dim(), (5, 2));
/// ```
pub fn pca(dataset: ArrayView2<f64>, config: PcaConfig) -> Result<Array2<f64>> {
    let engine = PcaEngine::new(config)?;
    engine.run(dataset).map(|output| output.transformed)
}
