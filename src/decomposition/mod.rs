//! Principal-direction computation.
//!
//! A [`DecompositionStrategy`] turns a (possibly scaled) dataset into a
//! [`ComponentSet`]. Every variant centers the data itself, normalizes the
//! scatter matrix by `max(n - 1, 1)`, and returns directions sorted by
//! descending eigenvalue, so callers never need to know which one ran.

mod block_krylov;
mod exact;
mod quic;
mod randomized;

use crate::config::{
    BlockKrylovConfig, DecompositionMethod, PcaConfig, QuicConfig, RandomizedSvdConfig,
};
use crate::error::{PcaError, Result};
use crate::linalg_backends::LinAlgBackend;
use log::{debug, info};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Columns with a norm below this are treated as numerically zero.
const NORMALIZATION_THRESHOLD: f64 = 1e-9;

/// Principal directions and their variances.
///
/// `directions` has shape `(n_features, n_components)`; column `i` is a unit
/// vector paired with `eigenvalues[i]`. Eigenvalues are non-negative and
/// non-increasing. `mean` is the centroid the directions are relative to.
///
/// A set produced by an approximate method may hold only the leading part of
/// the spectrum, so it also records the total variance of the data it was
/// fitted on. Variance fractions are always taken against that total.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentSet {
    mean: Array1<f64>,
    directions: Array2<f64>,
    eigenvalues: Array1<f64>,
    data_variance: f64,
}

impl ComponentSet {
    /// Builds a component set from possibly unordered eigenpairs.
    ///
    /// Pairs are sorted by descending eigenvalue, negative eigenvalues from
    /// rounding are clamped to zero, and every direction is scaled to unit
    /// length.
    ///
    /// # Errors
    /// Returns `InvalidInput` on mismatched shapes or non-finite values.
    pub fn new(
        mean: Array1<f64>,
        directions: Array2<f64>,
        eigenvalues: Array1<f64>,
    ) -> Result<Self> {
        if directions.nrows() != mean.len() {
            return Err(PcaError::invalid_input(format!(
                "Directions have {} rows but the mean has {} features.",
                directions.nrows(),
                mean.len()
            )));
        }
        if directions.ncols() != eigenvalues.len() {
            return Err(PcaError::invalid_input(format!(
                "{} directions were given with {} eigenvalues.",
                directions.ncols(),
                eigenvalues.len()
            )));
        }
        if eigenvalues.iter().chain(directions.iter()).chain(mean.iter()).any(|v| !v.is_finite()) {
            return Err(PcaError::invalid_input(
                "Component set contains non-finite values.",
            ));
        }

        let order = descending_order(&eigenvalues);
        let mut directions = reorder_columns(&directions, &order);
        let eigenvalues = eigenvalues.select(Axis(0), &order).mapv(|v| v.max(0.0));
        normalize_columns(&mut directions);
        let data_variance = eigenvalues.sum();

        Ok(Self {
            mean,
            directions,
            eigenvalues,
            data_variance,
        })
    }

    /// [`new`](Self::new) for eigenpairs straight out of a backend kernel.
    ///
    /// The input was checked before it reached the kernel, so a NaN or an
    /// infinity here is a `NumericalFailure`.
    pub(crate) fn from_kernel_output(
        mean: Array1<f64>,
        directions: Array2<f64>,
        eigenvalues: Array1<f64>,
    ) -> Result<Self> {
        if eigenvalues.iter().chain(directions.iter()).any(|v| !v.is_finite()) {
            return Err(PcaError::numerical_failure(
                "Decomposition kernel produced non-finite eigenpairs.",
            ));
        }
        Self::new(mean, directions, eigenvalues)
    }

    /// A set with no directions, for data without any variance to explain.
    pub fn empty(mean: Array1<f64>) -> Self {
        let n_features = mean.len();
        Self {
            mean,
            directions: Array2::zeros((n_features, 0)),
            eigenvalues: Array1::zeros(0),
            data_variance: 0.0,
        }
    }

    /// Records the total variance of the data the set was fitted on.
    ///
    /// Never drops below the variance the eigenvalues already account for;
    /// a non-finite value is ignored.
    pub fn with_data_variance(mut self, data_variance: f64) -> Self {
        if data_variance.is_finite() {
            self.data_variance = data_variance.max(self.captured_variance());
        }
        self
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn directions(&self) -> &Array2<f64> {
        &self.directions
    }

    pub fn eigenvalues(&self) -> &Array1<f64> {
        &self.eigenvalues
    }

    pub fn n_features(&self) -> usize {
        self.directions.nrows()
    }

    pub fn n_components(&self) -> usize {
        self.directions.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.n_components() == 0
    }

    /// Trace of the covariance matrix of the fitted data. Equal to the
    /// eigenvalue sum for a complete spectrum, larger for a truncated one.
    pub fn total_variance(&self) -> f64 {
        self.data_variance
    }

    /// Sum of the eigenvalues held by this set.
    pub fn captured_variance(&self) -> f64 {
        self.eigenvalues.sum()
    }

    /// The first `k` directions as columns.
    ///
    /// # Panics
    /// Panics if `k > self.n_components()`.
    pub fn leading_directions(&self, k: usize) -> ArrayView2<'_, f64> {
        self.directions.slice(s![.., ..k])
    }
}

/// Closed set of decomposition variants, each carrying its own tuning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DecompositionStrategy {
    Exact,
    Randomized(RandomizedSvdConfig),
    RandomizedBlockKrylov(BlockKrylovConfig),
    Quic(QuicConfig),
}

impl DecompositionStrategy {
    /// Picks the variant named by `config.decomposition` with its tuning block.
    pub fn from_config(config: &PcaConfig) -> Self {
        match config.decomposition {
            DecompositionMethod::Exact => Self::Exact,
            DecompositionMethod::Randomized => Self::Randomized(config.randomized),
            DecompositionMethod::RandomizedBlockKrylov => {
                Self::RandomizedBlockKrylov(config.block_krylov)
            }
            DecompositionMethod::Quic => Self::Quic(config.quic),
        }
    }

    pub fn method(&self) -> DecompositionMethod {
        match self {
            Self::Exact => DecompositionMethod::Exact,
            Self::Randomized(_) => DecompositionMethod::Randomized,
            Self::RandomizedBlockKrylov(_) => DecompositionMethod::RandomizedBlockKrylov,
            Self::Quic(_) => DecompositionMethod::Quic,
        }
    }

    /// Computes the principal directions of `data` (shape `n_samples x n_features`).
    ///
    /// `target_rank` bounds how many components the approximate variants
    /// compute; the exact variant always returns the full spectrum.
    ///
    /// # Errors
    /// `InvalidInput` for an empty dataset, `NumericalFailure` when a
    /// backend kernel fails.
    pub fn compute<B: LinAlgBackend>(
        &self,
        backend: &B,
        data: ArrayView2<f64>,
        target_rank: usize,
    ) -> Result<ComponentSet> {
        let (n_samples, n_features) = data.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(PcaError::invalid_input(format!(
                "Cannot decompose a {}x{} dataset.",
                n_samples, n_features
            )));
        }
        let target_rank = target_rank.clamp(1, n_samples.min(n_features));
        info!(
            "Running {} decomposition on {} samples x {} features (target rank {}).",
            self.method(),
            n_samples,
            n_features,
            target_rank
        );

        let (centered, mean) = center_columns(data);
        let data_variance =
            centered.iter().map(|v| v * v).sum::<f64>() / covariance_normalizer(n_samples);
        let components = match self {
            Self::Exact => exact::decompose(backend, &centered, mean)?,
            Self::Randomized(cfg) => {
                randomized::decompose(backend, &centered, mean, target_rank, cfg)?
            }
            Self::RandomizedBlockKrylov(cfg) => {
                block_krylov::decompose(backend, &centered, mean, target_rank, cfg)?
            }
            Self::Quic(cfg) => quic::decompose(backend, &centered, mean, target_rank, cfg)?,
        };
        debug!(
            "{} decomposition produced {} components; leading eigenvalues {:?}",
            self.method(),
            components.n_components(),
            components.eigenvalues().slice(s![..components.n_components().min(5)])
        );
        Ok(components.with_data_variance(data_variance))
    }
}

/// Denominator turning a scatter matrix into a covariance matrix.
pub(crate) fn covariance_normalizer(n_samples: usize) -> f64 {
    n_samples.saturating_sub(1).max(1) as f64
}

/// Returns the mean-centered copy of `data` and the column means.
pub(crate) fn center_columns(data: ArrayView2<f64>) -> (Array2<f64>, Array1<f64>) {
    let n_samples = data.nrows() as f64;
    let mean = data.sum_axis(Axis(0)) / n_samples;
    let mut centered = data.to_owned();
    centered
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|mut row| row -= &mean);
    (centered, mean)
}

/// Indices that sort `values` in descending order. NaN compares as equal.
pub(crate) fn descending_order(values: &Array1<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}

/// Owned copy of `matrix` with its columns permuted by `order`.
pub(crate) fn reorder_columns(matrix: &Array2<f64>, order: &[usize]) -> Array2<f64> {
    if order.is_empty() {
        return Array2::zeros((matrix.nrows(), 0));
    }
    matrix.select(Axis(1), order)
}

/// Scales every column to unit length; numerically zero columns become zero.
pub(crate) fn normalize_columns(matrix: &mut Array2<f64>) {
    for mut column in matrix.columns_mut() {
        let norm = column.dot(&column).sqrt();
        if norm > NORMALIZATION_THRESHOLD {
            column.mapv_inplace(|v| v / norm);
        } else {
            column.fill(0.0);
        }
    }
}

/// Rayleigh-Ritz step shared by the subspace methods.
///
/// Given an orthonormal `basis` (`n_features x m`) that approximately
/// contains the leading right singular vectors of `centered`, takes the SVD
/// of the small `centered · basis` matrix and rotates the basis into
/// principal directions. Keeps at most `keep` of them.
pub(crate) fn components_from_feature_basis<B: LinAlgBackend>(
    backend: &B,
    centered: &Array2<f64>,
    mean: Array1<f64>,
    basis: &Array2<f64>,
    keep: usize,
) -> Result<ComponentSet> {
    if basis.ncols() == 0 || keep == 0 {
        return Ok(ComponentSet::empty(mean));
    }
    let projected = centered.dot(basis);
    let svd = backend.svd_into(projected, false, true)?;
    let vt = svd
        .vt
        .ok_or_else(|| PcaError::numerical_failure("SVD did not return right singular vectors."))?;

    let n_kept = keep.min(svd.s.len()).min(vt.nrows());
    let rotation = vt.slice(s![..n_kept, ..]).t().to_owned();
    let directions = basis.dot(&rotation);
    let normalizer = covariance_normalizer(centered.nrows());
    let eigenvalues = svd.s.slice(s![..n_kept]).mapv(|sv| sv * sv / normalizer);

    ComponentSet::from_kernel_output(mean, directions, eigenvalues)
}
