// src/diagnostics.rs

use crate::config::DecompositionMethod;
use crate::decomposition::ComponentSet;
use crate::linalg_backends::LinAlgBackend;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Quality summary of one decomposition, attached to every run's output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecompositionDiagnostics {
    pub method: DecompositionMethod,
    pub n_components: usize,
    /// `||I - VᵀV||_F` of the direction matrix; `None` for an empty set.
    pub orthogonality_error: Option<f64>,
    /// Whether the eigenvalues came out non-increasing.
    pub eigenvalues_sorted: bool,
    /// Sum of the computed eigenvalues over the total variance of the data
    /// that was decomposed. `None` when the data has no variance.
    pub captured_variance_fraction: Option<f64>,
    /// Relative error of rebuilding the centered data from the kept scores.
    /// Its square is the share of variance the projection dropped.
    pub reconstruction_error: Option<f64>,
    /// Largest absolute Pearson correlation between two leading score
    /// columns; principal scores are uncorrelated, so this should be near 0.
    pub max_score_correlation: Option<f64>,
    pub leading_eigenvalues: Vec<f64>,
}

/// How many eigenvalues are copied into the diagnostics record.
const LEADING_EIGENVALUE_SAMPLE: usize = 5;

/// Score columns compared pairwise for decorrelation.
const SCORE_CORRELATION_COLUMNS: usize = 10;

/// Components below this fraction of the leading eigenvalue carry only
/// rounding noise and are left out of the correlation check.
const NEGLIGIBLE_EIGENVALUE_RATIO: f64 = 1e-12;

impl DecompositionDiagnostics {
    /// Summarizes a run: `data` is the (possibly scaled) matrix that was
    /// decomposed and projected, `transformed` its scores.
    pub fn collect(
        components: &ComponentSet,
        method: DecompositionMethod,
        data: ArrayView2<f64>,
        transformed: ArrayView2<f64>,
    ) -> Self {
        let eigenvalues = components.eigenvalues();
        let eigenvalues_sorted = eigenvalues
            .windows(2)
            .into_iter()
            .all(|w| w[0] >= w[1]);
        let total = components.total_variance();
        let captured_variance_fraction = if total > 0.0 {
            Some(components.captured_variance() / total)
        } else {
            None
        };

        Self {
            method,
            n_components: components.n_components(),
            orthogonality_error: orthogonality_error(&components.directions().view()),
            eigenvalues_sorted,
            captured_variance_fraction,
            reconstruction_error: projection_error(components, data, transformed),
            max_score_correlation: max_score_correlation(components, transformed),
            leading_eigenvalues: eigenvalues
                .iter()
                .take(LEADING_EIGENVALUE_SAMPLE)
                .copied()
                .collect(),
        }
    }
}

/// Relative error of `transformed · Vₖᵀ` against the centered `data`.
fn projection_error(
    components: &ComponentSet,
    data: ArrayView2<f64>,
    transformed: ArrayView2<f64>,
) -> Option<f64> {
    let k = transformed.ncols();
    if data.ncols() != components.n_features() || k > components.n_components() {
        return None;
    }
    let mut centered = data.to_owned();
    centered -= components.mean();
    let rebuilt = transformed.dot(&components.leading_directions(k).t());
    reconstruction_error(&centered.view(), &rebuilt.view())
}

fn max_score_correlation(components: &ComponentSet, transformed: ArrayView2<f64>) -> Option<f64> {
    let eigenvalues = components.eigenvalues();
    let floor = eigenvalues.first().copied().unwrap_or(0.0) * NEGLIGIBLE_EIGENVALUE_RATIO;
    let informative = eigenvalues
        .iter()
        .take(transformed.ncols().min(SCORE_CORRELATION_COLUMNS))
        .take_while(|&&lambda| lambda > floor)
        .count();

    let mut max: Option<f64> = None;
    for i in 0..informative {
        for j in (i + 1)..informative {
            let r = pearson_correlation(
                &transformed.index_axis(Axis(1), i),
                &transformed.index_axis(Axis(1), j),
            )?;
            max = Some(max.map_or(r.abs(), |m| m.max(r.abs())));
        }
    }
    max
}

/// Frobenius norm; `0.0` for an empty matrix.
pub fn frobenius_norm(matrix: &ArrayView2<f64>) -> f64 {
    if matrix.is_empty() {
        return 0.0;
    }
    matrix.iter().map(|&x| x * x).sum::<f64>().sqrt()
}

/// Computes orthogonality error ||I - Q^T Q||_F.
pub fn orthogonality_error(q_matrix: &ArrayView2<f64>) -> Option<f64> {
    if q_matrix.nrows() == 0 || q_matrix.ncols() == 0 {
        return None;
    }
    let qtq = q_matrix.t().dot(q_matrix);
    let diff = Array2::<f64>::eye(qtq.nrows()) - qtq;
    Some(frobenius_norm(&diff.view()))
}

/// Relative error `||A - R||_F / ||A||_F` of a reconstruction `R` of `A`.
///
/// A zero original gives `0.0` if the reconstruction is also zero and
/// infinity otherwise. `None` on mismatched shapes.
pub fn reconstruction_error(original: &ArrayView2<f64>, reconstructed: &ArrayView2<f64>) -> Option<f64> {
    if original.dim() != reconstructed.dim() || original.is_empty() {
        return None;
    }
    let diff = original - reconstructed;
    let norm_diff = frobenius_norm(&diff.view());
    let norm_original = frobenius_norm(original);

    if norm_original < 1e-12 {
        if norm_diff < 1e-12 {
            Some(0.0)
        } else {
            Some(f64::INFINITY)
        }
    } else {
        Some(norm_diff / norm_original)
    }
}

/// Cosine of the largest principal angle between the column spans of two
/// orthonormal bases, i.e. the smallest singular value of `AᵀB`.
///
/// `1.0` means `B` spans everything `A` spans. Only the first
/// `min(a.ncols(), b.ncols())` principal angles are considered.
pub fn subspace_alignment<B: LinAlgBackend>(
    backend: &B,
    a: &ArrayView2<f64>,
    b: &ArrayView2<f64>,
) -> Option<f64> {
    if a.nrows() != b.nrows() || a.ncols() == 0 || b.ncols() == 0 {
        return None;
    }
    let overlap = a.t().dot(b);
    let svd = backend.svd_into(overlap, false, false).ok()?;
    svd.s
        .iter()
        .copied()
        .fold(None, |min: Option<f64>, sv| Some(min.map_or(sv, |m| m.min(sv))))
        .map(|sv| sv.clamp(0.0, 1.0))
}

/// Pearson correlation of two equally long vectors.
///
/// Returns `None` for fewer than two entries or mismatched lengths, and
/// `0.0` when exactly one of them is constant.
pub fn pearson_correlation(vec_a: &ArrayView1<f64>, vec_b: &ArrayView1<f64>) -> Option<f64> {
    let n = vec_a.len();
    if n != vec_b.len() || n < 2 {
        return None;
    }
    let mean_a = vec_a.mean()?;
    let mean_b = vec_b.mean()?;

    let mut cov_ab = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&a, &b) in vec_a.iter().zip(vec_b.iter()) {
        let diff_a = a - mean_a;
        let diff_b = b - mean_b;
        cov_ab += diff_a * diff_b;
        var_a += diff_a * diff_a;
        var_b += diff_b * diff_b;
    }

    if var_a < 1e-12 || var_b < 1e-12 {
        // Both constant: correlated only if they are the same constant.
        if var_a < 1e-12 && var_b < 1e-12 {
            return Some(if (mean_a - mean_b).abs() < 1e-9 { 1.0 } else { 0.0 });
        }
        return Some(0.0);
    }
    Some((cov_ab / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0))
}
