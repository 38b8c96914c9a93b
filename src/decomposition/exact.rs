use super::{covariance_normalizer, ComponentSet};
use crate::error::{PcaError, Result};
use crate::linalg_backends::LinAlgBackend;
use log::debug;
use ndarray::{Array1, Array2};

/// Full PCA of already centered data.
///
/// Tall or square data (`d <= n`) goes through the `d x d` covariance matrix
/// and a symmetric eigensolver. Wide data (`d > n`) takes the SVD of the
/// centered matrix instead, which avoids squaring the condition number and
/// still yields every right singular vector; the directions beyond the
/// `min(n, d)` singular values get zero eigenvalues.
pub(super) fn decompose<B: LinAlgBackend>(
    backend: &B,
    centered: &Array2<f64>,
    mean: Array1<f64>,
) -> Result<ComponentSet> {
    let (n_samples, n_features) = centered.dim();
    let normalizer = covariance_normalizer(n_samples);

    if n_features <= n_samples {
        debug!("Exact: eigendecomposing the {0}x{0} covariance matrix.", n_features);
        let mut covariance = centered.t().dot(centered);
        covariance /= normalizer;

        let eig = backend.eigh_upper(&covariance)?;
        ComponentSet::from_kernel_output(mean, eig.eigenvectors, eig.eigenvalues)
    } else {
        debug!(
            "Exact: {} features exceed {} samples, using the SVD of the centered data.",
            n_features, n_samples
        );
        let svd = backend.svd_into(centered.clone(), false, true)?;
        let vt = svd
            .vt
            .ok_or_else(|| PcaError::numerical_failure("SVD did not return right singular vectors."))?;

        let n_directions = vt.nrows();
        let mut eigenvalues = Array1::<f64>::zeros(n_directions);
        for (slot, &sv) in eigenvalues.iter_mut().zip(svd.s.iter()) {
            *slot = sv * sv / normalizer;
        }
        ComponentSet::from_kernel_output(mean, vt.t().to_owned(), eigenvalues)
    }
}
