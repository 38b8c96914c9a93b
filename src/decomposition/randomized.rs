use super::{covariance_normalizer, ComponentSet};
use crate::config::RandomizedSvdConfig;
use crate::error::{PcaError, Result};
use crate::linalg_backends::LinAlgBackend;
use log::{debug, trace};
use ndarray::{s, Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::Normal;

/// ChaCha8 generator from `seed`, or from the thread RNG when `None`.
pub(super) fn seeded_rng(seed: Option<u64>) -> Result<ChaCha8Rng> {
    match seed {
        Some(s) => Ok(ChaCha8Rng::seed_from_u64(s)),
        None => ChaCha8Rng::from_rng(rand::thread_rng())
            .map_err(|e| PcaError::numerical_failure(format!("Failed to initialize RNG: {}", e))),
    }
}

/// Matrix of i.i.d. standard normal entries.
pub(super) fn gaussian_matrix(rng: &mut ChaCha8Rng, shape: (usize, usize)) -> Result<Array2<f64>> {
    let normal = Normal::new(0.0, 1.0).map_err(|e| {
        PcaError::numerical_failure(format!("Failed to create normal distribution: {}", e))
    })?;
    Ok(Array2::from_shape_fn(shape, |_| rng.sample(normal)))
}

/// Randomized SVD of centered data (Halko, Martinsson, Tropp 2011).
///
/// The sketch has `l = min(target_rank + oversampling, min(n, d))` columns and
/// is refined with QR-stabilized power iterations. The orientation follows the
/// data shape:
///
/// - `d <= n`: sketch `Y = A·Ω` in sample space, project `B = Qᵀ·A`
///   (`l x d`), and read the directions from the rows of `Vᵀ_B`.
/// - `d > n`: sketch `Y = Aᵀ·Ω` in feature space, project `B = (A·Q)ᵀ`
///   (`l x n`), and rotate the basis with the left singular vectors of `B`.
///
/// Returns `min(target_rank, l)` components.
pub(super) fn decompose<B: LinAlgBackend>(
    backend: &B,
    centered: &Array2<f64>,
    mean: Array1<f64>,
    target_rank: usize,
    config: &RandomizedSvdConfig,
) -> Result<ComponentSet> {
    let (n_samples, n_features) = centered.dim();
    let max_rank = n_samples.min(n_features);
    let sketch_width = (target_rank + config.oversampling).min(max_rank).max(1);
    let n_keep = target_rank.min(sketch_width);
    debug!(
        "Randomized SVD: target rank {}, sketch width {}, {} power iterations, seed {:?}.",
        target_rank, sketch_width, config.power_iterations, config.seed
    );

    let mut rng = seeded_rng(config.seed)?;

    let (directions, singular_values) = if n_features <= n_samples {
        let omega = gaussian_matrix(&mut rng, (n_features, sketch_width))?;
        let mut q_basis = backend.qr_q_factor(&centered.dot(&omega))?;

        for i in 0..config.power_iterations {
            trace!("Randomized SVD power iteration {}/{}", i + 1, config.power_iterations);
            let w_basis = backend.qr_q_factor(&centered.t().dot(&q_basis))?;
            q_basis = backend.qr_q_factor(&centered.dot(&w_basis))?;
        }

        let projected = q_basis.t().dot(centered);
        let svd = backend.svd_into(projected, false, true)?;
        let vt = svd.vt.ok_or_else(|| {
            PcaError::numerical_failure("SVD of the projected sketch returned no right singular vectors.")
        })?;
        let n_found = n_keep.min(svd.s.len()).min(vt.nrows());
        (
            vt.slice(s![..n_found, ..]).t().to_owned(),
            svd.s.slice(s![..n_found]).to_owned(),
        )
    } else {
        let omega = gaussian_matrix(&mut rng, (n_samples, sketch_width))?;
        let mut q_basis = backend.qr_q_factor(&centered.t().dot(&omega))?;

        for i in 0..config.power_iterations {
            trace!("Randomized SVD power iteration {}/{}", i + 1, config.power_iterations);
            let w_basis = backend.qr_q_factor(&centered.dot(&q_basis))?;
            q_basis = backend.qr_q_factor(&centered.t().dot(&w_basis))?;
        }

        let projected = centered.dot(&q_basis).t().to_owned();
        let svd = backend.svd_into(projected, true, false)?;
        let u = svd.u.ok_or_else(|| {
            PcaError::numerical_failure("SVD of the projected sketch returned no left singular vectors.")
        })?;
        let n_found = n_keep.min(svd.s.len()).min(u.ncols());
        (
            q_basis.dot(&u.slice(s![.., ..n_found])),
            svd.s.slice(s![..n_found]).to_owned(),
        )
    };

    let normalizer = covariance_normalizer(n_samples);
    let eigenvalues = singular_values.mapv(|sv| sv * sv / normalizer);
    ComponentSet::from_kernel_output(mean, directions, eigenvalues)
}
