use super::randomized::{gaussian_matrix, seeded_rng};
use super::{components_from_feature_basis, ComponentSet};
use crate::config::BlockKrylovConfig;
use crate::error::{PcaError, Result};
use crate::linalg_backends::LinAlgBackend;
use log::{debug, trace};
use ndarray::{concatenate, s, Array1, Array2, ArrayView2, Axis};

/// Randomized block Krylov PCA (Musco & Musco 2015).
///
/// Builds the feature-space Krylov subspace
/// `[AᵀΩ, (AᵀA)·AᵀΩ, …, (AᵀA)^q·AᵀΩ]`, orthonormalizing every block as it is
/// produced so the powers do not collapse onto the dominant direction. The
/// total width is capped at `min(n, d)`: the block that crosses the cap is
/// cut to fit and no further blocks are built. A final QR and a
/// Rayleigh-Ritz step give the components.
pub(super) fn decompose<B: LinAlgBackend>(
    backend: &B,
    centered: &Array2<f64>,
    mean: Array1<f64>,
    target_rank: usize,
    config: &BlockKrylovConfig,
) -> Result<ComponentSet> {
    let (n_samples, n_features) = centered.dim();
    let max_width = n_samples.min(n_features);
    let block_size = (target_rank + config.block_oversampling).min(max_width).max(1);
    debug!(
        "Block Krylov: target rank {}, block size {}, {} iterations, seed {:?}.",
        target_rank, block_size, config.krylov_iterations, config.seed
    );

    let mut rng = seeded_rng(config.seed)?;
    let omega = gaussian_matrix(&mut rng, (n_samples, block_size))?;

    let mut blocks: Vec<Array2<f64>> = Vec::with_capacity(config.krylov_iterations + 1);
    let mut width = 0;
    let mut block = backend.qr_q_factor(&centered.t().dot(&omega))?;
    for i in 0..=config.krylov_iterations {
        let room = max_width - width;
        if block.ncols() >= room {
            if block.ncols() > room {
                debug!(
                    "Block Krylov: subspace limited to {} columns, truncating block {} to {}.",
                    max_width,
                    i + 1,
                    room
                );
            }
            blocks.push(block.slice_move(s![.., ..room]));
            break;
        }
        width += block.ncols();

        let next = (i < config.krylov_iterations).then(|| centered.t().dot(&centered.dot(&block)));
        blocks.push(block);
        match next {
            Some(product) => {
                trace!("Block Krylov: building block {}/{}", i + 2, config.krylov_iterations + 1);
                block = backend.qr_q_factor(&product)?;
            }
            None => break,
        }
    }

    let views: Vec<ArrayView2<f64>> = blocks.iter().map(|b| b.view()).collect();
    let krylov = concatenate(Axis(1), &views).map_err(|e| {
        PcaError::numerical_failure(format!("Failed to assemble the Krylov subspace: {}", e))
    })?;
    let basis = backend.qr_q_factor(&krylov)?;

    components_from_feature_basis(backend, centered, mean, &basis, target_rank)
}
