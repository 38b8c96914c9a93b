use crate::decomposition::ComponentSet;
use crate::error::{PcaError, Result};
use ndarray::{s, Array2, ArrayView2, Axis};
use rayon::prelude::*;

/// Data expressed in the coordinates of the leading `k` principal directions.
#[derive(Clone, Debug)]
pub struct Projection {
    /// `n_samples x k` scores.
    pub transformed: Array2<f64>,
    /// Share of the total variance carried by the kept components.
    pub retained_variance: f64,
    pub k: usize,
}

/// Projects `data` onto the first `k` directions of `components`.
///
/// Rows are centered with the component mean before the product, so `data`
/// must be in the same (possibly scaled) space the components were fitted in.
///
/// # Errors
/// `InvalidInput` if the feature counts disagree, `InvalidConfiguration` if
/// `k` exceeds the number of components.
pub fn project(data: ArrayView2<f64>, components: &ComponentSet, k: usize) -> Result<Projection> {
    if data.ncols() != components.n_features() {
        return Err(PcaError::invalid_input(format!(
            "Data has {} features but the components were fitted on {}.",
            data.ncols(),
            components.n_features()
        )));
    }
    if k > components.n_components() {
        return Err(PcaError::invalid_configuration(format!(
            "Cannot project onto {} components; only {} are available.",
            k,
            components.n_components()
        )));
    }

    let mean = components.mean();
    let mut centered = data.to_owned();
    centered
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|mut row| row -= mean);

    let transformed = centered.dot(&components.leading_directions(k));
    Ok(Projection {
        transformed,
        retained_variance: retained_variance_fraction(components, k),
        k,
    })
}

/// `Σλ[..k]` over the total variance of the fitted data, or `1.0` when
/// there is no variance at all.
pub fn retained_variance_fraction(components: &ComponentSet, k: usize) -> f64 {
    let total = components.total_variance();
    if total <= 0.0 {
        return 1.0;
    }
    let eigenvalues = components.eigenvalues();
    let k = k.min(eigenvalues.len());
    (eigenvalues.slice(s![..k]).sum() / total).clamp(0.0, 1.0)
}

/// Maps scores back to feature space: `transformed · Vₖᵀ + mean`.
///
/// With every component kept this recovers the data that was projected, up
/// to rounding.
pub fn reconstruct(transformed: ArrayView2<f64>, components: &ComponentSet) -> Result<Array2<f64>> {
    let k = transformed.ncols();
    if k > components.n_components() {
        return Err(PcaError::invalid_input(format!(
            "Scores have {} columns but only {} components are available.",
            k,
            components.n_components()
        )));
    }
    let mut restored = transformed.dot(&components.leading_directions(k).t());
    restored += components.mean();
    Ok(restored)
}
