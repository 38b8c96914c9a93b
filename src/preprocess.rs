//! Dataset validation and optional per-feature standardization.

use crate::error::{PcaError, Result};
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A feature is zero-variance when its standard deviation is at most this
/// fraction of its largest absolute value. The cutoff follows the feature's
/// own units, so a constant column is caught despite rounding while a column
/// measured in tiny units is still scaled.
pub const ZERO_VARIANCE_TOLERANCE: f64 = 1e-10;

/// Per-feature statistics used to standardize a dataset.
///
/// `scale` holds the divisors that were actually applied. A zero-variance
/// feature keeps its raw (near-zero) `std_dev` but gets a divisor of `1.0`:
/// it is centered and otherwise left alone, so it comes out as a column of
/// zeros instead of NaN or infinity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScaleParameters {
    mean: Array1<f64>,
    std_dev: Array1<f64>,
    scale: Array1<f64>,
    zero_variance: Vec<usize>,
}

impl ScaleParameters {
    /// Parameters that leave data untouched.
    pub fn identity(n_features: usize) -> Self {
        Self {
            mean: Array1::zeros(n_features),
            std_dev: Array1::ones(n_features),
            scale: Array1::ones(n_features),
            zero_variance: Vec::new(),
        }
    }

    /// Computes column means and sample standard deviations (`ddof = 1`).
    /// With a single sample every feature counts as zero-variance.
    pub fn fit(data: ArrayView2<f64>) -> Self {
        let n_samples = data.nrows();
        let stats: Vec<ColumnStats> = data
            .axis_iter(Axis(1))
            .into_par_iter()
            .map(|column| ColumnStats::of(column, n_samples))
            .collect();

        let mean = Array1::from_iter(stats.iter().map(|c| c.mean));
        let std_dev = Array1::from_iter(stats.iter().map(|c| c.std_dev));
        let scale = Array1::from_iter(
            stats
                .iter()
                .map(|c| if c.is_zero_variance() { 1.0 } else { c.std_dev }),
        );
        let zero_variance = stats
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_zero_variance())
            .map(|(j, _)| j)
            .collect();
        Self {
            mean,
            std_dev,
            scale,
            zero_variance,
        }
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Raw sample standard deviations.
    pub fn std_dev(&self) -> &Array1<f64> {
        &self.std_dev
    }

    /// Divisors applied per feature; always positive and finite.
    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Indices of the features treated as zero-variance.
    pub fn zero_variance_features(&self) -> Vec<usize> {
        self.zero_variance.clone()
    }

    pub fn is_identity(&self) -> bool {
        self.mean.iter().all(|&m| m == 0.0) && self.scale.iter().all(|&s| s == 1.0)
    }

    /// Standardizes `data` with these parameters.
    ///
    /// # Errors
    /// Returns `InvalidInput` if the feature count does not match.
    pub fn apply(&self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.check_features(data.ncols())?;
        let mut out = data.to_owned();
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|mut row| {
                ndarray::Zip::from(&mut row)
                    .and(&self.mean)
                    .and(&self.scale)
                    .for_each(|x, &m, &s| *x = (*x - m) / s);
            });
        Ok(out)
    }

    /// Undoes [`ScaleParameters::apply`].
    pub fn invert(&self, scaled: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.check_features(scaled.ncols())?;
        let mut out = scaled.to_owned();
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|mut row| {
                ndarray::Zip::from(&mut row)
                    .and(&self.mean)
                    .and(&self.scale)
                    .for_each(|x, &m, &s| *x = *x * s + m);
            });
        Ok(out)
    }

    fn check_features(&self, n_features: usize) -> Result<()> {
        if n_features != self.n_features() {
            return Err(PcaError::invalid_input(format!(
                "Data has {} features but the scale parameters cover {}.",
                n_features,
                self.n_features()
            )));
        }
        Ok(())
    }
}

struct ColumnStats {
    mean: f64,
    std_dev: f64,
    max_abs: f64,
}

impl ColumnStats {
    fn of(column: ArrayView1<f64>, n_samples: usize) -> Self {
        let mean = column.sum() / n_samples as f64;
        let max_abs = column.iter().fold(0.0_f64, |m, &x| m.max(x.abs()));
        let std_dev = if n_samples < 2 {
            0.0
        } else {
            let sum_sq: f64 = column.iter().map(|&x| (x - mean) * (x - mean)).sum();
            (sum_sq / (n_samples - 1) as f64).sqrt()
        };
        Self {
            mean,
            std_dev,
            max_abs,
        }
    }

    fn is_zero_variance(&self) -> bool {
        !self.std_dev.is_finite() || self.std_dev <= ZERO_VARIANCE_TOLERANCE * self.max_abs
    }
}

/// Rejects empty datasets and non-finite values.
pub fn validate_dataset(data: ArrayView2<f64>) -> Result<()> {
    let (n_samples, n_features) = data.dim();
    if n_samples == 0 || n_features == 0 {
        return Err(PcaError::invalid_input(format!(
            "Dataset must have at least one sample and one feature, got {}x{}.",
            n_samples, n_features
        )));
    }
    if let Some(((row, col), value)) = data.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(PcaError::invalid_input(format!(
            "Dataset contains a non-finite value ({}) at sample {}, feature {}.",
            value, row, col
        )));
    }
    Ok(())
}

/// Validates `data` and, when `scale` is set, standardizes every feature.
///
/// Without scaling the data is returned unchanged together with identity
/// parameters; centering is then left to the decomposition.
pub fn preprocess(data: ArrayView2<f64>, scale: bool) -> Result<(Array2<f64>, ScaleParameters)> {
    validate_dataset(data)?;
    let n_features = data.ncols();

    if !scale {
        return Ok((data.to_owned(), ScaleParameters::identity(n_features)));
    }

    let params = ScaleParameters::fit(data);
    let zero_variance = params.zero_variance_features();
    if !zero_variance.is_empty() {
        warn!(
            "{} of {} features have zero variance and are centered but left unscaled: {:?}",
            zero_variance.len(),
            n_features,
            zero_variance
        );
    }
    let scaled = params.apply(data)?;
    debug!("Scaled dataset of shape {:?}.", scaled.dim());
    Ok((scaled, params))
}
