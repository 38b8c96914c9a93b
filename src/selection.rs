//! Choosing how many principal components to keep.

use crate::decomposition::ComponentSet;
use crate::error::{PcaError, Result};
use log::debug;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Relative slack when comparing a cumulative variance fraction to its target,
/// so a fraction that equals the target up to rounding still qualifies.
const VARIANCE_TOLERANCE: f64 = 1e-12;

/// Rule deciding the output dimensionality.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetentionCriterion {
    /// Keep this many leading components; `0` keeps all of them.
    TargetCount(usize),
    /// Keep the fewest leading components whose variance reaches this
    /// fraction of the total. Must lie in `(0, 1]`.
    TargetVariance(f64),
}

impl Default for RetentionCriterion {
    fn default() -> Self {
        Self::TargetCount(0)
    }
}

impl RetentionCriterion {
    /// Combines the two configuration knobs. A non-zero `var_to_retain`
    /// takes precedence over `new_dimensionality`.
    pub fn from_knobs(new_dimensionality: usize, var_to_retain: f64) -> Result<Self> {
        let criterion = if var_to_retain != 0.0 {
            Self::TargetVariance(var_to_retain)
        } else {
            Self::TargetCount(new_dimensionality)
        };
        criterion.validate()?;
        Ok(criterion)
    }

    /// Same as [`from_knobs`](Self::from_knobs) for callers holding signed
    /// values, such as host-language adapters.
    pub fn from_signed_knobs(new_dimensionality: i64, var_to_retain: f64) -> Result<Self> {
        let count = usize::try_from(new_dimensionality).map_err(|_| {
            PcaError::invalid_configuration(format!(
                "New dimensionality must be non-negative, got {}.",
                new_dimensionality
            ))
        })?;
        Self::from_knobs(count, var_to_retain)
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::TargetCount(_) => Ok(()),
            Self::TargetVariance(v) if v > 0.0 && v <= 1.0 => Ok(()),
            Self::TargetVariance(v) => Err(PcaError::invalid_configuration(format!(
                "Variance to retain must be in (0, 1], got {}.",
                v
            ))),
        }
    }
}

/// Cumulative share of the data's total variance explained by the first
/// `i + 1` components. All zeros when the total is zero.
///
/// For a truncated set the last entry stays below one.
pub fn cumulative_variance_fractions(components: &ComponentSet) -> Array1<f64> {
    let total = components.total_variance();
    let mut running = 0.0;
    components.eigenvalues().mapv(|lambda| {
        running += lambda;
        if total > 0.0 {
            running / total
        } else {
            0.0
        }
    })
}

/// Number of leading components of `components` to keep under `criterion`.
///
/// The result lies in `[0, m]`, where `m` is the number of components; it is
/// `0` only when the set itself is empty. If a truncated set never reaches
/// the target variance, every component it holds is kept.
pub fn select_dimensionality(components: &ComponentSet, criterion: RetentionCriterion) -> Result<usize> {
    criterion.validate()?;
    let available = components.n_components();

    let k = match criterion {
        RetentionCriterion::TargetCount(0) => available,
        RetentionCriterion::TargetCount(k) => k.min(available),
        RetentionCriterion::TargetVariance(v) => {
            let total = components.total_variance();
            if v >= 1.0 || total <= 0.0 {
                available
            } else {
                cumulative_variance_fractions(components)
                    .iter()
                    .position(|&fraction| fraction + VARIANCE_TOLERANCE >= v)
                    .map_or(available, |i| i + 1)
            }
        }
    };

    debug!(
        "Selected {} of {} components using {:?}.",
        k, available, criterion
    );
    Ok(k)
}
