use super::randomized::seeded_rng;
use super::{components_from_feature_basis, ComponentSet};
use crate::config::QuicConfig;
use crate::error::Result;
use crate::linalg_backends::LinAlgBackend;
use log::{debug, trace, warn};
use ndarray::{Array1, Array2, Axis};
use rand::distributions::{Distribution, WeightedIndex};
use rand_chacha::ChaCha8Rng;

/// A candidate gets rejected when Gram-Schmidt leaves less than this
/// fraction of its norm.
const ORTHOGONALIZATION_FLOOR: f64 = 1e-8;
/// Leaves whose residual energy is below this fraction of the total are done.
const LEAF_ENERGY_FLOOR: f64 = 1e-14;

/// A set of sample rows grouped by direction.
#[derive(Debug)]
struct CosineNode {
    rows: Vec<usize>,
}

/// Incrementally grown orthonormal basis together with the per-row energy
/// it has not captured yet.
struct SubspaceBasis<'a> {
    data: &'a Array2<f64>,
    vectors: Vec<Array1<f64>>,
    residual_energy: Array1<f64>,
}

impl<'a> SubspaceBasis<'a> {
    fn new(data: &'a Array2<f64>) -> Self {
        let residual_energy = data.map_axis(Axis(1), |row| row.dot(&row));
        Self {
            data,
            vectors: Vec::new(),
            residual_energy,
        }
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn remaining_energy(&self) -> f64 {
        self.residual_energy.sum().max(0.0)
    }

    fn node_energy(&self, node: &CosineNode) -> f64 {
        node.rows.iter().map(|&i| self.residual_energy[i].max(0.0)).sum()
    }

    /// Rows of `node` with their component in the current basis removed.
    fn residual_rows(&self, node: &CosineNode) -> Array2<f64> {
        let mut rows = self.data.select(Axis(0), &node.rows);
        if !self.vectors.is_empty() {
            let basis = self.as_matrix();
            let captured = rows.dot(&basis).dot(&basis.t());
            rows -= &captured;
        }
        rows
    }

    fn as_matrix(&self) -> Array2<f64> {
        let n_features = self.data.ncols();
        let mut basis = Array2::zeros((n_features, self.vectors.len()));
        for (mut column, vector) in basis.columns_mut().into_iter().zip(&self.vectors) {
            column.assign(vector);
        }
        basis
    }

    /// Orthogonalizes `candidate` against the basis and appends it if enough
    /// of it survives. Returns whether the basis grew.
    fn try_extend(&mut self, mut candidate: Array1<f64>) -> bool {
        let original_norm = candidate.dot(&candidate).sqrt();
        if !(original_norm > 0.0) {
            return false;
        }
        // Two passes of classical Gram-Schmidt keep the basis orthonormal to
        // working precision.
        for _ in 0..2 {
            for vector in &self.vectors {
                let coefficient = vector.dot(&candidate);
                candidate.scaled_add(-coefficient, vector);
            }
        }
        let norm = candidate.dot(&candidate).sqrt();
        if norm <= ORTHOGONALIZATION_FLOOR * original_norm {
            return false;
        }
        candidate.mapv_inplace(|v| v / norm);

        let projections = self.data.dot(&candidate);
        ndarray::Zip::from(&mut self.residual_energy)
            .and(&projections)
            .for_each(|r, &p| *r = (*r - p * p).max(0.0));
        self.vectors.push(candidate);
        true
    }
}

impl CosineNode {
    /// Sum of the residual rows after flipping each onto the side of the
    /// heaviest one, so opposite-signed samples along a direction reinforce
    /// instead of cancelling.
    fn representative(residuals: &Array2<f64>) -> Option<Array1<f64>> {
        let energies = residuals.map_axis(Axis(1), |row| row.dot(&row));
        let heaviest = argmax(&energies)?;
        let reference = residuals.row(heaviest);
        let mut centroid = Array1::<f64>::zeros(residuals.ncols());
        for row in residuals.rows() {
            let sign = if row.dot(&reference) < 0.0 { -1.0 } else { 1.0 };
            centroid.scaled_add(sign, &row);
        }
        Some(centroid)
    }

    /// Splits the node around a pivot drawn with probability proportional to
    /// residual energy. Rows closer to the pivot's absolute cosine than to the
    /// minimum go left.
    fn split(self, residuals: &Array2<f64>, rng: &mut ChaCha8Rng) -> (CosineNode, CosineNode) {
        let energies = residuals.map_axis(Axis(1), |row| row.dot(&row));
        let pivot = match WeightedIndex::new(energies.iter().copied()) {
            Ok(dist) => dist.sample(rng),
            Err(_) => argmax(&energies).unwrap_or(0),
        };
        let pivot_row = residuals.row(pivot);
        let pivot_norm = energies[pivot].sqrt();

        let cosines: Vec<f64> = residuals
            .rows()
            .into_iter()
            .zip(energies.iter())
            .map(|(row, &energy)| {
                let denom = pivot_norm * energy.sqrt();
                if denom > 0.0 {
                    (row.dot(&pivot_row) / denom).abs()
                } else {
                    0.0
                }
            })
            .collect();
        let cos_max = cosines.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let cos_min = cosines.iter().copied().fold(f64::INFINITY, f64::min);

        let mut left = Vec::new();
        let mut right = Vec::new();
        for (&row_index, &cos) in self.rows.iter().zip(&cosines) {
            if cos_max - cos <= cos - cos_min {
                left.push(row_index);
            } else {
                right.push(row_index);
            }
        }
        // All rows equally similar to the pivot: halve the node instead.
        if left.is_empty() || right.is_empty() {
            let mut rows = self.rows;
            let tail = rows.split_off(rows.len() / 2);
            return (CosineNode { rows }, CosineNode { rows: tail });
        }
        (CosineNode { rows: left }, CosineNode { rows: right })
    }
}

fn argmax(values: &Array1<f64>) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// QUIC-SVD style PCA using a cosine tree over the samples.
///
/// The basis starts from the representative of the root node. Each round
/// takes the leaf with the most uncaptured energy, splits it in two by cosine
/// similarity to a length-squared sampled pivot, and offers both children's
/// representatives to the basis. If neither adds a new direction, the
/// heaviest residual row of the leaf is added instead, so the basis grows by
/// at least one vector per round. Growth stops once the uncaptured energy is
/// at most `epsilon · ‖A‖²_F` or the basis spans `min(n, d)` directions.
pub(super) fn decompose<B: LinAlgBackend>(
    backend: &B,
    centered: &Array2<f64>,
    mean: Array1<f64>,
    target_rank: usize,
    config: &QuicConfig,
) -> Result<ComponentSet> {
    let (n_samples, n_features) = centered.dim();
    let max_basis = n_samples.min(n_features);
    let mut basis = SubspaceBasis::new(centered);
    let total_energy = basis.remaining_energy();
    if total_energy <= f64::MIN_POSITIVE {
        warn!("QUIC: centered data has no energy; returning no components.");
        return Ok(ComponentSet::empty(mean));
    }
    let tolerance = config.epsilon * total_energy;
    let mut rng = seeded_rng(config.seed)?;

    let root = CosineNode {
        rows: (0..n_samples).collect(),
    };
    if let Some(candidate) = CosineNode::representative(&basis.residual_rows(&root)) {
        basis.try_extend(candidate);
    }
    let mut leaves = vec![root];

    while basis.remaining_energy() > tolerance && basis.len() < max_basis {
        let Some((leaf_index, leaf_energy)) = leaves
            .iter()
            .enumerate()
            .map(|(i, leaf)| (i, basis.node_energy(leaf)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        else {
            break;
        };
        if leaf_energy <= LEAF_ENERGY_FLOOR * total_energy {
            break;
        }

        let leaf = leaves.swap_remove(leaf_index);
        let leaf_residuals = basis.residual_rows(&leaf);
        let heaviest_row = argmax(&leaf_residuals.map_axis(Axis(1), |row| row.dot(&row)))
            .map(|i| leaf_residuals.row(i).to_owned());

        let mut grew = false;
        if leaf.rows.len() >= 2 {
            let (left, right) = leaf.split(&leaf_residuals, &mut rng);
            trace!(
                "QUIC: split leaf of energy {:.3e} into {} + {} rows",
                leaf_energy,
                left.rows.len(),
                right.rows.len()
            );
            for child in [left, right] {
                if basis.len() < max_basis {
                    if let Some(candidate) = CosineNode::representative(&basis.residual_rows(&child)) {
                        grew |= basis.try_extend(candidate);
                    }
                }
                leaves.push(child);
            }
        } else {
            leaves.push(leaf);
        }

        if !grew {
            let extended = heaviest_row.map_or(false, |row| basis.try_extend(row));
            if !extended {
                break;
            }
        }
    }

    let captured = 1.0 - basis.remaining_energy() / total_energy;
    debug!(
        "QUIC: basis of {} vectors captures {:.4} of the energy (epsilon {}).",
        basis.len(),
        captured,
        config.epsilon
    );

    let basis_matrix = basis.as_matrix();
    components_from_feature_basis(backend, centered, mean, &basis_matrix, target_rank)
}
