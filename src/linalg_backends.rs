// src/linalg_backends.rs

//! Dense linear-algebra kernels used by the decompositions.
//!
//! The decompositions only ever need three LAPACK-style operations: a
//! symmetric eigendecomposition, the Q factor of a thin QR, and an SVD.
//! They are expressed as traits so the strategies stay independent of the
//! concrete backend, and so tests can inject a backend that fails on purpose.

use crate::error::{PcaError, Result};
use ndarray::{Array1, Array2};
use ndarray_linalg::{Eigh, QR, SVDInto, UPLO};

/// Output of a symmetric eigendecomposition.
#[derive(Debug)]
pub struct EighOutput {
    /// Eigenvalues in ascending order, as LAPACK returns them.
    pub eigenvalues: Array1<f64>,
    /// Eigenvectors as columns; `eigenvectors.column(i)` pairs with `eigenvalues[i]`.
    pub eigenvectors: Array2<f64>,
}

/// Output of a singular value decomposition.
#[derive(Debug)]
pub struct SvdOutput {
    pub u: Option<Array2<f64>>,
    /// Singular values in descending order.
    pub s: Array1<f64>,
    pub vt: Option<Array2<f64>>,
}

/// Symmetric eigendecomposition reading the upper triangle.
pub trait BackendEigh {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput>;
}

/// Orthonormal basis for the column space of a tall matrix.
pub trait BackendQR {
    fn qr_q_factor(&self, matrix: &Array2<f64>) -> Result<Array2<f64>>;
}

/// Singular value decomposition, consuming its input.
pub trait BackendSVD {
    fn svd_into(&self, matrix: Array2<f64>, compute_u: bool, compute_v: bool) -> Result<SvdOutput>;
}

/// Everything a decomposition strategy needs from a backend.
pub trait LinAlgBackend: BackendEigh + BackendQR + BackendSVD + Sync {}

impl<T> LinAlgBackend for T where T: BackendEigh + BackendQR + BackendSVD + Sync {}

/// LAPACK-backed implementation through `ndarray-linalg`.
///
/// The LAPACK provider (OpenBLAS or MKL, static or system) is picked with the
/// crate's `backend_*` features.
#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

impl BackendEigh for NdarrayLinAlgBackend {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput> {
        if matrix.nrows() != matrix.ncols() {
            return Err(PcaError::numerical_failure(format!(
                "Symmetric eigendecomposition needs a square matrix, got {}x{}.",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        if matrix.is_empty() {
            return Ok(EighOutput {
                eigenvalues: Array1::zeros(0),
                eigenvectors: Array2::zeros((0, 0)),
            });
        }
        let (eigenvalues, eigenvectors) = matrix.eigh(UPLO::Upper).map_err(|e| {
            PcaError::numerical_failure(format!("Symmetric eigendecomposition failed: {}", e))
        })?;
        Ok(EighOutput {
            eigenvalues,
            eigenvectors,
        })
    }
}

impl BackendQR for NdarrayLinAlgBackend {
    fn qr_q_factor(&self, matrix: &Array2<f64>) -> Result<Array2<f64>> {
        let (nrows, ncols) = matrix.dim();
        if nrows == 0 || ncols == 0 {
            return Ok(Array2::zeros((nrows, nrows.min(ncols))));
        }
        let (q_factor, _r) = matrix
            .qr()
            .map_err(|e| PcaError::numerical_failure(format!("QR decomposition failed: {}", e)))?;
        Ok(q_factor)
    }
}

impl BackendSVD for NdarrayLinAlgBackend {
    fn svd_into(&self, matrix: Array2<f64>, compute_u: bool, compute_v: bool) -> Result<SvdOutput> {
        let (nrows, ncols) = matrix.dim();
        if matrix.is_empty() {
            let k = nrows.min(ncols);
            return Ok(SvdOutput {
                u: compute_u.then(|| Array2::zeros((nrows, k))),
                s: Array1::zeros(k),
                vt: compute_v.then(|| Array2::zeros((k, ncols))),
            });
        }
        let (u, s, vt) = matrix
            .svd_into(compute_u, compute_v)
            .map_err(|e| PcaError::numerical_failure(format!("SVD failed: {}", e)))?;
        Ok(SvdOutput { u, s, vt })
    }
}
