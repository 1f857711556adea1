//! Exposure metric and pseudo-inverse shared by the neutralizer and penalizer.
//!
//! Exposure of a prediction `y` to features `X` is `Xnᵀ yn`, where every
//! column of `X` and `y` has been centred and scaled to unit L2 norm.

use blocks_core::config::PINV_RCOND;
use blocks_core::{Error, Result};
use nalgebra::{DMatrix, DVector};

/// Iteration ceiling handed to the SVD.
const SVD_MAX_ITERATIONS: usize = 10_000;

/// Build a rows × columns matrix from named columns restricted to `rows`.
pub fn column_matrix(columns: &[&[f64]], rows: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), columns.len(), |i, j| columns[j][rows[i]])
}

/// Centre a vector and scale it to unit norm. A constant vector maps to zeros.
pub fn normalize_vector(y: &DVector<f64>) -> DVector<f64> {
    let centered = y.add_scalar(-y.mean());
    let norm = centered.norm();
    if norm > 0.0 {
        centered / norm
    } else {
        DVector::zeros(y.len())
    }
}

/// Centre every column and scale it to unit norm. Constant columns map to zeros.
pub fn normalize_columns(x: &DMatrix<f64>) -> DMatrix<f64> {
    let mut out = x.clone();
    for mut col in out.column_iter_mut() {
        let mean = col.mean();
        col.add_scalar_mut(-mean);
        let norm = col.norm();
        if norm > 0.0 {
            col /= norm;
        } else {
            col.fill(0.0);
        }
    }
    out
}

/// Exposure of `y` to each column of `x`.
pub fn exposures(x: &DMatrix<f64>, y: &DVector<f64>) -> DVector<f64> {
    normalize_columns(x).tr_mul(&normalize_vector(y))
}

/// Fail with a precondition error if `values` of `column` hold NaN or infinity.
///
/// Ranking would otherwise order NaN above every finite value.
pub fn require_finite(column: &str, values: &[f64]) -> Result<()> {
    match values.iter().find(|v| !v.is_finite()) {
        Some(v) => Err(Error::precondition(format!(
            "column '{column}' contains non-finite value {v}"
        ))),
        None => Ok(()),
    }
}

/// Moore-Penrose pseudo-inverse via SVD.
///
/// Singular values at or below `PINV_RCOND * σ_max` are treated as zero.
pub fn pseudo_inverse(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if m.iter().any(|v| !v.is_finite()) {
        return Err(Error::numerical("exposure matrix contains non-finite values"));
    }
    let svd = m
        .clone()
        .try_svd(true, true, f64::EPSILON, SVD_MAX_ITERATIONS)
        .ok_or_else(|| Error::numerical("SVD did not converge"))?;
    let max_sv = svd.singular_values.iter().copied().fold(0.0, f64::max);
    svd.pseudo_inverse(PINV_RCOND * max_sv)
        .map_err(|e| Error::numerical(format!("pseudo-inverse: {e}")))
}
