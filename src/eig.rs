// Filtered eigendecomposition of symmetric scatter matrices.

use ndarray::{Array1, Array2, Axis};
use ndarray_linalg::{Eigh, UPLO};
use std::error::Error;

/// Default relative tolerance for discarding near-zero eigenvalues.
pub const DEFAULT_EPS: f64 = 1e-10;

/// Eigendecomposition of a symmetric positive semi-definite matrix,
/// filtered to the numerically trustworthy part of the spectrum.
///
/// Returns `(eigenvectors, eigenvalues)` with eigenvectors as columns of an
/// `(n, p)` matrix and eigenvalues sorted in descending order. Only
/// eigenvalues that are strictly positive *and* strictly greater than
/// `max(|eigenvalue|) * eps` survive; the rest are silently dropped, so `p`
/// reflects the numerical rank of `s` rather than its dimension. An empty
/// result (`p == 0`) is legal, e.g. for the zero matrix.
pub fn decompose(s: &Array2<f64>, eps: f64) -> Result<(Array2<f64>, Array1<f64>), Box<dyn Error>> {
    let (vals, vecs) = s
        .eigh(UPLO::Upper)
        .map_err(|e| format!("Eigendecomposition of scatter matrix failed: {}", e))?;

    // Descending by eigenvalue, original index as secondary key so ties in
    // degenerate subspaces order the same way on every LAPACK backend.
    let mut order: Vec<usize> = (0..vals.len()).collect();
    order.sort_by(|&a, &b| {
        vals[b]
            .partial_cmp(&vals[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let limit = vals.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())) * eps;

    let kept: Vec<usize> = order
        .into_iter()
        .filter(|&i| vals[i] > 0.0 && vals[i] > limit)
        .collect();

    let eigenvalues = Array1::from_iter(kept.iter().map(|&i| vals[i]));
    let eigenvectors = vecs.select(Axis(1), &kept);

    Ok((eigenvectors, eigenvalues))
}
