//! Reconstruction-error scoring.

use crate::{Error, Matrix, Result};

/// Euclidean distance between each row of `reference` and the same row of
/// `reconstructed`.
///
/// Works one row pair at a time, so memory use is `O(rows)` for the output only.
/// Higher scores mean the sample was reconstructed worse (more anomalous).
pub fn reconstruction_distances(reference: &Matrix, reconstructed: &Matrix) -> Result<Vec<f32>> {
    if reference.cols() != reconstructed.cols() {
        return Err(Error::ShapeMismatch {
            expected: reference.cols(),
            actual: reconstructed.cols(),
        });
    }
    if reference.rows() != reconstructed.rows() {
        return Err(Error::InvalidData(format!(
            "row count mismatch: {} reference rows vs {} reconstructed rows",
            reference.rows(),
            reconstructed.rows()
        )));
    }

    Ok(reference
        .iter_rows()
        .zip(reconstructed.iter_rows())
        .map(|(a, b)| row_distance(a, b))
        .collect())
}

/// L2 distance between two equally sized vectors, accumulated in `f64`.
#[inline]
pub fn row_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = f64::from(x) - f64::from(y);
            d * d
        })
        .sum::<f64>()
        .sqrt() as f32
}
