//! Contiguous sample storage.
//!
//! Every stage of the detector (standardization, training, reconstruction and
//! scoring) works on a [`Matrix`]: a validated, row-major `(rows, cols)` buffer of
//! `f32`. Rows are samples, columns are features.

use crate::{Error, Result};

/// A dense row-major matrix of samples.
///
/// Invariant: `values.len() == rows * cols` and `cols > 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    values: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl Matrix {
    /// Build a matrix from a flat buffer with shape `(len / cols, cols)`.
    pub fn from_flat(values: Vec<f32>, cols: usize) -> Result<Self> {
        if cols == 0 {
            return Err(Error::InvalidData("matrix must have at least one column".to_owned()));
        }
        if !values.len().is_multiple_of(cols) {
            return Err(Error::InvalidData(format!(
                "buffer length {} is not divisible by column count {cols}",
                values.len()
            )));
        }

        let rows = values.len() / cols;
        Ok(Self { values, rows, cols })
    }

    /// Build a matrix from per-sample rows.
    ///
    /// This copies into contiguous storage.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Err(Error::InvalidData("matrix must have at least one row".to_owned()));
        };

        let cols = first.as_ref().len();
        if cols == 0 {
            return Err(Error::InvalidData("matrix must have at least one column".to_owned()));
        }

        let mut values = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(Error::InvalidData(format!(
                    "row {i} has {} values, expected {cols}",
                    row.len()
                )));
            }
            values.extend_from_slice(row);
        }

        Ok(Self {
            values,
            rows: rows.len(),
            cols,
        })
    }

    /// An all-zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Result<Self> {
        Self::from_flat(vec![0.0; rows * cols], cols)
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Returns the `idx`-th row.
    ///
    /// Panics if `idx >= rows`.
    #[inline]
    pub fn row(&self, idx: usize) -> &[f32] {
        let start = idx * self.cols;
        &self.values[start..start + self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, idx: usize) -> &mut [f32] {
        let start = idx * self.cols;
        &mut self.values[start..start + self.cols]
    }

    /// Iterate rows in order.
    pub fn iter_rows(&self) -> impl ExactSizeIterator<Item = &[f32]> + '_ {
        self.values.chunks_exact(self.cols)
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.values
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.values
    }

    /// Rows `start..end` as a flat row-major slice.
    #[inline]
    pub(crate) fn row_block(&self, start: usize, end: usize) -> &[f32] {
        &self.values[start * self.cols..end * self.cols]
    }

    /// Fails unless the matrix has at least one row and only finite values.
    pub fn ensure_finite_non_empty(&self) -> Result<()> {
        if self.rows == 0 {
            return Err(Error::InvalidData("matrix must have at least one row".to_owned()));
        }
        if let Some(pos) = self.values.iter().position(|v| !v.is_finite()) {
            return Err(Error::InvalidData(format!(
                "non-finite value {} at row {}, column {}",
                self.values[pos],
                pos / self.cols,
                pos % self.cols
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_flat_validates_shape() {
        assert!(Matrix::from_flat(vec![0.0, 1.0, 2.0, 3.0], 2).is_ok());
        assert!(Matrix::from_flat(vec![0.0, 1.0, 2.0], 2).is_err());
        assert!(Matrix::from_flat(vec![], 0).is_err());
    }

    #[test]
    fn from_rows_rejects_ragged_and_empty_input() {
        let ragged = vec![vec![1.0_f32, 2.0], vec![3.0]];
        assert!(Matrix::from_rows(&ragged).is_err());

        let empty: Vec<Vec<f32>> = Vec::new();
        assert!(Matrix::from_rows(&empty).is_err());

        let no_cols = vec![Vec::<f32>::new()];
        assert!(Matrix::from_rows(&no_cols).is_err());
    }

    #[test]
    fn rows_are_row_major() {
        let m = Matrix::from_rows(&[[1.0_f32, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m.row(1), &[4.0, 5.0, 6.0]);
        assert_eq!(m.iter_rows().count(), 2);
        assert_eq!(m.row_block(1, 2), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn non_finite_values_are_reported_with_position() {
        let m = Matrix::from_rows(&[[1.0_f32, 2.0], [f32::NAN, 0.0]]).unwrap();
        let err = m.ensure_finite_non_empty().unwrap_err();
        assert!(format!("{err}").contains("row 1, column 0"));

        let empty = Matrix::from_flat(vec![], 3).unwrap();
        assert!(empty.ensure_finite_non_empty().is_err());
    }
}
