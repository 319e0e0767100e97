//! Per-feature standardization.
//!
//! A [`Standardizer`] stores the mean and scale of every feature as observed by a
//! single `fit` call. `transform` always reuses that stored state, so training
//! and scoring data are put on the same scale.

use crate::{Error, Matrix, Result};

/// Fitted per-feature mean and scale.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Standardizer {
    mean: Vec<f32>,
    scale: Vec<f32>,
}

impl Standardizer {
    /// Compute mean and population standard deviation (ddof = 0) per column.
    ///
    /// Columns with zero variance get a scale of `1.0`, so they map to zero
    /// instead of dividing by zero.
    pub fn fit(x: &Matrix) -> Result<Self> {
        if x.is_empty() {
            return Err(Error::InvalidData(
                "cannot standardize an empty matrix".to_owned(),
            ));
        }

        let cols = x.cols();
        let n = x.rows() as f64;
        let mut sum = vec![0.0_f64; cols];
        for row in x.iter_rows() {
            for (s, &v) in sum.iter_mut().zip(row) {
                *s += f64::from(v);
            }
        }
        let mean: Vec<f64> = sum.into_iter().map(|s| s / n).collect();

        let mut sq = vec![0.0_f64; cols];
        for row in x.iter_rows() {
            for ((acc, &v), &m) in sq.iter_mut().zip(row).zip(&mean) {
                let d = f64::from(v) - m;
                *acc += d * d;
            }
        }

        let mut scale = Vec::with_capacity(cols);
        for (j, acc) in sq.into_iter().enumerate() {
            let std = (acc / n).sqrt();
            if std > f64::EPSILON * mean[j].abs().max(1.0) {
                scale.push(std as f32);
            } else {
                tracing::warn!(feature = j, "feature has zero variance; leaving it unscaled");
                scale.push(1.0);
            }
        }

        Ok(Self {
            mean: mean.into_iter().map(|m| m as f32).collect(),
            scale,
        })
    }

    /// Fit on `x` and return the standardized copy alongside the fitted state.
    pub fn fit_transform(x: &Matrix) -> Result<(Matrix, Self)> {
        let state = Self::fit(x)?;
        let out = state.transform(x)?;
        Ok((out, state))
    }

    /// Standardize `x` with the stored state.
    pub fn transform(&self, x: &Matrix) -> Result<Matrix> {
        if x.cols() != self.n_features() {
            return Err(Error::ShapeMismatch {
                expected: self.n_features(),
                actual: x.cols(),
            });
        }

        let mut out = x.clone();
        for r in 0..out.rows() {
            for ((v, &m), &s) in out.row_mut(r).iter_mut().zip(&self.mean).zip(&self.scale) {
                *v = (*v - m) / s;
            }
        }
        Ok(out)
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    #[inline]
    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    #[inline]
    pub fn scale(&self) -> &[f32] {
        &self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardizes_to_zero_mean_unit_variance() {
        let x = Matrix::from_rows(&[[1.0_f32, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]]).unwrap();
        let (z, state) = Standardizer::fit_transform(&x).unwrap();

        assert_eq!(state.mean(), &[2.5, 25.0]);
        for j in 0..2 {
            let col: Vec<f32> = z.iter_rows().map(|r| r[j]).collect();
            let mean: f32 = col.iter().sum::<f32>() / 4.0;
            let var: f32 = col.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / 4.0;
            assert!(mean.abs() < 1e-6);
            assert!((var - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn transform_reuses_fitted_state() {
        let train = Matrix::from_rows(&[[0.0_f32], [2.0]]).unwrap();
        let state = Standardizer::fit(&train).unwrap();

        // A batch with a different mean must not be re-centred.
        let other = Matrix::from_rows(&[[10.0_f32], [12.0]]).unwrap();
        let z = state.transform(&other).unwrap();
        assert_eq!(z.as_slice(), &[9.0, 11.0]);
    }

    #[test]
    fn constant_feature_maps_to_zero() {
        let x = Matrix::from_rows(&[[5.0_f32, 1.0], [5.0, 3.0]]).unwrap();
        let (z, state) = Standardizer::fit_transform(&x).unwrap();
        assert_eq!(state.scale()[0], 1.0);
        assert!(z.iter_rows().all(|r| r[0] == 0.0));
    }

    #[test]
    fn transform_checks_width() {
        let state = Standardizer::fit(&Matrix::from_rows(&[[1.0_f32, 2.0]]).unwrap()).unwrap();
        let bad = Matrix::from_rows(&[[1.0_f32]]).unwrap();
        assert_eq!(
            state.transform(&bad).unwrap_err(),
            Error::ShapeMismatch {
                expected: 2,
                actual: 1
            }
        );
    }
}
