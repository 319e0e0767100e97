//! Contamination-based threshold and labels.
//!
//! Given training scores and the expected outlier fraction, the threshold is the
//! `100 * (1 - contamination)` percentile of the scores (linear interpolation
//! between order statistics). Scores strictly above it are labeled `1`.

use crate::{Error, Result};

/// Threshold and binary labels derived from training scores.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    pub threshold: f32,
    pub labels: Vec<u8>,
}

impl Calibration {
    pub fn from_scores(scores: &[f32], contamination: f32) -> Result<Self> {
        check_contamination(contamination)?;
        if scores.is_empty() {
            return Err(Error::InvalidData("no scores to calibrate".to_owned()));
        }
        if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
            return Err(Error::InvalidData(format!("non-finite score {bad}")));
        }

        let q = 100.0 * (1.0 - f64::from(contamination));
        let threshold = percentile(scores, q);
        let labels = scores.iter().map(|&s| label(s, threshold)).collect();
        Ok(Self { threshold, labels })
    }

    /// Label a new score against this threshold.
    #[inline]
    pub fn label(&self, score: f32) -> u8 {
        label(score, self.threshold)
    }

    /// Number of samples labeled as outliers.
    pub fn n_outliers(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }
}

/// `1` if `score` exceeds `threshold`, else `0`.
#[inline]
pub fn label(score: f32, threshold: f32) -> u8 {
    u8::from(score > threshold)
}

pub(crate) fn check_contamination(contamination: f32) -> Result<()> {
    if !(contamination.is_finite() && contamination > 0.0 && contamination <= 0.5) {
        return Err(Error::InvalidConfig(format!(
            "contamination must be in (0, 0.5], got {contamination}"
        )));
    }
    Ok(())
}

/// `q`-th percentile (0..=100) with linear interpolation.
///
/// Panics on an empty slice.
pub fn percentile(values: &[f32], q: f64) -> f32 {
    assert!(!values.is_empty(), "percentile of an empty slice");

    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);

    let pos = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    let (a, b) = (f64::from(sorted[lo]), f64::from(sorted[hi]));
    (a + (b - a) * frac) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_interpolates() {
        let v = [1.0_f32, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&v, 50.0), 3.0);
        assert_eq!(percentile(&v, 100.0), 5.0);
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert!((percentile(&v, 90.0) - 4.6).abs() < 1e-6);
    }

    #[test]
    fn labels_scores_above_threshold() {
        let scores = [0.1_f32, 0.2, 0.15, 9.0, 0.12, 0.18, 0.11, 0.14, 0.13, 0.16];
        let cal = Calibration::from_scores(&scores, 0.1).unwrap();
        assert_eq!(cal.n_outliers(), 1);
        assert_eq!(cal.labels[3], 1);
        assert_eq!(cal.label(cal.threshold), 0);
        assert_eq!(cal.label(10.0), 1);
    }

    #[test]
    fn identical_scores_produce_no_outliers() {
        let cal = Calibration::from_scores(&[0.5; 20], 0.05).unwrap();
        assert_eq!(cal.threshold, 0.5);
        assert_eq!(cal.n_outliers(), 0);
    }

    #[test]
    fn contamination_bounds() {
        assert!(Calibration::from_scores(&[1.0], 0.0).is_err());
        assert!(Calibration::from_scores(&[1.0], 0.6).is_err());
        assert!(Calibration::from_scores(&[1.0], 0.5).is_ok());
        assert!(Calibration::from_scores(&[], 0.1).is_err());
    }
}
