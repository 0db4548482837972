//! Quality gate for SPAC bins
//!
//! A bin is usable when its coherence reaches the threshold and its SPAC
//! coefficient is finite with magnitude at most one.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::curve::DispersionCurve;
use crate::{MicrotremorError, Result};

/// Score below which a report is logged as poor.
const LOW_SCORE: f64 = 0.5;

/// Usability mask over a frequency axis and the fraction of usable bins
#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    pub frequencies: Vec<f64>,
    pub mask: Vec<bool>,
    /// Fraction of usable bins in [0, 1]; 0 for an empty axis
    pub score: f64,
}

impl QualityReport {
    pub fn usable_count(&self) -> usize {
        self.mask.iter().filter(|&&ok| ok).count()
    }

    /// Restrict a curve on the same frequency axis to usable bins.
    pub fn filter(&self, curve: &DispersionCurve) -> Result<DispersionCurve> {
        curve.masked(&self.mask)
    }
}

/// Thresholds for [`QualityGate::evaluate`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityGate {
    pub min_coherence: f64,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self { min_coherence: 0.8 }
    }
}

impl QualityGate {
    pub fn new(min_coherence: f64) -> Self {
        Self { min_coherence }
    }

    pub fn is_usable(&self, spac: f64, coherence: f64) -> bool {
        // NaN coherence fails the comparison, NaN spac fails `is_finite`.
        coherence >= self.min_coherence && spac.is_finite() && spac.abs() <= 1.0
    }

    pub fn evaluate(
        &self,
        frequencies: &[f64],
        spac: &[f64],
        coherence: &[f64],
    ) -> Result<QualityReport> {
        for (context, got) in [("spac values", spac.len()), ("coherence values", coherence.len())] {
            if got != frequencies.len() {
                return Err(MicrotremorError::LengthMismatch {
                    context,
                    expected: frequencies.len(),
                    got,
                });
            }
        }

        let mask: Vec<bool> = spac
            .iter()
            .zip(coherence)
            .map(|(&s, &c)| self.is_usable(s, c))
            .collect();

        let usable = mask.iter().filter(|&&ok| ok).count();
        let score = if mask.is_empty() {
            0.0
        } else {
            usable as f64 / mask.len() as f64
        };

        if !mask.is_empty() && score < LOW_SCORE {
            warn!(score, usable, bins = mask.len(), "low SPAC quality score");
        } else {
            debug!(score, usable, bins = mask.len(), "quality evaluated");
        }

        Ok(QualityReport {
            frequencies: frequencies.to_vec(),
            mask,
            score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_reference_case() {
        let report = QualityGate::new(0.8)
            .evaluate(&[1.0, 2.0, 3.0], &[0.5, 0.5, 1.5], &[0.9, 0.5, 0.95])
            .unwrap();
        assert_eq!(report.mask, vec![true, false, false]);
        assert_relative_eq!(report.score, 1.0 / 3.0);
        assert_eq!(report.usable_count(), 1);
    }

    #[test]
    fn test_non_finite_spac_rejected() {
        let report = QualityGate::default()
            .evaluate(
                &[1.0, 2.0, 3.0, 4.0],
                &[f64::NAN, f64::INFINITY, -1.0, 0.2],
                &[0.99, 0.99, 0.99, f64::NAN],
            )
            .unwrap();
        assert_eq!(report.mask, vec![false, false, true, false]);
    }

    #[test]
    fn test_empty_axis_scores_zero() {
        let report = QualityGate::default().evaluate(&[], &[], &[]).unwrap();
        assert!(report.mask.is_empty());
        assert_eq!(report.score, 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        let err = QualityGate::default()
            .evaluate(&[1.0, 2.0], &[0.1], &[0.9, 0.9])
            .unwrap_err();
        assert!(matches!(err, MicrotremorError::LengthMismatch { .. }));
    }

    #[test]
    fn test_filter_curve() {
        let report = QualityGate::default()
            .evaluate(&[1.0, 2.0], &[0.5, 0.5], &[0.9, 0.1])
            .unwrap();
        let curve = DispersionCurve::new(vec![1.0, 2.0], vec![300.0, 250.0]).unwrap();
        let kept = report.filter(&curve).unwrap();
        assert_eq!(kept.velocities(), &[300.0]);
    }
}
