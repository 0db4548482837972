//! SPAC coefficient and phase-velocity inversion
//!
//! For a station pair at distance `d`, the azimuthally averaged spatial
//! autocorrelation of a diffuse surface-wave field is `J0(2π f d / c)`.
//! Inverting that relation bin by bin turns a SPAC coefficient into a phase
//! velocity `c`.
//!
//! `J0(2π f d / c) - spac` is not monotonic in `c` over wide bounds. When
//! the search interval holds several roots, the bracketed search returns the
//! one it converges to; no attempt is made to pick between branches.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::bessel::bessel_j0;
use crate::curve::DispersionCurve;
use crate::roots::{brent, RootError, Tolerance};
use crate::spectral::SpectralPair;
use crate::{BinWarning, MicrotremorError, Result};

/// SPAC coefficient and coherence on a shared frequency axis
#[derive(Debug, Clone, PartialEq)]
pub struct SpacCoefficients {
    pub frequencies: Vec<f64>,
    pub spac: Vec<f64>,
    pub coherence: Vec<f64>,
}

/// Phase-velocity search interval in m/s
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for SearchBounds {
    fn default() -> Self {
        Self {
            min: 50.0,
            max: 2000.0,
        }
    }
}

impl SearchBounds {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        let bounds = Self { min, max };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite() && self.min > 0.0 && self.min < self.max)
        {
            return Err(MicrotremorError::InvalidParameter(format!(
                "velocity search bounds must satisfy 0 < min < max, got [{}, {}]",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Converts spectral pairs into SPAC coefficients and phase velocities
#[derive(Debug, Clone, Default)]
pub struct SpacInverter {
    pub bounds: SearchBounds,
    pub tolerance: Tolerance,
}

impl SpacInverter {
    pub fn new(bounds: SearchBounds) -> Result<Self> {
        bounds.validate()?;
        Ok(Self {
            bounds,
            tolerance: Tolerance::default(),
        })
    }

    /// SPAC coefficient `Re(Sxy) / sqrt(Sxx·Syy)` and coherence
    /// `|Sxy|² / (Sxx·Syy)` per bin.
    ///
    /// A zero auto-spectral product yields NaN in both outputs for that bin.
    pub fn coefficient(&self, pair: &SpectralPair) -> SpacCoefficients {
        let n = pair.len();
        let mut spac = Vec::with_capacity(n);
        let mut coherence = Vec::with_capacity(n);
        let mut zero_power = 0usize;

        for ((cross, &pa), &pb) in pair.cross().iter().zip(pair.auto_a()).zip(pair.auto_b()) {
            let power = pa * pb;
            if power == 0.0 {
                zero_power += 1;
                spac.push(f64::NAN);
                coherence.push(f64::NAN);
            } else {
                spac.push(cross.re / power.sqrt());
                coherence.push(cross.norm_sqr() / power);
            }
        }

        if zero_power > 0 {
            debug!(bins = zero_power, "zero auto-spectral power, SPAC undefined");
        }

        SpacCoefficients {
            frequencies: pair.frequencies().to_vec(),
            spac,
            coherence,
        }
    }

    /// Phase velocity for one bin, or NaN when it cannot be resolved.
    pub fn invert_velocity(&self, frequency: f64, spac: f64, distance: f64) -> f64 {
        match self.try_invert_velocity(frequency, spac, distance) {
            Ok(velocity) => velocity,
            Err(warning) => {
                trace!(frequency, spac, %warning, "bin left undefined");
                f64::NAN
            }
        }
    }

    /// Phase velocity for one bin, with the reason when none is found.
    ///
    /// Zero frequency, `|spac| > 1` and a NaN coefficient are rejected before
    /// any search.
    pub fn try_invert_velocity(
        &self,
        frequency: f64,
        spac: f64,
        distance: f64,
    ) -> std::result::Result<f64, BinWarning> {
        if frequency == 0.0 || spac.is_nan() || spac.abs() > 1.0 {
            return Err(BinWarning::NonPhysicalValue);
        }

        let k = 2.0 * std::f64::consts::PI * frequency * distance;
        let residual = |c: f64| bessel_j0(k / c) - spac;

        match brent(residual, self.bounds.min, self.bounds.max, &self.tolerance) {
            Ok(c) => Ok(c),
            Err(RootError::NotBracketed { .. }) => Err(BinWarning::RootNotBracketed),
            Err(RootError::NoConvergence { iterations }) => {
                debug!(frequency, spac, iterations, "root search did not converge");
                Err(BinWarning::RootNotBracketed)
            }
        }
    }

    /// Invert every `(frequency, spac)` bin into one dispersion curve.
    pub fn invert_curve(
        &self,
        frequencies: &[f64],
        spac: &[f64],
        distance: f64,
    ) -> Result<DispersionCurve> {
        if frequencies.len() != spac.len() {
            return Err(MicrotremorError::LengthMismatch {
                context: "spac values",
                expected: frequencies.len(),
                got: spac.len(),
            });
        }
        if !(distance.is_finite() && distance > 0.0) {
            return Err(MicrotremorError::InvalidParameter(format!(
                "station distance must be positive, got {distance}"
            )));
        }

        let velocities: Vec<f64> = frequencies
            .iter()
            .zip(spac)
            .map(|(&f, &s)| self.invert_velocity(f, s, distance))
            .collect();

        let curve = DispersionCurve::new(frequencies.to_vec(), velocities)?;
        debug!(
            distance,
            bins = curve.len(),
            undefined = curve.undefined_count(),
            "SPAC curve inverted"
        );
        Ok(curve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectral::SpectralEstimator;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;
    use rustfft::num_complex::Complex64;

    #[test]
    fn test_coefficient_guards_zero_power() {
        let pair = SpectralPair::new(
            vec![0.0, 1.0, 2.0],
            vec![
                Complex64::new(1.0, 0.0),
                Complex64::new(0.5, 0.5),
                Complex64::new(0.0, 0.0),
            ],
            vec![0.0, 1.0, 4.0],
            vec![1.0, 1.0, 0.0],
        )
        .unwrap();
        let coef = SpacInverter::default().coefficient(&pair);
        assert!(coef.spac[0].is_nan());
        assert!(coef.coherence[0].is_nan());
        assert_abs_diff_eq!(coef.spac[1], 0.5);
        assert_abs_diff_eq!(coef.coherence[1], 0.5);
        assert!(coef.spac[2].is_nan());
    }

    #[test]
    fn test_self_coherence_is_one() {
        let x: Vec<f64> = (0..4096)
            .map(|i| ((i * 7919) % 613) as f64 - 306.0 + (i as f64 * 0.37).sin() * 50.0)
            .collect();
        let pair = SpectralEstimator::new().estimate(&x, &x, 100.0).unwrap();
        let coef = SpacInverter::default().coefficient(&pair);
        for (s, c) in coef.spac.iter().zip(&coef.coherence).skip(1) {
            assert_abs_diff_eq!(*s, 1.0, epsilon = 1e-9);
            assert_abs_diff_eq!(*c, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_zero_frequency_is_non_physical() {
        let inv = SpacInverter::default();
        assert_eq!(
            inv.try_invert_velocity(0.0, 0.5, 10.0),
            Err(BinWarning::NonPhysicalValue)
        );
        assert!(inv.invert_velocity(0.0, 0.5, 10.0).is_nan());
    }

    #[test]
    fn test_spac_above_one_is_non_physical() {
        let inv = SpacInverter::default();
        assert_eq!(
            inv.try_invert_velocity(5.0, 1.2, 10.0),
            Err(BinWarning::NonPhysicalValue)
        );
        assert_eq!(
            inv.try_invert_velocity(5.0, -1.01, 10.0),
            Err(BinWarning::NonPhysicalValue)
        );
    }

    #[test]
    fn test_unbracketed_root_is_gap_not_error() {
        // f d = 1: J0 argument runs from 2π/50 to 2π/2000, all close to 1.
        let inv = SpacInverter::default();
        assert_eq!(
            inv.try_invert_velocity(1.0, 0.2, 1.0),
            Err(BinWarning::RootNotBracketed)
        );
        let curve = inv.invert_curve(&[1.0, 2.0], &[0.2, 0.3], 1.0).unwrap();
        assert!(curve.velocities().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_known_velocity_recovered() {
        let (f, d, c) = (8.0, 10.0, 300.0);
        let spac = bessel_j0(2.0 * std::f64::consts::PI * f * d / c);
        let v = SpacInverter::default().invert_velocity(f, spac, d);
        assert_abs_diff_eq!(v, c, epsilon = 1e-6);
    }

    #[test]
    fn test_invert_curve_length_mismatch() {
        let err = SpacInverter::default()
            .invert_curve(&[1.0, 2.0], &[0.5], 10.0)
            .unwrap_err();
        assert!(matches!(err, MicrotremorError::LengthMismatch { .. }));
    }

    #[test]
    fn test_bad_bounds_rejected() {
        assert!(SearchBounds::new(100.0, 50.0).is_err());
        assert!(SearchBounds::new(0.0, 50.0).is_err());
    }

    proptest! {
        #[test]
        fn prop_inverted_velocity_reproduces_spac(
            f in 0.5f64..30.0,
            d in 1.0f64..50.0,
            spac in -0.4f64..0.99,
        ) {
            let inv = SpacInverter::default();
            if let Ok(c) = inv.try_invert_velocity(f, spac, d) {
                prop_assert!(c >= inv.bounds.min && c <= inv.bounds.max);
                let model = bessel_j0(2.0 * std::f64::consts::PI * f * d / c);
                prop_assert!((model - spac).abs() < 1e-6);
            }
        }

        #[test]
        fn prop_non_physical_never_searched(
            f in 0.1f64..30.0,
            excess in 1e-9f64..5.0,
            negative in any::<bool>(),
        ) {
            let spac = if negative { -1.0 - excess } else { 1.0 + excess };
            let inv = SpacInverter::default();
            prop_assert_eq!(inv.try_invert_velocity(f, spac, 10.0), Err(BinWarning::NonPhysicalValue));
            prop_assert_eq!(inv.try_invert_velocity(0.0, spac.signum() * 0.5, 10.0), Err(BinWarning::NonPhysicalValue));
        }
    }
}
