//! Dispersion curves and curve combination
//!
//! A curve pairs frequencies with phase velocities. Velocities may be NaN
//! where a bin could not be resolved. Combining several curves keeps only
//! defined entries inside each curve's valid band and sorts the result by
//! frequency.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{MicrotremorError, Result};

/// Phase velocity (m/s) as a function of frequency (Hz)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DispersionCurve {
    frequencies: Vec<f64>,
    velocities: Vec<f64>,
}

impl DispersionCurve {
    pub fn new(frequencies: Vec<f64>, velocities: Vec<f64>) -> Result<Self> {
        if frequencies.len() != velocities.len() {
            return Err(MicrotremorError::LengthMismatch {
                context: "dispersion curve velocities",
                expected: frequencies.len(),
                got: velocities.len(),
            });
        }
        Ok(Self {
            frequencies,
            velocities,
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn velocities(&self) -> &[f64] {
        &self.velocities
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// `(frequency, velocity)` pairs, undefined ones included
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.frequencies
            .iter()
            .copied()
            .zip(self.velocities.iter().copied())
    }

    /// `(frequency, velocity)` pairs with a defined velocity
    pub fn defined(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.iter().filter(|(_, v)| !v.is_nan())
    }

    pub fn undefined_count(&self) -> usize {
        self.velocities.iter().filter(|v| v.is_nan()).count()
    }

    /// Keep the entries whose mask flag is set.
    pub fn masked(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.len() {
            return Err(MicrotremorError::LengthMismatch {
                context: "curve mask",
                expected: self.len(),
                got: mask.len(),
            });
        }
        let (frequencies, velocities) = self
            .iter()
            .zip(mask)
            .filter(|(_, keep)| **keep)
            .map(|(entry, _)| entry)
            .unzip();
        Ok(Self {
            frequencies,
            velocities,
        })
    }
}

/// Inclusive frequency interval in Hz
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub fmin: f64,
    pub fmax: f64,
}

impl FrequencyBand {
    pub fn new(fmin: f64, fmax: f64) -> Self {
        Self { fmin, fmax }
    }

    pub fn contains(&self, frequency: f64) -> bool {
        frequency >= self.fmin && frequency <= self.fmax
    }
}

/// Merge curves into one composite curve sorted by frequency.
///
/// With `bands`, curve `i` contributes only entries inside `bands[i]`.
/// Undefined velocities are dropped. Equal frequencies keep their input
/// order and are not deduplicated.
pub fn combine(curves: &[DispersionCurve], bands: Option<&[FrequencyBand]>) -> Result<DispersionCurve> {
    if let Some(bands) = bands {
        if bands.len() != curves.len() {
            return Err(MicrotremorError::LengthMismatch {
                context: "valid bands",
                expected: curves.len(),
                got: bands.len(),
            });
        }
    }

    let mut entries: Vec<(f64, f64)> = Vec::with_capacity(curves.iter().map(|c| c.len()).sum());
    for (idx, curve) in curves.iter().enumerate() {
        let band = bands.map(|b| b[idx]);
        entries.extend(
            curve
                .defined()
                .filter(|&(f, _)| band.map_or(true, |b| b.contains(f))),
        );
    }

    // `sort_by` is stable, so ties stay in input order.
    entries.sort_by(|a, b| a.0.total_cmp(&b.0));

    debug!(
        curves = curves.len(),
        retained = entries.len(),
        "dispersion curves combined"
    );

    let (frequencies, velocities) = entries.into_iter().unzip();
    Ok(DispersionCurve {
        frequencies,
        velocities,
    })
}
