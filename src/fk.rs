//! Frequency-wavenumber beamforming
//!
//! Every station is transformed to the frequency domain once. For each
//! retained frequency, a square grid of trial horizontal slowness vectors is
//! scanned; the beam at `s` is the sum over stations of `X_k(f)·exp(+i2πf s·r_k)`,
//! which re-aligns a plane wave travelling with slowness `s`. The grid point
//! with the largest beam power gives the slowness estimate and the phase
//! velocity is its reciprocal magnitude.
//!
//! Frequencies are independent of each other, so they are scanned in
//! parallel; results keep the order of the frequency axis.

use std::f64::consts::PI;

use rayon::prelude::*;
use rustfft::{num_complex::Complex64, FftPlanner};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::array::ArrayDataset;
use crate::curve::{DispersionCurve, FrequencyBand};
use crate::{BinWarning, MicrotremorError, Result};

/// Horizontal slowness bounds in s/m
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlownessRange {
    /// Grid points with a smaller slowness magnitude are excluded from the search
    pub min: f64,
    /// Half-width of the square grid on both axes
    pub max: f64,
}

impl SlownessRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Beam-power maximum at one frequency
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FkPeak {
    pub frequency: f64,
    pub slowness_x: f64,
    pub slowness_y: f64,
    /// Beam power `|beam|²` at the maximum; NaN for skipped bins
    pub power: f64,
}

impl FkPeak {
    fn skipped(frequency: f64) -> Self {
        Self {
            frequency,
            slowness_x: f64::NAN,
            slowness_y: f64::NAN,
            power: f64::NAN,
        }
    }

    pub fn slowness(&self) -> f64 {
        self.slowness_x.hypot(self.slowness_y)
    }

    /// Phase velocity in m/s, NaN for zero frequency or zero slowness.
    pub fn velocity(&self) -> f64 {
        match self.check() {
            Ok(s) => 1.0 / s,
            Err(_) => f64::NAN,
        }
    }

    fn check(&self) -> std::result::Result<f64, BinWarning> {
        if self.frequency == 0.0 || self.power.is_nan() {
            return Err(BinWarning::NonPhysicalValue);
        }
        let s = self.slowness();
        if s == 0.0 {
            return Err(BinWarning::DegenerateSlowness);
        }
        Ok(s)
    }

    /// Propagation azimuth in degrees clockwise from +y (north), in [0, 360).
    pub fn azimuth(&self) -> f64 {
        self.slowness_x.atan2(self.slowness_y).to_degrees().rem_euclid(360.0)
    }

    /// Direction the wave arrives from, opposite to the propagation azimuth.
    pub fn back_azimuth(&self) -> f64 {
        (self.azimuth() + 180.0).rem_euclid(360.0)
    }
}

/// Exhaustive slowness-grid beamformer
#[derive(Debug, Clone, PartialEq)]
pub struct FkBeamformer {
    pub frequency_range: FrequencyBand,
    pub slowness_range: SlownessRange,
    /// Points per grid axis
    pub grid_size: usize,
    /// Scan frequencies on the rayon pool
    pub parallel: bool,
}

impl FkBeamformer {
    pub const DEFAULT_GRID_SIZE: usize = 50;

    pub fn new(
        frequency_range: FrequencyBand,
        slowness_range: SlownessRange,
        grid_size: usize,
    ) -> Result<Self> {
        let beamformer = Self {
            frequency_range,
            slowness_range,
            grid_size,
            parallel: true,
        };
        beamformer.validate()?;
        Ok(beamformer)
    }

    pub fn validate(&self) -> Result<()> {
        let band = self.frequency_range;
        if !(band.fmin.is_finite() && band.fmax.is_finite() && band.fmin <= band.fmax) {
            return Err(MicrotremorError::InvalidParameter(format!(
                "frequency range must satisfy fmin <= fmax, got [{}, {}]",
                band.fmin, band.fmax
            )));
        }
        let s = self.slowness_range;
        if !(s.max.is_finite() && s.max > 0.0 && s.min >= 0.0 && s.min <= s.max) {
            return Err(MicrotremorError::InvalidParameter(format!(
                "slowness range must satisfy 0 <= min <= max, max > 0, got [{}, {}]",
                s.min, s.max
            )));
        }
        if self.grid_size < 2 {
            return Err(MicrotremorError::InvalidParameter(format!(
                "slowness grid needs at least 2 points per axis, got {}",
                self.grid_size
            )));
        }
        Ok(())
    }

    /// Trial slowness values along one axis, evenly spaced over `[-max, max]`.
    pub fn slowness_axis(&self) -> Vec<f64> {
        let max = self.slowness_range.max;
        let last = (self.grid_size - 1) as f64;
        // The centre of an odd grid is exactly zero.
        (0..self.grid_size)
            .map(|i| max * (2.0 * i as f64 - last) / last)
            .collect()
    }

    /// Spacing between neighbouring grid points.
    pub fn grid_step(&self) -> f64 {
        2.0 * self.slowness_range.max / (self.grid_size - 1) as f64
    }

    /// Per-frequency beam-power maxima, in frequency-axis order.
    pub fn peaks(&self, dataset: &ArrayDataset) -> Result<Vec<FkPeak>> {
        self.validate()?;

        let (frequencies, spectra) = station_spectra(dataset, self.frequency_range);
        let axis = self.slowness_axis();
        let coords = dataset.coordinates();

        let scan = |(idx, &f): (usize, &f64)| -> FkPeak {
            if f == 0.0 {
                return FkPeak::skipped(f);
            }
            let values: Vec<Complex64> = spectra.iter().map(|s| s[idx]).collect();
            self.scan_frequency(f, &values, coords, &axis)
        };

        let peaks: Vec<FkPeak> = if self.parallel {
            frequencies.par_iter().enumerate().map(scan).collect()
        } else {
            frequencies.iter().enumerate().map(scan).collect()
        };

        debug!(
            frequencies = peaks.len(),
            grid_size = self.grid_size,
            stations = dataset.n_stations(),
            "FK scan complete"
        );
        Ok(peaks)
    }

    /// Phase-velocity curve over the retained frequencies.
    pub fn estimate(&self, dataset: &ArrayDataset) -> Result<DispersionCurve> {
        let peaks = self.peaks(dataset)?;
        let mut frequencies = Vec::with_capacity(peaks.len());
        let mut velocities = Vec::with_capacity(peaks.len());
        for peak in &peaks {
            if let Err(warning) = peak.check() {
                trace!(frequency = peak.frequency, %warning, "FK bin left undefined");
            }
            frequencies.push(peak.frequency);
            velocities.push(peak.velocity());
        }
        DispersionCurve::new(frequencies, velocities)
    }

    fn scan_frequency(
        &self,
        frequency: f64,
        values: &[Complex64],
        coords: &[[f64; 2]],
        axis: &[f64],
    ) -> FkPeak {
        let omega = 2.0 * PI * frequency;
        // exp(+iωs·r) separates into an x factor and a y factor.
        let phase_x: Vec<Vec<Complex64>> = axis
            .iter()
            .map(|&sx| coords.iter().map(|r| Complex64::from_polar(1.0, omega * sx * r[0])).collect())
            .collect();
        let phase_y: Vec<Vec<Complex64>> = axis
            .iter()
            .map(|&sy| coords.iter().map(|r| Complex64::from_polar(1.0, omega * sy * r[1])).collect())
            .collect();

        let min_sq = self.slowness_range.min * self.slowness_range.min;
        let mut best = FkPeak {
            frequency,
            slowness_x: f64::NAN,
            slowness_y: f64::NAN,
            power: f64::NEG_INFINITY,
        };
        let mut row = vec![Complex64::new(0.0, 0.0); values.len()];

        for (i, &sy) in axis.iter().enumerate() {
            for ((slot, &v), &py) in row.iter_mut().zip(values).zip(&phase_y[i]) {
                *slot = v * py;
            }
            for (j, &sx) in axis.iter().enumerate() {
                if sx * sx + sy * sy < min_sq {
                    continue;
                }
                let beam: Complex64 = row.iter().zip(&phase_x[j]).map(|(a, b)| a * b).sum();
                let power = beam.norm_sqr();
                // Strict comparison keeps the first maximum in row-major order.
                if power > best.power {
                    best.slowness_x = sx;
                    best.slowness_y = sy;
                    best.power = power;
                }
            }
        }

        if best.power == f64::NEG_INFINITY {
            // Only reachable with non-finite spectra.
            return FkPeak::skipped(frequency);
        }
        best
    }
}

/// Signed DFT bin frequencies for `n` points, in transform order.
pub fn fft_frequencies(n: usize, sampling_rate: f64) -> Vec<f64> {
    let half = (n + 1) / 2;
    (0..n)
        .map(|k| {
            let signed = if k < half { k as f64 } else { k as f64 - n as f64 };
            signed * sampling_rate / n as f64
        })
        .collect()
}

/// Zero-padded DFT of every station, restricted to bins inside `band`.
fn station_spectra(dataset: &ArrayDataset, band: FrequencyBand) -> (Vec<f64>, Vec<Vec<Complex64>>) {
    let nfft = dataset.n_samples().next_power_of_two();
    let all_freqs = fft_frequencies(nfft, dataset.sampling_rate());
    let keep: Vec<usize> = all_freqs
        .iter()
        .enumerate()
        .filter(|(_, f)| band.contains(**f))
        .map(|(k, _)| k)
        .collect();

    let fft = FftPlanner::<f64>::new().plan_fft_forward(nfft);
    let spectra = dataset
        .data()
        .iter()
        .map(|series| {
            let mut buf = vec![Complex64::new(0.0, 0.0); nfft];
            for (slot, &v) in buf.iter_mut().zip(series) {
                slot.re = v;
            }
            fft.process(&mut buf);
            keep.iter().map(|&k| buf[k]).collect()
        })
        .collect();

    let frequencies = keep.iter().map(|&k| all_freqs[k]).collect();
    (frequencies, spectra)
}
