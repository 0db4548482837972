//! Cross- and auto-spectral density estimation
//!
//! Welch's averaged periodogram applied to a pair of channels: both series
//! are cut into overlapping segments, each segment has its mean removed and
//! a periodic Hann window applied, and the cross-periodogram `conj(X)·Y` and
//! the two auto-periodograms `|X|²`, `|Y|²` are averaged over segments.
//!
//! Spectra are one-sided densities: scaled by `1 / (fs · Σw²)`, with every
//! bin except DC (and Nyquist, for even segment lengths) doubled.

use std::f64::consts::PI;

use rustfft::{num_complex::Complex64, FftPlanner};
use tracing::debug;

use crate::preprocess::{self, Detrend};
use crate::{MicrotremorError, Result};

/// Upper limit of the automatic segment length.
pub const MAX_DEFAULT_SEGMENT: usize = 2048;

/// Cross- and auto-spectral densities sharing one frequency axis
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralPair {
    frequencies: Vec<f64>,
    cross: Vec<Complex64>,
    auto_a: Vec<f64>,
    auto_b: Vec<f64>,
}

impl SpectralPair {
    /// Assemble a spectral pair, checking that all arrays are index-aligned.
    pub fn new(
        frequencies: Vec<f64>,
        cross: Vec<Complex64>,
        auto_a: Vec<f64>,
        auto_b: Vec<f64>,
    ) -> Result<Self> {
        let n = frequencies.len();
        for (context, got) in [
            ("cross spectrum", cross.len()),
            ("auto spectrum A", auto_a.len()),
            ("auto spectrum B", auto_b.len()),
        ] {
            if got != n {
                return Err(MicrotremorError::LengthMismatch {
                    context,
                    expected: n,
                    got,
                });
            }
        }
        Ok(Self {
            frequencies,
            cross,
            auto_a,
            auto_b,
        })
    }

    /// Frequency axis in Hz, ascending
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn cross(&self) -> &[Complex64] {
        &self.cross
    }

    pub fn auto_a(&self) -> &[f64] {
        &self.auto_a
    }

    pub fn auto_b(&self) -> &[f64] {
        &self.auto_b
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }
}

/// Welch-style cross/auto spectral estimator
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralEstimator {
    /// Samples per segment; `None` picks `min(len / 8, 2048)`
    pub segment_length: Option<usize>,
    /// Samples shared by consecutive segments; `None` picks half a segment
    pub overlap_length: Option<usize>,
    /// Trend removed from every segment before windowing
    pub segment_detrend: Detrend,
}

impl Default for SpectralEstimator {
    fn default() -> Self {
        Self {
            segment_length: None,
            overlap_length: None,
            segment_detrend: Detrend::Constant,
        }
    }
}

impl SpectralEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_segment_length(mut self, segment_length: usize) -> Self {
        self.segment_length = Some(segment_length);
        self
    }

    pub fn with_overlap_length(mut self, overlap_length: usize) -> Self {
        self.overlap_length = Some(overlap_length);
        self
    }

    /// Resolve segment and overlap lengths for a series of `available` samples.
    pub fn resolve_lengths(&self, available: usize) -> Result<(usize, usize)> {
        let segment = match self.segment_length {
            Some(0) => {
                return Err(MicrotremorError::InvalidParameter(
                    "segment length must be positive".to_string(),
                ))
            }
            Some(len) => len,
            None => (available / 8).min(MAX_DEFAULT_SEGMENT),
        };
        if segment == 0 {
            // Automatic length collapses below 8 samples.
            return Err(MicrotremorError::InsufficientData {
                required: 8,
                available,
            });
        }
        if segment > available {
            return Err(MicrotremorError::InsufficientData {
                required: segment,
                available,
            });
        }

        let overlap = self.overlap_length.unwrap_or(segment / 2);
        if overlap >= segment {
            return Err(MicrotremorError::InvalidParameter(format!(
                "overlap length {overlap} must be smaller than segment length {segment}"
            )));
        }
        Ok((segment, overlap))
    }

    /// Estimate the cross-spectral density of `(a, b)` and the auto-spectral
    /// density of each.
    pub fn estimate(&self, a: &[f64], b: &[f64], sampling_rate: f64) -> Result<SpectralPair> {
        if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
            return Err(MicrotremorError::InvalidParameter(format!(
                "sampling rate must be positive and finite, got {sampling_rate}"
            )));
        }
        if a.len() != b.len() {
            return Err(MicrotremorError::LengthMismatch {
                context: "channel pair",
                expected: a.len(),
                got: b.len(),
            });
        }

        let (segment, overlap) = self.resolve_lengths(a.len())?;
        let step = segment - overlap;
        let num_segments = (a.len() - segment) / step + 1;

        let window = hann_periodic(segment);
        let window_power: f64 = window.iter().map(|w| w * w).sum();
        let fft = FftPlanner::<f64>::new().plan_fft_forward(segment);

        let bins = segment / 2 + 1;
        let mut cross = vec![Complex64::new(0.0, 0.0); bins];
        let mut auto_a = vec![0.0; bins];
        let mut auto_b = vec![0.0; bins];

        let mut buf_a = vec![Complex64::new(0.0, 0.0); segment];
        let mut buf_b = vec![Complex64::new(0.0, 0.0); segment];

        for k in 0..num_segments {
            let start = k * step;
            self.load_segment(&a[start..start + segment], &window, &mut buf_a);
            self.load_segment(&b[start..start + segment], &window, &mut buf_b);
            fft.process(&mut buf_a);
            fft.process(&mut buf_b);

            for i in 0..bins {
                cross[i] += buf_a[i].conj() * buf_b[i];
                auto_a[i] += buf_a[i].norm_sqr();
                auto_b[i] += buf_b[i].norm_sqr();
            }
        }

        let scale = 1.0 / (sampling_rate * window_power * num_segments as f64);
        for i in 0..bins {
            let one_sided = if i == 0 || (segment % 2 == 0 && i == bins - 1) {
                1.0
            } else {
                2.0
            };
            cross[i] *= scale * one_sided;
            auto_a[i] *= scale * one_sided;
            auto_b[i] *= scale * one_sided;
        }

        let frequencies = (0..bins)
            .map(|i| i as f64 * sampling_rate / segment as f64)
            .collect();

        debug!(
            segment_length = segment,
            overlap_length = overlap,
            segments = num_segments,
            bins,
            "spectral pair estimated"
        );

        SpectralPair::new(frequencies, cross, auto_a, auto_b)
    }

    fn load_segment(&self, samples: &[f64], window: &[f64], out: &mut [Complex64]) {
        let detrended = preprocess::detrend(samples, self.segment_detrend);
        for ((slot, &v), &w) in out.iter_mut().zip(&detrended).zip(window) {
            *slot = Complex64::new(v * w, 0.0);
        }
    }
}

/// Periodic Hann window (the DFT-even form used for spectral estimation).
pub fn hann_periodic(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}
