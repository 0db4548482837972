//! Per-channel conditioning
//!
//! Detrending, Tukey tapering and a zero-phase Butterworth bandpass. Every
//! function takes a real series and returns a new series of the same length.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::{MicrotremorError, Result};

/// Trend removal applied before spectral analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detrend {
    None,
    /// Subtract the mean
    Constant,
    /// Subtract the least-squares straight line
    #[default]
    Linear,
}

/// Remove a constant or linear trend.
pub fn detrend(series: &[f64], method: Detrend) -> Vec<f64> {
    let n = series.len();
    if n == 0 {
        return Vec::new();
    }
    match method {
        Detrend::None => series.to_vec(),
        Detrend::Constant => {
            let mean = series.iter().sum::<f64>() / n as f64;
            series.iter().map(|&v| v - mean).collect()
        }
        Detrend::Linear => {
            if n == 1 {
                return vec![0.0];
            }
            let t_mean = (n - 1) as f64 / 2.0;
            let y_mean = series.iter().sum::<f64>() / n as f64;
            let mut sxy = 0.0;
            let mut sxx = 0.0;
            for (i, &y) in series.iter().enumerate() {
                let dt = i as f64 - t_mean;
                sxy += dt * (y - y_mean);
                sxx += dt * dt;
            }
            let slope = sxy / sxx;
            series
                .iter()
                .enumerate()
                .map(|(i, &y)| y - (y_mean + slope * (i as f64 - t_mean)))
                .collect()
        }
    }
}

/// Tukey (tapered cosine) window of length `n`.
///
/// `alpha` is the tapered fraction: 0 is rectangular, 1 is Hann.
pub fn tukey_window(n: usize, alpha: f64) -> Vec<f64> {
    if n <= 1 || alpha <= 0.0 {
        return vec![1.0; n];
    }
    let alpha = alpha.min(1.0);
    let last = (n - 1) as f64;
    (0..n)
        .map(|i| {
            let x = i as f64 / last;
            if x < alpha / 2.0 {
                0.5 * (1.0 + (PI * (2.0 * x / alpha - 1.0)).cos())
            } else if x > 1.0 - alpha / 2.0 {
                0.5 * (1.0 + (PI * (2.0 * x / alpha - 2.0 / alpha + 1.0)).cos())
            } else {
                1.0
            }
        })
        .collect()
}

/// Multiply a series by a Tukey window.
pub fn taper(series: &[f64], alpha: f64) -> Vec<f64> {
    tukey_window(series.len(), alpha)
        .iter()
        .zip(series)
        .map(|(w, v)| w * v)
        .collect()
}

/// Zero-phase Butterworth bandpass.
///
/// A highpass at `fmin` and a lowpass at `fmax`, each of order `corners`,
/// run forward and then backward over an odd extension of the series.
pub fn bandpass(
    series: &[f64],
    sampling_rate: f64,
    fmin: f64,
    fmax: f64,
    corners: usize,
) -> Result<Vec<f64>> {
    let nyquist = 0.5 * sampling_rate;
    if corners == 0 {
        return Err(MicrotremorError::InvalidParameter(
            "bandpass corners must be at least 1".to_string(),
        ));
    }
    if !(fmin > 0.0 && fmin < fmax && fmax < nyquist) {
        return Err(MicrotremorError::InvalidParameter(format!(
            "bandpass requires 0 < fmin < fmax < {nyquist} Hz, got [{fmin}, {fmax}]"
        )));
    }
    if series.is_empty() {
        return Ok(Vec::new());
    }

    let mut sections = butterworth(corners, fmin, sampling_rate, Pass::High);
    sections.extend(butterworth(corners, fmax, sampling_rate, Pass::Low));
    Ok(filtfilt(&sections, series))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Low,
    High,
}

/// Second-order section, Direct Form II Transposed.
///
/// H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)
#[derive(Debug, Clone)]
struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
}

impl Biquad {
    fn run(&self, input: &mut [f64]) {
        let mut s = [0.0; 2];
        for x in input.iter_mut() {
            let y = self.b[0] * *x + s[0];
            s[0] = self.b[1] * *x - self.a[0] * y + s[1];
            s[1] = self.b[2] * *x - self.a[1] * y;
            *x = y;
        }
    }
}

/// Butterworth sections via the bilinear transform.
///
/// Pole pairs give biquads with Q = 1 / (2 sin((2k+1) pi / 2n)); odd orders
/// add one first-order section.
fn butterworth(order: usize, cutoff_hz: f64, sampling_rate: f64, pass: Pass) -> Vec<Biquad> {
    let w0 = 2.0 * PI * cutoff_hz / sampling_rate;
    let (sin_w0, cos_w0) = w0.sin_cos();
    let mut sections = Vec::with_capacity(order / 2 + 1);

    for k in 0..order / 2 {
        let theta = (2 * k + 1) as f64 * PI / (2 * order) as f64;
        let q = 1.0 / (2.0 * theta.sin());
        let alpha = sin_w0 / (2.0 * q);
        let a0 = 1.0 + alpha;
        let b = match pass {
            Pass::Low => [(1.0 - cos_w0) / 2.0, 1.0 - cos_w0, (1.0 - cos_w0) / 2.0],
            Pass::High => [(1.0 + cos_w0) / 2.0, -(1.0 + cos_w0), (1.0 + cos_w0) / 2.0],
        };
        sections.push(Biquad {
            b: [b[0] / a0, b[1] / a0, b[2] / a0],
            a: [-2.0 * cos_w0 / a0, (1.0 - alpha) / a0],
        });
    }

    if order % 2 == 1 {
        let k = (w0 / 2.0).tan();
        let norm = 1.0 / (1.0 + k);
        let b = match pass {
            Pass::Low => [k * norm, k * norm, 0.0],
            Pass::High => [norm, -norm, 0.0],
        };
        sections.push(Biquad {
            b,
            a: [(k - 1.0) * norm, 0.0],
        });
    }

    sections
}

fn filtfilt(sections: &[Biquad], series: &[f64]) -> Vec<f64> {
    let n = series.len();
    let pad = (3 * (2 * sections.len() + 1)).min(n - 1);

    let first = series[0];
    let last = series[n - 1];
    let mut work = Vec::with_capacity(n + 2 * pad);
    work.extend((1..=pad).rev().map(|i| 2.0 * first - series[i]));
    work.extend_from_slice(series);
    work.extend((1..=pad).map(|i| 2.0 * last - series[n - 1 - i]));

    // Forward, then backward: the second pass cancels the phase of the first.
    for _ in 0..2 {
        for section in sections {
            section.run(&mut work);
        }
        work.reverse();
    }

    work[pad..pad + n].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tone(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    fn rms(x: &[f64]) -> f64 {
        (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
    }

    #[test]
    fn test_linear_detrend_removes_ramp() {
        let ramp: Vec<f64> = (0..100).map(|i| 3.0 - 0.25 * i as f64).collect();
        let out = detrend(&ramp, Detrend::Linear);
        assert!(out.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn test_constant_detrend_zero_mean() {
        let out = detrend(&[1.0, 2.0, 3.0, 6.0], Detrend::Constant);
        assert_relative_eq!(out.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(out[3], 3.0);
    }

    #[test]
    fn test_tukey_edges_and_plateau() {
        let w = tukey_window(101, 0.2);
        assert_relative_eq!(w[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(w[100], 0.0, epsilon = 1e-12);
        assert_relative_eq!(w[50], 1.0);
        for i in 0..101 {
            assert_relative_eq!(w[i], w[100 - i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_tukey_zero_alpha_is_rectangular() {
        assert!(tukey_window(16, 0.0).iter().all(|&w| w == 1.0));
    }

    #[test]
    fn test_bandpass_keeps_passband_rejects_stopband() {
        let fs = 200.0;
        let n = 4000;
        let pass = bandpass(&tone(10.0, fs, n), fs, 5.0, 20.0, 4).unwrap();
        let stop = bandpass(&tone(60.0, fs, n), fs, 5.0, 20.0, 4).unwrap();
        // Skip the edges, where the filter still rings.
        let mid = 500..n - 500;
        assert!(rms(&pass[mid.clone()]) > 0.6);
        assert!(rms(&stop[mid]) < 0.01);
    }

    #[test]
    fn test_bandpass_odd_order_runs() {
        let fs = 100.0;
        let out = bandpass(&tone(5.0, fs, 1000), fs, 2.0, 10.0, 3).unwrap();
        assert_eq!(out.len(), 1000);
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_bandpass_rejects_bad_band() {
        let x = vec![0.0; 32];
        assert!(bandpass(&x, 100.0, 10.0, 5.0, 4).is_err());
        assert!(bandpass(&x, 100.0, 1.0, 50.0, 4).is_err());
        assert!(bandpass(&x, 100.0, 1.0, 10.0, 0).is_err());
    }
}
