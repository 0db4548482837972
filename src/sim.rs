//! Synthetic array recordings
//!
//! Seeded generators for testing and demonstration: a single broadband plane
//! wave of known slowness, and a diffuse field of many plane waves arriving
//! from evenly spread azimuths with a frequency-dependent phase velocity.
//! Waves are synthesized in the frequency domain, so station delays are exact
//! (circular) at every DFT bin.

use std::f64::consts::{PI, TAU};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Uniform};
use rustfft::{num_complex::Complex64, FftPlanner};

use crate::array::ArrayDataset;
use crate::{MicrotremorError, Result};

/// Diffuse-field simulation configuration
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub sampling_rate: f64,
    pub n_samples: usize,
    /// Plane waves in the field, at evenly spaced azimuths
    pub n_waves: usize,
    /// Standard deviation of additive white noise, relative to unit signal RMS
    pub noise_sigma: f64,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 100.0,
            n_samples: 32_768,
            n_waves: 48,
            noise_sigma: 0.0,
            seed: 42,
        }
    }
}

/// Stations on a circle of `radius`, optionally with one at the centre.
///
/// The centre station, when present, is index 0. Ring stations start on the
/// +x axis and proceed counter-clockwise.
pub fn circular_array(n_ring: usize, radius: f64, with_center: bool) -> Vec<[f64; 2]> {
    let mut coords = Vec::with_capacity(n_ring + 1);
    if with_center {
        coords.push([0.0, 0.0]);
    }
    for k in 0..n_ring {
        let theta = TAU * k as f64 / n_ring as f64;
        coords.push([radius * theta.cos(), radius * theta.sin()]);
    }
    coords
}

/// Broadband plane wave with slowness vector `slowness` (s/m) across `coords`.
///
/// Station `k` records the same random-phase signal delayed by `slowness·r_k`.
pub fn plane_wave_noise(
    coords: &[[f64; 2]],
    slowness: [f64; 2],
    sampling_rate: f64,
    n_samples: usize,
    seed: u64,
) -> Result<Vec<Vec<f64>>> {
    check_shape(sampling_rate, n_samples)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let source = random_phase_spectrum(&mut rng, n_samples);
    let freqs = bin_frequencies(n_samples, sampling_rate);

    let spectra = coords
        .iter()
        .map(|r| {
            let delay = slowness[0] * r[0] + slowness[1] * r[1];
            source
                .iter()
                .zip(&freqs)
                .map(|(&s, &f)| s * Complex64::from_polar(1.0, -2.0 * PI * f * delay))
                .collect()
        })
        .collect();

    Ok(normalize(synthesize(spectra, n_samples)))
}

/// Diffuse surface-wave field with phase velocity `velocity(f)` in m/s.
pub fn simulate_diffuse_field<V>(
    config: &SimConfig,
    coords: Vec<[f64; 2]>,
    velocity: V,
) -> Result<ArrayDataset>
where
    V: Fn(f64) -> f64,
{
    check_shape(config.sampling_rate, config.n_samples)?;
    if config.n_waves == 0 {
        return Err(MicrotremorError::InvalidParameter(
            "diffuse field needs at least one wave".to_string(),
        ));
    }

    let n = config.n_samples;
    let freqs = bin_frequencies(n, config.sampling_rate);
    let slowness: Vec<f64> = freqs
        .iter()
        .map(|&f| {
            let c = velocity(f.abs());
            if c.is_finite() && c > 0.0 {
                Ok(1.0 / c)
            } else {
                Err(MicrotremorError::InvalidParameter(format!(
                    "phase velocity must be positive at {f} Hz, got {c}"
                )))
            }
        })
        .collect::<Result<_>>()?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let offset = rng.gen::<f64>() * TAU / config.n_waves as f64;
    let mut spectra = vec![vec![Complex64::new(0.0, 0.0); n]; coords.len()];

    for w in 0..config.n_waves {
        let azimuth = offset + TAU * w as f64 / config.n_waves as f64;
        let direction = [azimuth.sin(), azimuth.cos()];
        let source = random_phase_spectrum(&mut rng, n);

        for (spectrum, r) in spectra.iter_mut().zip(&coords) {
            let along = direction[0] * r[0] + direction[1] * r[1];
            for ((bin, &s), (&f, &p)) in spectrum
                .iter_mut()
                .zip(&source)
                .zip(freqs.iter().zip(&slowness))
            {
                *bin += s * Complex64::from_polar(1.0, -2.0 * PI * f * p * along);
            }
        }
    }

    let mut data = normalize(synthesize(spectra, n));
    if config.noise_sigma > 0.0 {
        add_noise(&mut data, config.noise_sigma, config.seed.wrapping_add(1))?;
    }

    ArrayDataset::new(data, config.sampling_rate, coords)
}

/// Add independent Gaussian noise to every channel.
pub fn add_noise(data: &mut [Vec<f64>], sigma: f64, seed: u64) -> Result<()> {
    let dist = Normal::new(0.0, sigma)
        .map_err(|e| MicrotremorError::InvalidParameter(format!("noise sigma {sigma}: {e}")))?;
    let mut rng = StdRng::seed_from_u64(seed);
    for series in data.iter_mut() {
        for v in series.iter_mut() {
            *v += dist.sample(&mut rng);
        }
    }
    Ok(())
}

fn check_shape(sampling_rate: f64, n_samples: usize) -> Result<()> {
    if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
        return Err(MicrotremorError::InvalidParameter(format!(
            "sampling rate must be positive, got {sampling_rate}"
        )));
    }
    if n_samples < 4 {
        return Err(MicrotremorError::InsufficientData {
            required: 4,
            available: n_samples,
        });
    }
    Ok(())
}

/// Signed frequency of every DFT bin.
fn bin_frequencies(n: usize, sampling_rate: f64) -> Vec<f64> {
    crate::fk::fft_frequencies(n, sampling_rate)
}

/// Hermitian spectrum with unit magnitude and uniform random phase.
///
/// DC and (for even `n`) Nyquist are zero so the time series is real.
fn random_phase_spectrum(rng: &mut StdRng, n: usize) -> Vec<Complex64> {
    let phase = Uniform::new(0.0, TAU);
    let mut spectrum = vec![Complex64::new(0.0, 0.0); n];
    for k in 1..(n + 1) / 2 {
        let bin = Complex64::from_polar(1.0, phase.sample(rng));
        spectrum[k] = bin;
        spectrum[n - k] = bin.conj();
    }
    spectrum
}

fn synthesize(spectra: Vec<Vec<Complex64>>, n: usize) -> Vec<Vec<f64>> {
    let ifft = FftPlanner::<f64>::new().plan_fft_inverse(n);
    spectra
        .into_iter()
        .map(|mut buf| {
            ifft.process(&mut buf);
            buf.iter().map(|c| c.re / n as f64).collect()
        })
        .collect()
}

/// Scale all channels by one common factor to unit mean-square amplitude.
fn normalize(mut data: Vec<Vec<f64>>) -> Vec<Vec<f64>> {
    let count: usize = data.iter().map(Vec::len).sum();
    let power: f64 = data.iter().flatten().map(|v| v * v).sum::<f64>() / count.max(1) as f64;
    if power > 0.0 {
        let scale = 1.0 / power.sqrt();
        for v in data.iter_mut().flatten() {
            *v *= scale;
        }
    }
    data
}
