//! Array dataset
//!
//! Synchronized multi-station recordings, their sampling rate and the
//! horizontal station coordinates. A dataset is read-only once built;
//! preprocessing returns a new dataset.

use std::sync::OnceLock;

use tracing::debug;

use crate::preprocess::{self, Detrend};
use crate::{MicrotremorError, Result};

/// Euclidean distance between stations `i < j`, in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationPairDistance {
    pub i: usize,
    pub j: usize,
    pub distance: f64,
}

/// Synchronized recordings from a 2D sensor array
#[derive(Debug)]
pub struct ArrayDataset {
    data: Vec<Vec<f64>>,
    sampling_rate: f64,
    coordinates: Vec<[f64; 2]>,
    distances: OnceLock<Vec<StationPairDistance>>,
}

impl ArrayDataset {
    /// Build a dataset.
    ///
    /// # Arguments
    /// * `data` - One time series per station, all the same length
    /// * `sampling_rate` - Sampling rate in Hz
    /// * `coordinates` - `[x, y]` station positions in meters, index-aligned with `data`
    pub fn new(data: Vec<Vec<f64>>, sampling_rate: f64, coordinates: Vec<[f64; 2]>) -> Result<Self> {
        if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
            return Err(MicrotremorError::InvalidParameter(format!(
                "sampling rate must be positive and finite, got {sampling_rate}"
            )));
        }
        if data.is_empty() {
            return Err(MicrotremorError::InvalidParameter(
                "dataset must contain at least one station".to_string(),
            ));
        }
        if coordinates.len() != data.len() {
            return Err(MicrotremorError::LengthMismatch {
                context: "coordinates",
                expected: data.len(),
                got: coordinates.len(),
            });
        }
        let n_samples = data[0].len();
        if let Some(bad) = data.iter().find(|series| series.len() != n_samples) {
            return Err(MicrotremorError::LengthMismatch {
                context: "station series",
                expected: n_samples,
                got: bad.len(),
            });
        }

        debug!(
            stations = data.len(),
            samples = n_samples,
            sampling_rate,
            "array dataset constructed"
        );

        Ok(Self {
            data,
            sampling_rate,
            coordinates,
            distances: OnceLock::new(),
        })
    }

    pub fn n_stations(&self) -> usize {
        self.data.len()
    }

    pub fn n_samples(&self) -> usize {
        self.data[0].len()
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn coordinates(&self) -> &[[f64; 2]] {
        &self.coordinates
    }

    /// All station series
    pub fn data(&self) -> &[Vec<f64>] {
        &self.data
    }

    /// Time series of one station
    pub fn series(&self, station: usize) -> &[f64] {
        &self.data[station]
    }

    /// Distances for every unordered pair `(i, j)` with `i < j`, computed once.
    pub fn distances(&self) -> &[StationPairDistance] {
        self.distances.get_or_init(|| {
            let n = self.n_stations();
            let mut pairs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
            for i in 0..n {
                for j in (i + 1)..n {
                    pairs.push(StationPairDistance {
                        i,
                        j,
                        distance: euclidean(self.coordinates[i], self.coordinates[j]),
                    });
                }
            }
            pairs
        })
    }

    /// Distance between two stations, either order.
    pub fn distance(&self, a: usize, b: usize) -> Result<f64> {
        let n = self.n_stations();
        if a >= n || b >= n {
            return Err(MicrotremorError::InvalidParameter(format!(
                "station index out of range: ({a}, {b}) with {n} stations"
            )));
        }
        if a == b {
            return Ok(0.0);
        }
        let (i, j) = if a < b { (a, b) } else { (b, a) };
        // Row-major position of (i, j) in the upper triangle.
        let idx = i * (2 * n - i - 1) / 2 + (j - i - 1);
        Ok(self.distances()[idx].distance)
    }

    /// Detrend and taper every channel, returning a new dataset.
    ///
    /// `taper` is the Tukey fraction in `[0, 1]`; zero disables tapering.
    pub fn preprocess(&self, detrend: Detrend, taper: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&taper) {
            return Err(MicrotremorError::InvalidParameter(format!(
                "taper fraction must be in [0, 1], got {taper}"
            )));
        }
        let data = self
            .data
            .iter()
            .map(|series| {
                let detrended = preprocess::detrend(series, detrend);
                if taper > 0.0 {
                    preprocess::taper(&detrended, taper)
                } else {
                    detrended
                }
            })
            .collect();
        self.derived(data)
    }

    /// Zero-phase Butterworth bandpass on every channel, returning a new dataset.
    pub fn bandpass(&self, fmin: f64, fmax: f64, corners: usize) -> Result<Self> {
        let data = self
            .data
            .iter()
            .map(|series| preprocess::bandpass(series, self.sampling_rate, fmin, fmax, corners))
            .collect::<Result<Vec<_>>>()?;
        self.derived(data)
    }

    fn derived(&self, data: Vec<Vec<f64>>) -> Result<Self> {
        Self::new(data, self.sampling_rate, self.coordinates.clone())
    }
}

impl Clone for ArrayDataset {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            sampling_rate: self.sampling_rate,
            coordinates: self.coordinates.clone(),
            distances: OnceLock::new(),
        }
    }
}

fn euclidean(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn triangle() -> ArrayDataset {
        let data = vec![vec![0.0; 16]; 3];
        let coords = vec![[0.0, 0.0], [3.0, 0.0], [0.0, 4.0]];
        ArrayDataset::new(data, 100.0, coords).unwrap()
    }

    #[test]
    fn test_distances_all_pairs() {
        let ds = triangle();
        let d = ds.distances();
        assert_eq!(d.len(), 3);
        assert_eq!((d[0].i, d[0].j), (0, 1));
        assert_relative_eq!(d[0].distance, 3.0);
        assert_relative_eq!(d[1].distance, 4.0);
        assert_relative_eq!(d[2].distance, 5.0);
    }

    #[test]
    fn test_distance_lookup_either_order() {
        let ds = triangle();
        assert_relative_eq!(ds.distance(2, 1).unwrap(), 5.0);
        assert_relative_eq!(ds.distance(1, 2).unwrap(), 5.0);
        assert_eq!(ds.distance(1, 1).unwrap(), 0.0);
        assert!(ds.distance(0, 3).is_err());
    }

    #[test]
    fn test_rejects_coordinate_mismatch() {
        let err = ArrayDataset::new(vec![vec![0.0; 8]; 2], 10.0, vec![[0.0, 0.0]]).unwrap_err();
        assert!(matches!(err, MicrotremorError::LengthMismatch { .. }));
    }

    #[test]
    fn test_rejects_ragged_series() {
        let data = vec![vec![0.0; 8], vec![0.0; 7]];
        let err = ArrayDataset::new(data, 10.0, vec![[0.0, 0.0], [1.0, 0.0]]).unwrap_err();
        assert!(matches!(err, MicrotremorError::LengthMismatch { .. }));
    }

    #[test]
    fn test_rejects_bad_sampling_rate() {
        let data = vec![vec![0.0; 8]];
        assert!(ArrayDataset::new(data.clone(), 0.0, vec![[0.0, 0.0]]).is_err());
        assert!(ArrayDataset::new(data, f64::NAN, vec![[0.0, 0.0]]).is_err());
    }

    #[test]
    fn test_preprocess_leaves_source_untouched() {
        let ramp: Vec<f64> = (0..64).map(|i| 2.0 + 0.5 * i as f64).collect();
        let ds = ArrayDataset::new(vec![ramp.clone()], 50.0, vec![[0.0, 0.0]]).unwrap();
        let processed = ds.preprocess(Detrend::Linear, 0.0).unwrap();
        assert_eq!(ds.series(0), ramp.as_slice());
        assert!(processed.series(0).iter().all(|v| v.abs() < 1e-9));
    }
}
