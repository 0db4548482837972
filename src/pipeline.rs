//! End-to-end analysis
//!
//! Wires the stages together: conditioning, per-pair (or ring-averaged)
//! spectra, SPAC coefficients, velocity inversion and quality gating on one
//! side, FK beamforming on the other, and curve combination at the end.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::array::ArrayDataset;
use crate::config::AnalysisConfig;
use crate::curve::{self, DispersionCurve, FrequencyBand};
use crate::quality::{QualityGate, QualityReport};
use crate::spac::{SpacCoefficients, SpacInverter};
use crate::spectral::SpectralEstimator;
use crate::{MicrotremorError, Result};

/// SPAC result for one station pair or one averaged ring of pairs
#[derive(Debug, Clone)]
pub struct SpacAnalysis {
    /// Station pairs `(i, j)` that contributed
    pub pairs: Vec<(usize, usize)>,
    /// Inter-station distance used for inversion, in meters
    pub distance: f64,
    pub coefficients: SpacCoefficients,
    /// Inverted curve; restricted to usable bins when the config asks for masking
    pub curve: DispersionCurve,
    pub quality: QualityReport,
}

/// Runs the configured pipeline on array datasets
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: AnalysisConfig,
    estimator: SpectralEstimator,
    inverter: SpacInverter,
    gate: QualityGate,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            estimator: config.spectral.estimator(),
            inverter: config.spac.inverter()?,
            gate: config.quality.gate(),
            config,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Detrend, taper and (optionally) bandpass every channel.
    pub fn prepare(&self, dataset: &ArrayDataset) -> Result<ArrayDataset> {
        let p = &self.config.preprocess;
        let conditioned = dataset.preprocess(p.detrend, p.taper)?;
        match p.bandpass {
            Some(bp) => conditioned.bandpass(bp.fmin, bp.fmax, bp.corners),
            None => Ok(conditioned),
        }
    }

    /// SPAC analysis of stations `i` and `j`.
    pub fn analyze_pair(&self, dataset: &ArrayDataset, i: usize, j: usize) -> Result<SpacAnalysis> {
        let distance = dataset.distance(i, j)?;
        let coefficients = self.pair_coefficients(dataset, i, j)?;
        self.finish(vec![(i, j)], distance, coefficients)
    }

    /// SPAC analysis of every station pair, in `(i, j)` order with `i < j`.
    pub fn analyze_all_pairs(&self, dataset: &ArrayDataset) -> Result<Vec<SpacAnalysis>> {
        let results = dataset
            .distances()
            .par_iter()
            .map(|pair| self.analyze_pair(dataset, pair.i, pair.j))
            .collect::<Result<Vec<_>>>()?;
        info!(pairs = results.len(), "all station pairs analysed");
        Ok(results)
    }

    /// Ring-averaged SPAC between `center` and each station of `ring`.
    ///
    /// Coefficients are averaged over the pairs bin by bin, ignoring undefined
    /// values, and inverted with the mean centre-to-ring distance.
    pub fn analyze_ring(
        &self,
        dataset: &ArrayDataset,
        center: usize,
        ring: &[usize],
    ) -> Result<SpacAnalysis> {
        if ring.is_empty() {
            return Err(MicrotremorError::InvalidParameter(
                "ring needs at least one station".to_string(),
            ));
        }

        let mut pairs = Vec::with_capacity(ring.len());
        let mut distance = 0.0;
        let mut per_pair = Vec::with_capacity(ring.len());
        for &station in ring {
            if station == center {
                return Err(MicrotremorError::InvalidParameter(format!(
                    "ring station {station} is the centre station"
                )));
            }
            distance += dataset.distance(center, station)?;
            per_pair.push(self.pair_coefficients(dataset, center, station)?);
            pairs.push((center, station));
        }
        distance /= ring.len() as f64;

        let frequencies = per_pair[0].frequencies.clone();
        let spac = nan_mean(per_pair.iter().map(|c| c.spac.as_slice()), frequencies.len());
        let coherence = nan_mean(per_pair.iter().map(|c| c.coherence.as_slice()), frequencies.len());

        debug!(center, stations = ring.len(), distance, "ring-averaged SPAC");
        self.finish(
            pairs,
            distance,
            SpacCoefficients {
                frequencies,
                spac,
                coherence,
            },
        )
    }

    /// FK dispersion curve of the whole array.
    pub fn analyze_fk(&self, dataset: &ArrayDataset) -> Result<DispersionCurve> {
        self.config.fk.beamformer()?.estimate(dataset)
    }

    /// Composite curve from several SPAC analyses, each limited to its band.
    pub fn combine(
        &self,
        analyses: &[SpacAnalysis],
        bands: Option<&[FrequencyBand]>,
    ) -> Result<DispersionCurve> {
        let curves: Vec<DispersionCurve> = analyses.iter().map(|a| a.curve.clone()).collect();
        curve::combine(&curves, bands)
    }

    fn pair_coefficients(&self, dataset: &ArrayDataset, i: usize, j: usize) -> Result<SpacCoefficients> {
        let spectra = self
            .estimator
            .estimate(dataset.series(i), dataset.series(j), dataset.sampling_rate())?;
        Ok(self.inverter.coefficient(&spectra))
    }

    fn finish(
        &self,
        pairs: Vec<(usize, usize)>,
        distance: f64,
        coefficients: SpacCoefficients,
    ) -> Result<SpacAnalysis> {
        let raw = self
            .inverter
            .invert_curve(&coefficients.frequencies, &coefficients.spac, distance)?;
        let quality = self.gate.evaluate(
            &coefficients.frequencies,
            &coefficients.spac,
            &coefficients.coherence,
        )?;
        let curve = if self.config.quality.mask_curves {
            quality.filter(&raw)?
        } else {
            raw
        };
        Ok(SpacAnalysis {
            pairs,
            distance,
            coefficients,
            curve,
            quality,
        })
    }
}

/// Bin-wise mean over several equal-length series, skipping NaN entries.
fn nan_mean<'a>(series: impl Iterator<Item = &'a [f64]>, len: usize) -> Vec<f64> {
    let mut sum = vec![0.0; len];
    let mut count = vec![0usize; len];
    for values in series {
        for ((s, c), &v) in sum.iter_mut().zip(count.iter_mut()).zip(values) {
            if !v.is_nan() {
                *s += v;
                *c += 1;
            }
        }
    }
    sum.into_iter()
        .zip(count)
        .map(|(s, c)| if c == 0 { f64::NAN } else { s / c as f64 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{circular_array, simulate_diffuse_field, SimConfig};

    fn small_dataset() -> ArrayDataset {
        let config = SimConfig {
            n_samples: 4096,
            n_waves: 16,
            ..Default::default()
        };
        simulate_diffuse_field(&config, circular_array(3, 5.0, true), |_| 300.0).unwrap()
    }

    #[test]
    fn test_nan_mean() {
        let a = [1.0, f64::NAN, f64::NAN];
        let b = [3.0, 2.0, f64::NAN];
        let m = nan_mean([&a[..], &b[..]].into_iter(), 3);
        assert_eq!(m[0], 2.0);
        assert_eq!(m[1], 2.0);
        assert!(m[2].is_nan());
    }

    #[test]
    fn test_all_pairs_in_order() {
        let ds = small_dataset();
        let analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
        let results = analyzer.analyze_all_pairs(&ds).unwrap();
        let pairs: Vec<(usize, usize)> = results.iter().map(|r| r.pairs[0]).collect();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]);
        for r in &results {
            assert_eq!(r.curve.len(), r.coefficients.frequencies.len());
            assert_eq!(r.quality.mask.len(), r.coefficients.frequencies.len());
        }
    }

    #[test]
    fn test_masking_shortens_curve() {
        let ds = small_dataset();
        let mut config = AnalysisConfig::default();
        config.quality.mask_curves = true;
        config.quality.min_coherence = 0.99;
        let analysis = Analyzer::new(config).unwrap().analyze_pair(&ds, 0, 1).unwrap();
        assert_eq!(analysis.curve.len(), analysis.quality.usable_count());
    }

    #[test]
    fn test_ring_rejects_centre_in_ring() {
        let ds = small_dataset();
        let analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
        assert!(analyzer.analyze_ring(&ds, 0, &[0, 1]).is_err());
        assert!(analyzer.analyze_ring(&ds, 0, &[]).is_err());
    }

    #[test]
    fn test_prepare_keeps_shape() {
        let ds = small_dataset();
        let mut config = AnalysisConfig::default();
        config.preprocess.bandpass = Some(crate::config::BandpassConfig {
            fmin: 1.0,
            fmax: 20.0,
            corners: 4,
        });
        let prepared = Analyzer::new(config).unwrap().prepare(&ds).unwrap();
        assert_eq!(prepared.n_stations(), ds.n_stations());
        assert_eq!(prepared.n_samples(), ds.n_samples());
    }
}
