//! Analysis parameters
//!
//! Every stage reads its parameters from one serde-deserializable tree that
//! can be loaded from TOML. Missing keys fall back to the defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::curve::FrequencyBand;
use crate::fk::{FkBeamformer, SlownessRange};
use crate::preprocess::Detrend;
use crate::quality::QualityGate;
use crate::spac::{SearchBounds, SpacInverter};
use crate::spectral::SpectralEstimator;
use crate::{MicrotremorError, Result};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub preprocess: PreprocessConfig,
    pub spectral: SpectralConfig,
    pub spac: SpacConfig,
    pub fk: FkConfig,
    pub quality: QualityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub detrend: Detrend,
    /// Tukey taper fraction; 0 disables tapering
    pub taper: f64,
    pub bandpass: Option<BandpassConfig>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            detrend: Detrend::Linear,
            taper: 0.05,
            bandpass: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandpassConfig {
    pub fmin: f64,
    pub fmax: f64,
    #[serde(default = "default_corners")]
    pub corners: usize,
}

fn default_corners() -> usize {
    4
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    pub segment_length: Option<usize>,
    pub overlap_length: Option<usize>,
}

impl SpectralConfig {
    pub fn estimator(&self) -> SpectralEstimator {
        SpectralEstimator {
            segment_length: self.segment_length,
            overlap_length: self.overlap_length,
            ..SpectralEstimator::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpacConfig {
    pub search_bounds: SearchBounds,
}

impl SpacConfig {
    pub fn inverter(&self) -> Result<SpacInverter> {
        SpacInverter::new(self.search_bounds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FkConfig {
    pub frequency_range: FrequencyBand,
    pub slowness_range: SlownessRange,
    pub grid_size: usize,
    pub parallel: bool,
}

impl Default for FkConfig {
    fn default() -> Self {
        Self {
            frequency_range: FrequencyBand::new(1.0, 20.0),
            slowness_range: SlownessRange::new(0.0, 0.01),
            grid_size: FkBeamformer::DEFAULT_GRID_SIZE,
            parallel: true,
        }
    }
}

impl FkConfig {
    pub fn beamformer(&self) -> Result<FkBeamformer> {
        let mut fk = FkBeamformer::new(self.frequency_range, self.slowness_range, self.grid_size)?;
        fk.parallel = self.parallel;
        Ok(fk)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_coherence: f64,
    /// Drop unusable bins from pair curves before combining
    pub mask_curves: bool,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_coherence: 0.8,
            mask_curves: false,
        }
    }
}

impl QualityConfig {
    pub fn gate(&self) -> QualityGate {
        QualityGate::new(self.min_coherence)
    }
}

impl AnalysisConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: AnalysisConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.preprocess;
        if !(0.0..=1.0).contains(&p.taper) {
            return Err(MicrotremorError::InvalidConfig(
                "preprocess.taper must be in [0, 1]".to_string(),
            ));
        }
        if let Some(bp) = p.bandpass {
            if bp.corners == 0 {
                return Err(MicrotremorError::InvalidConfig(
                    "preprocess.bandpass.corners must be at least 1".to_string(),
                ));
            }
            if !(bp.fmin > 0.0 && bp.fmin < bp.fmax) {
                return Err(MicrotremorError::InvalidConfig(
                    "preprocess.bandpass requires 0 < fmin < fmax".to_string(),
                ));
            }
        }

        let s = &self.spectral;
        if s.segment_length == Some(0) {
            return Err(MicrotremorError::InvalidConfig(
                "spectral.segment_length must be greater than zero".to_string(),
            ));
        }
        if let (Some(seg), Some(ov)) = (s.segment_length, s.overlap_length) {
            if ov >= seg {
                return Err(MicrotremorError::InvalidConfig(
                    "spectral.overlap_length must be smaller than segment_length".to_string(),
                ));
            }
        }

        self.spac
            .search_bounds
            .validate()
            .map_err(|e| MicrotremorError::InvalidConfig(format!("spac.search_bounds: {e}")))?;
        self.fk
            .beamformer()
            .map_err(|e| MicrotremorError::InvalidConfig(format!("fk: {e}")))?;

        if !(0.0..=1.0).contains(&self.quality.min_coherence) {
            return Err(MicrotremorError::InvalidConfig(
                "quality.min_coherence must be in [0, 1]".to_string(),
            ));
        }

        Ok(())
    }
}
