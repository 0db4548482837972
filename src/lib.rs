//! Microtremor - surface-wave dispersion from ambient-noise arrays
//!
//! Estimates phase velocity as a function of frequency from synchronized
//! recordings of a spatial sensor array, using two independent techniques:
//! Spatial Autocorrelation (SPAC) between station pairs and
//! frequency-wavenumber (FK) beamforming over the whole array.
//!
//! Per-bin numerical degeneracies never abort a curve. They are logged and
//! reported as `f64::NAN` (the undefined sentinel) in the affected bin. Only
//! shape and precondition violations surface as [`MicrotremorError`].

pub mod array;
pub mod bessel;
pub mod config;
pub mod curve;
pub mod fk;
pub mod pipeline;
pub mod preprocess;
pub mod quality;
pub mod roots;
pub mod sim;
pub mod spac;
pub mod spectral;

use thiserror::Error;

// Re-export main types
pub use array::ArrayDataset;
pub use config::AnalysisConfig;
pub use curve::{combine, DispersionCurve, FrequencyBand};
pub use fk::{FkBeamformer, FkPeak};
pub use pipeline::{Analyzer, SpacAnalysis};
pub use quality::{QualityGate, QualityReport};
pub use spac::{SearchBounds, SpacCoefficients, SpacInverter};
pub use spectral::{SpectralEstimator, SpectralPair};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MicrotremorError>;

/// Fatal errors: data-shape and precondition violations.
#[derive(Debug, Error)]
pub enum MicrotremorError {
    #[error("insufficient data: {required} samples required, {available} available")]
    InsufficientData { required: usize, available: usize },
    #[error("{context} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Non-fatal per-bin conditions. Each one resolves to the NaN sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BinWarning {
    #[error("non-physical value (zero frequency or |spac| > 1)")]
    NonPhysicalValue,
    #[error("no sign change inside the velocity search bounds")]
    RootNotBracketed,
    #[error("beam power peaks at zero slowness")]
    DegenerateSlowness,
}
