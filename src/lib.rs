//! Numeric pipeline for tabular NMR spectroscopy measurements.
//!
//! This crate provides tools for:
//! - Loading delimited spectral files into axis/matrix/sample-name triples
//! - Row-wise statistical adjustment: transform, normalize, scale
//! - Region-based peak integration with running per-sample totals
//! - Concentration calibration against external or internal standards
//!
//! # Example
//!
//! ```no_run
//! use nmr_pipeline::core::loaders::{load_spectra, validate, Orientation};
//! use nmr_pipeline::processors::normalize::total_area_normalization;
//!
//! let set = load_spectra("spectra.csv", Orientation::AxisMajor).unwrap();
//! validate(&set).unwrap();
//! let normalized = total_area_normalization(&set.intensities, 100.0).unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{NormalizeConfig, PipelineConfig, QuantConfig, ScaleConfig, TransformConfig};
pub use crate::core::loaders::{load_spectra, validate, Orientation, SpectrumSet};
pub use processors::{Calibration, IntegrationSession, StageError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
