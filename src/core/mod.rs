//! Core data types and file I/O.

pub mod loaders;
pub mod writers;

pub use loaders::{load_spectra, validate, LoaderError, Orientation, SpectrumSet, ValidationError};
pub use writers::{output_filename, write_processed_csv, WriteError};
