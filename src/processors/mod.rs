//! Statistical adjustment stages and session-based processing.

pub mod integrate;
pub mod normalize;
pub mod quantify;
pub mod scale;
pub mod transform;

// Re-export key types for convenience
pub use integrate::{IntegralTable, IntegrationSession, RegionIntegral, SessionError};
pub use normalize::normalize;
pub use quantify::{
    divide_by_protons, external_standard_factor, internal_standard_factors, Calibration, Cell,
    QuantError, QuantTable,
};
pub use scale::scale;
pub use transform::transform;

use thiserror::Error;

/// Errors shared by the transform, normalize, and scale stages.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("the input matrix is empty")]
    EmptyInput,

    #[error("invalid parameter {name}: {detail}")]
    InvalidParameter { name: &'static str, detail: String },

    #[error("invalid region: minimum {min} is not below maximum {max}")]
    InvalidRange { min: f64, max: f64 },

    #[error("no axis points fall in the region [{min}, {max}]")]
    EmptyRegion { min: f64, max: f64 },

    #[error("axis has {axis_len} points but the matrix has {cols} columns")]
    ShapeMismatch { axis_len: usize, cols: usize },

    #[error("an axis vector is required for internal-standard normalization")]
    MissingAxis,

    #[error("unrecognized method: {0}")]
    UnknownMethod(String),
}

/// Result type for stage operations.
pub type Result<T> = std::result::Result<T, StageError>;

/// True when the matrix holds zero elements.
pub(crate) fn is_empty_matrix(data: &[Vec<f64>]) -> bool {
    data.is_empty() || data.iter().all(|row| row.is_empty())
}

/// Global minimum over every element of the matrix.
pub(crate) fn matrix_min(data: &[Vec<f64>]) -> f64 {
    data.iter()
        .flat_map(|row| row.iter().copied())
        .fold(f64::INFINITY, f64::min)
}
