//! Row-wise normalization of intensity matrices.
//!
//! Normalization removes sample-to-sample amplitude bias: each spectrum is
//! rescaled by a per-sample factor so samples become comparable. All
//! functions are pure and shape-preserving.

use rayon::prelude::*;

use super::{is_empty_matrix, Result, StageError};
use crate::config::NormalizeConfig;

/// Replacement for denominators that would otherwise be zero.
const ZERO_GUARD: f64 = 1e-10;

/// Normalize each spectrum by its total area, then scale to `scale_to`.
///
/// Rows whose sum is exactly zero are divided by a small guard value
/// instead of being skipped, so an all-zero row stays all-zero rather than
/// turning into NaN.
pub fn total_area_normalization(data: &[Vec<f64>], scale_to: f64) -> Result<Vec<Vec<f64>>> {
    if is_empty_matrix(data) {
        return Err(StageError::EmptyInput);
    }

    Ok(data
        .par_iter()
        .map(|row| {
            let mut sum: f64 = row.iter().sum();
            if sum == 0.0 {
                sum = ZERO_GUARD;
            }
            row.iter().map(|&v| v / sum * scale_to).collect()
        })
        .collect())
}

/// Probabilistic quotient normalization.
///
/// The reference spectrum is the per-point median across samples; each
/// sample is divided by the median of its pointwise quotients against that
/// reference. Robust to a few strongly varying points, unlike total-area.
pub fn pqn_normalization(data: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    if is_empty_matrix(data) {
        return Err(StageError::EmptyInput);
    }

    let n_points = data[0].len();

    let mut reference = Vec::with_capacity(n_points);
    for p in 0..n_points {
        let mut column: Vec<f64> = data.iter().map(|row| row[p]).collect();
        let mut med = median(&mut column);
        if med == 0.0 {
            med = ZERO_GUARD;
        }
        reference.push(med);
    }

    Ok(data
        .par_iter()
        .map(|row| {
            let mut quotients: Vec<f64> = row
                .iter()
                .zip(reference.iter())
                .map(|(&v, &r)| v / r)
                .collect();
            let mut factor = median(&mut quotients);
            if factor == 0.0 {
                factor = ZERO_GUARD;
            }
            row.iter().map(|&v| v / factor).collect()
        })
        .collect())
}

/// Normalize each spectrum by its Euclidean norm.
pub fn vector_normalization(data: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    if is_empty_matrix(data) {
        return Err(StageError::EmptyInput);
    }

    Ok(data
        .par_iter()
        .map(|row| {
            let mut norm = row.iter().map(|&v| v * v).sum::<f64>().sqrt();
            if norm == 0.0 {
                norm = ZERO_GUARD;
            }
            row.iter().map(|&v| v / norm).collect()
        })
        .collect())
}

/// Normalize by the area of a reference region of the spectrum.
///
/// Selects every column whose axis value lies in `[ppm_min, ppm_max]`
/// inclusive, sums the selected columns per sample, and divides the whole
/// row by that reference area (guarded when the area is not positive).
pub fn internal_standard_normalization(
    data: &[Vec<f64>],
    axis: &[f64],
    ppm_min: f64,
    ppm_max: f64,
) -> Result<Vec<Vec<f64>>> {
    if is_empty_matrix(data) {
        return Err(StageError::EmptyInput);
    }
    if axis.len() != data[0].len() {
        return Err(StageError::ShapeMismatch {
            axis_len: axis.len(),
            cols: data[0].len(),
        });
    }
    if ppm_min >= ppm_max {
        return Err(StageError::InvalidRange {
            min: ppm_min,
            max: ppm_max,
        });
    }

    let selected: Vec<usize> = axis
        .iter()
        .enumerate()
        .filter(|(_, &x)| x >= ppm_min && x <= ppm_max)
        .map(|(i, _)| i)
        .collect();

    if selected.is_empty() {
        return Err(StageError::EmptyRegion {
            min: ppm_min,
            max: ppm_max,
        });
    }

    Ok(data
        .par_iter()
        .map(|row| {
            let mut area: f64 = selected.iter().map(|&i| row[i]).sum();
            if area <= 0.0 {
                area = ZERO_GUARD;
            }
            row.iter().map(|&v| v / area).collect()
        })
        .collect())
}

/// Apply the normalization selected by `method`: `total_area`, `pqn`,
/// `vector`, or `internal_standard`. The axis vector is only required for
/// `internal_standard`.
pub fn normalize(
    data: &[Vec<f64>],
    method: &str,
    axis: Option<&[f64]>,
    cfg: &NormalizeConfig,
) -> Result<Vec<Vec<f64>>> {
    match method.to_ascii_lowercase().as_str() {
        "total_area" => total_area_normalization(data, cfg.scale_to),
        "pqn" => pqn_normalization(data),
        "vector" => vector_normalization(data),
        "internal_standard" => {
            let axis = axis.ok_or(StageError::MissingAxis)?;
            internal_standard_normalization(data, axis, cfg.ppm_min, cfg.ppm_max)
        }
        other => Err(StageError::UnknownMethod(other.to_string())),
    }
}

/// Median with the midpoint-average convention for even counts. Sorts the
/// slice in place.
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}
