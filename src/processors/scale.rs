//! Column-wise (feature-wise) scaling of intensity matrices.
//!
//! Scaling adjusts each spectral point across samples so downstream
//! modeling sees comparable feature variances. All functions are pure and
//! shape-preserving; statistics use the population convention (divide by
//! n), matching the rest of the pipeline.

use rayon::prelude::*;

use super::{is_empty_matrix, Result, StageError};
use crate::config::ScaleConfig;

/// Per-column means of the matrix.
fn column_means(data: &[Vec<f64>]) -> Vec<f64> {
    let n_rows = data.len() as f64;
    let n_cols = data[0].len();
    let mut means = vec![0.0; n_cols];
    for row in data {
        for (m, &v) in means.iter_mut().zip(row.iter()) {
            *m += v;
        }
    }
    for m in &mut means {
        *m /= n_rows;
    }
    means
}

/// Per-column population standard deviations, given the column means.
fn column_stds(data: &[Vec<f64>], means: &[f64]) -> Vec<f64> {
    let n_rows = data.len() as f64;
    let mut vars = vec![0.0; means.len()];
    for row in data {
        for (v, (&x, &m)) in vars.iter_mut().zip(row.iter().zip(means.iter())) {
            let d = x - m;
            *v += d * d;
        }
    }
    vars.iter().map(|&v| (v / n_rows).sqrt()).collect()
}

/// Autoscaling (z-score): center each column and divide by its standard
/// deviation. Zero standard deviations are replaced by 1.0.
pub fn autoscaling(data: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    if is_empty_matrix(data) {
        return Err(StageError::EmptyInput);
    }

    let means = column_means(data);
    let stds: Vec<f64> = column_stds(data, &means)
        .into_iter()
        .map(|s| if s == 0.0 { 1.0 } else { s })
        .collect();

    Ok(data
        .par_iter()
        .map(|row| {
            row.iter()
                .zip(means.iter().zip(stds.iter()))
                .map(|(&v, (&m, &s))| (v - m) / s)
                .collect()
        })
        .collect())
}

/// Pareto scaling: center each column and divide by the square root of its
/// standard deviation. Zero standard deviations are replaced by 1.0 before
/// the root.
pub fn pareto_scaling(data: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    if is_empty_matrix(data) {
        return Err(StageError::EmptyInput);
    }

    let means = column_means(data);
    let stds: Vec<f64> = column_stds(data, &means)
        .into_iter()
        .map(|s| if s == 0.0 { 1.0 } else { s })
        .collect();

    Ok(data
        .par_iter()
        .map(|row| {
            row.iter()
                .zip(means.iter().zip(stds.iter()))
                .map(|(&v, (&m, &s))| (v - m) / s.sqrt())
                .collect()
        })
        .collect())
}

/// Min-max scale each column to `[0, 1]`, then remap linearly onto the
/// requested target interval. Zero column ranges are replaced by 1.0.
pub fn range_scaling(data: &[Vec<f64>], feature_range: (f64, f64)) -> Result<Vec<Vec<f64>>> {
    if is_empty_matrix(data) {
        return Err(StageError::EmptyInput);
    }
    let (target_min, target_max) = feature_range;
    if target_min >= target_max {
        return Err(StageError::InvalidParameter {
            name: "feature_range",
            detail: format!(
                "minimum {} is not below maximum {}",
                target_min, target_max
            ),
        });
    }

    let n_cols = data[0].len();
    let mut mins = vec![f64::INFINITY; n_cols];
    let mut maxs = vec![f64::NEG_INFINITY; n_cols];
    for row in data {
        for ((min, max), &v) in mins.iter_mut().zip(maxs.iter_mut()).zip(row.iter()) {
            *min = min.min(v);
            *max = max.max(v);
        }
    }
    let ranges: Vec<f64> = mins
        .iter()
        .zip(maxs.iter())
        .map(|(&min, &max)| {
            let r = max - min;
            if r == 0.0 {
                1.0
            } else {
                r
            }
        })
        .collect();

    let span = target_max - target_min;
    Ok(data
        .par_iter()
        .map(|row| {
            row.iter()
                .zip(mins.iter().zip(ranges.iter()))
                .map(|(&v, (&min, &range))| (v - min) / range * span + target_min)
                .collect()
        })
        .collect())
}

/// Center each column at zero by subtracting its mean.
pub fn mean_centering(data: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    if is_empty_matrix(data) {
        return Err(StageError::EmptyInput);
    }

    let means = column_means(data);
    Ok(data
        .par_iter()
        .map(|row| {
            row.iter()
                .zip(means.iter())
                .map(|(&v, &m)| v - m)
                .collect()
        })
        .collect())
}

/// Apply the scaling selected by `method`: `auto`, `pareto`, `range`, or
/// `center`. An unrecognized method name is rejected.
pub fn scale(data: &[Vec<f64>], method: &str, cfg: &ScaleConfig) -> Result<Vec<Vec<f64>>> {
    match method.to_ascii_lowercase().as_str() {
        "auto" => autoscaling(data),
        "pareto" => pareto_scaling(data),
        "range" => range_scaling(data, (cfg.range_min, cfg.range_max)),
        "center" => mean_centering(data),
        other => Err(StageError::UnknownMethod(other.to_string())),
    }
}
