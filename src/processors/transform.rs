//! Elementwise re-expression of intensity matrices.
//!
//! Every function is pure: it takes the matrix by reference and returns a
//! new matrix of identical shape. Per-row work is parallelized with Rayon.

use rayon::prelude::*;

use super::{is_empty_matrix, matrix_min, Result, StageError};
use crate::config::TransformConfig;

/// Logarithm base accepted by [`log_transform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogBase {
    E,
    Two,
    Ten,
}

impl LogBase {
    /// Parse the base from its user-facing name (`e`, `2`, `10`).
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "e" => Ok(LogBase::E),
            "2" => Ok(LogBase::Two),
            "10" => Ok(LogBase::Ten),
            other => Err(StageError::InvalidParameter {
                name: "base",
                detail: format!("unsupported logarithm base '{}'", other),
            }),
        }
    }

    fn apply(self, value: f64) -> f64 {
        match self {
            LogBase::E => value.ln(),
            LogBase::Two => value.log2(),
            LogBase::Ten => value.log10(),
        }
    }
}

/// Logarithmic transform.
///
/// If the global minimum of the matrix is at or below zero, the whole
/// matrix is shifted by `epsilon - min` first so every cell is a logarithm
/// of a strictly positive number.
pub fn log_transform(data: &[Vec<f64>], epsilon: f64, base: LogBase) -> Result<Vec<Vec<f64>>> {
    if is_empty_matrix(data) {
        return Err(StageError::EmptyInput);
    }
    if epsilon <= 0.0 {
        return Err(StageError::InvalidParameter {
            name: "epsilon",
            detail: format!("must be greater than zero, got {}", epsilon),
        });
    }

    let min = matrix_min(data);
    let shift = if min <= 0.0 { epsilon - min } else { 0.0 };

    Ok(data
        .par_iter()
        .map(|row| row.iter().map(|&v| base.apply(v + shift)).collect())
        .collect())
}

/// Generalized logarithm, `ln((x + sqrt(x^2 + lambda^2 + epsilon)) / 2*lambda)`.
///
/// Numerically stable for values near zero and for negative values.
pub fn glog_transform(data: &[Vec<f64>], lambda: f64, epsilon: f64) -> Result<Vec<Vec<f64>>> {
    if is_empty_matrix(data) {
        return Err(StageError::EmptyInput);
    }
    if lambda <= 0.0 {
        return Err(StageError::InvalidParameter {
            name: "lambda",
            detail: format!("must be greater than zero, got {}", lambda),
        });
    }

    let lambda_sq = lambda * lambda;
    Ok(data
        .par_iter()
        .map(|row| {
            row.iter()
                .map(|&v| {
                    let inside = v * v + lambda_sq + epsilon;
                    ((v + inside.sqrt()) / (2.0 * lambda)).ln()
                })
                .collect()
        })
        .collect())
}

/// Square-root transform.
///
/// The matrix is shifted by `epsilon - min` only when the global minimum is
/// negative.
pub fn sqrt_transform(data: &[Vec<f64>], epsilon: f64) -> Result<Vec<Vec<f64>>> {
    if is_empty_matrix(data) {
        return Err(StageError::EmptyInput);
    }

    let min = matrix_min(data);
    let shift = if min < 0.0 { epsilon - min } else { 0.0 };

    Ok(data
        .par_iter()
        .map(|row| row.iter().map(|&v| (v + shift).sqrt()).collect())
        .collect())
}

/// Apply the transform selected by `method`: `none`, `log`, `glog`, or
/// `sqrt`. Parameters come from the configuration; an unrecognized method
/// name is rejected.
pub fn transform(data: &[Vec<f64>], method: &str, cfg: &TransformConfig) -> Result<Vec<Vec<f64>>> {
    match method.to_ascii_lowercase().as_str() {
        "none" => {
            if is_empty_matrix(data) {
                return Err(StageError::EmptyInput);
            }
            Ok(data.to_vec())
        }
        "log" => log_transform(data, cfg.epsilon, LogBase::from_name(&cfg.base)?),
        "glog" => glog_transform(data, cfg.glog_lambda, cfg.epsilon),
        "sqrt" => sqrt_transform(data, cfg.epsilon),
        other => Err(StageError::UnknownMethod(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn test_log_positive_matrix_unshifted() {
        let data = vec![vec![1.0, std::f64::consts::E], vec![10.0, 100.0]];
        let out = log_transform(&data, 1e-6, LogBase::E).unwrap();

        assert_close(out[0][0], 0.0);
        assert_close(out[0][1], 1.0);
    }

    #[test]
    fn test_log_shifts_non_positive_matrix() {
        let data = vec![vec![0.0, 1.0]];
        let out = log_transform(&data, 1e-6, LogBase::E).unwrap();

        // min = 0 so each cell becomes ln(v + 1e-6)
        assert_close(out[0][0], (1e-6_f64).ln());
        assert_close(out[0][1], (1.0 + 1e-6_f64).ln());
    }

    #[test]
    fn test_log_bases() {
        let data = vec![vec![8.0, 100.0]];
        let out2 = log_transform(&data, 1e-6, LogBase::Two).unwrap();
        let out10 = log_transform(&data, 1e-6, LogBase::Ten).unwrap();

        assert_close(out2[0][0], 3.0);
        assert_close(out10[0][1], 2.0);
    }

    #[test]
    fn test_log_rejects_bad_epsilon() {
        let data = vec![vec![1.0]];
        let err = log_transform(&data, 0.0, LogBase::E).unwrap_err();
        assert!(matches!(
            err,
            StageError::InvalidParameter { name: "epsilon", .. }
        ));
    }

    #[test]
    fn test_log_base_from_name() {
        assert_eq!(LogBase::from_name("e").unwrap(), LogBase::E);
        assert_eq!(LogBase::from_name("2").unwrap(), LogBase::Two);
        assert_eq!(LogBase::from_name("10").unwrap(), LogBase::Ten);
        assert!(LogBase::from_name("3").is_err());
    }

    #[test]
    fn test_glog_handles_negative_values() {
        let data = vec![vec![-5.0, 0.0, 5.0]];
        let out = glog_transform(&data, 1.0, 1e-6).unwrap();

        for v in &out[0] {
            assert!(v.is_finite());
        }
        // glog(0) with lambda 1 is ln(sqrt(1 + eps) / 2) ~ ln(0.5)
        assert_close(out[0][1], ((1.0_f64 + 1e-6).sqrt() / 2.0).ln());
    }

    #[test]
    fn test_glog_rejects_bad_lambda() {
        let data = vec![vec![1.0]];
        let err = glog_transform(&data, 0.0, 1e-6).unwrap_err();
        assert!(matches!(
            err,
            StageError::InvalidParameter { name: "lambda", .. }
        ));
    }

    #[test]
    fn test_sqrt_non_negative_unshifted() {
        let data = vec![vec![0.0, 4.0, 9.0]];
        let out = sqrt_transform(&data, 1e-6).unwrap();

        assert_close(out[0][0], 0.0);
        assert_close(out[0][1], 2.0);
        assert_close(out[0][2], 3.0);
    }

    #[test]
    fn test_sqrt_shifts_negative_matrix() {
        let data = vec![vec![-4.0, 0.0]];
        let out = sqrt_transform(&data, 1e-6).unwrap();

        // shift = 1e-6 + 4
        assert_close(out[0][0], (1e-6_f64).sqrt());
        assert_close(out[0][1], (4.0 + 1e-6_f64).sqrt());
    }

    #[test]
    fn test_dispatch_none_copies() {
        let data = vec![vec![1.0, 2.0]];
        let out = transform(&data, "none", &TransformConfig::default()).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_dispatch_unknown_method() {
        let data = vec![vec![1.0]];
        let err = transform(&data, "boxcox", &TransformConfig::default()).unwrap_err();
        match err {
            StageError::UnknownMethod(name) => assert_eq!(name, "boxcox"),
            other => panic!("expected UnknownMethod, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_input_every_method() {
        let empty: Vec<Vec<f64>> = vec![];
        let cfg = TransformConfig::default();
        for method in ["none", "log", "glog", "sqrt"] {
            assert!(matches!(
                transform(&empty, method, &cfg).unwrap_err(),
                StageError::EmptyInput
            ));
        }
    }

    #[test]
    fn test_shape_preserved() {
        let data = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let cfg = TransformConfig::default();
        for method in ["log", "glog", "sqrt"] {
            let out = transform(&data, method, &cfg).unwrap();
            assert_eq!(out.len(), data.len());
            assert_eq!(out[0].len(), data[0].len());
        }
    }
}
