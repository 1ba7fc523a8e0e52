//! Configuration types for the spectral pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the transform stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Transform method: none, log, glog, sqrt
    #[serde(default = "default_transform_method")]
    pub method: String,

    /// Stabilization offset for log and sqrt shifting
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    /// Logarithm base: e, 2, 10
    #[serde(default = "default_log_base")]
    pub base: String,

    /// Lambda parameter of the generalized logarithm
    #[serde(default = "default_glog_lambda")]
    pub glog_lambda: f64,
}

fn default_transform_method() -> String {
    "none".to_string()
}

fn default_epsilon() -> f64 {
    1e-6
}

fn default_log_base() -> String {
    "e".to_string()
}

fn default_glog_lambda() -> f64 {
    1.0
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            method: default_transform_method(),
            epsilon: default_epsilon(),
            base: default_log_base(),
            glog_lambda: default_glog_lambda(),
        }
    }
}

/// Configuration for the normalize stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Normalization method: none, total_area, pqn, vector, internal_standard
    #[serde(default = "default_normalize_method")]
    pub method: String,

    /// Target row sum for total-area normalization
    #[serde(default = "default_scale_to")]
    pub scale_to: f64,

    /// Lower bound of the internal-standard reference region (ppm)
    #[serde(default)]
    pub ppm_min: f64,

    /// Upper bound of the internal-standard reference region (ppm)
    #[serde(default = "default_ppm_max")]
    pub ppm_max: f64,
}

fn default_normalize_method() -> String {
    "none".to_string()
}

fn default_scale_to() -> f64 {
    100.0
}

fn default_ppm_max() -> f64 {
    10.0
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            method: default_normalize_method(),
            scale_to: default_scale_to(),
            ppm_min: 0.0,
            ppm_max: default_ppm_max(),
        }
    }
}

/// Configuration for the scale stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleConfig {
    /// Scaling method: none, auto, pareto, range, center
    #[serde(default = "default_scale_method")]
    pub method: String,

    /// Lower bound of the range-scaling target interval
    #[serde(default)]
    pub range_min: f64,

    /// Upper bound of the range-scaling target interval
    #[serde(default = "default_range_max")]
    pub range_max: f64,
}

fn default_scale_method() -> String {
    "none".to_string()
}

fn default_range_max() -> f64 {
    1.0
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            method: default_scale_method(),
            range_min: 0.0,
            range_max: default_range_max(),
        }
    }
}

/// Configuration for quantification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantConfig {
    /// Proton count used when a proton table entry is not numeric
    #[serde(default = "default_protons")]
    pub default_protons: f64,
}

fn default_protons() -> f64 {
    1.0
}

impl Default for QuantConfig {
    fn default() -> Self {
        Self {
            default_protons: default_protons(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub transform: TransformConfig,

    #[serde(default)]
    pub normalize: NormalizeConfig,

    #[serde(default)]
    pub scale: ScaleConfig,

    #[serde(default)]
    pub quantify: QuantConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
