//! Writers for processed spectral matrices.
//!
//! The processed-data writer reproduces the axis-major input layout so a
//! saved file loads back through [`crate::core::loaders::load_spectra`]
//! unchanged: first row holds the sample names, first column the axis, the
//! rest the per-sample intensities.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur during write operations.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
pub(crate) fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered CSV writer for the given path.
pub(crate) fn create_csv_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(csv::Writer::from_writer(BufWriter::new(file)))
}

/// Format a value for table output, fixing the decimal count when one is
/// given and using the shortest round-trip representation otherwise.
pub(crate) fn format_value(value: f64, decimals: Option<u32>) -> String {
    match decimals {
        Some(d) => format!("{:.*}", d as usize, value),
        None => value.to_string(),
    }
}

/// Write a processed intensity matrix in the axis-major file layout.
///
/// The first row is an empty corner cell followed by the sample names; each
/// following row is one axis value followed by that point's intensity in
/// every sample. Values use the shortest representation that parses back to
/// the same `f64`, so save followed by load reproduces the matrix exactly.
///
/// # Arguments
///
/// * `path` - Output file path (parent directories are created if needed)
/// * `axis` - Chemical-shift axis, length = number of data columns
/// * `data` - Intensity matrix, one row per sample
/// * `names` - Sample names, one per matrix row
pub fn write_processed_csv(
    path: &Path,
    axis: &[f64],
    data: &[Vec<f64>],
    names: &[String],
) -> Result<()> {
    let mut writer = create_csv_writer(path)?;
    let path_str = path.display().to_string();

    let mut header = Vec::with_capacity(names.len() + 1);
    header.push(String::new());
    header.extend(names.iter().cloned());
    writer.write_record(&header).map_err(|e| WriteError::Csv {
        path: path_str.clone(),
        source: e,
    })?;

    for (p, &x) in axis.iter().enumerate() {
        let mut record = Vec::with_capacity(data.len() + 1);
        record.push(x.to_string());
        for row in data {
            record.push(row.get(p).copied().unwrap_or(0.0).to_string());
        }
        writer.write_record(&record).map_err(|e| WriteError::Csv {
            path: path_str.clone(),
            source: e,
        })?;
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Derive an output path next to the input: `<stem><suffix><extension>`.
pub fn output_filename(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = input
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let name = format!("{}{}{}", stem, suffix, extension);
    match input.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}
