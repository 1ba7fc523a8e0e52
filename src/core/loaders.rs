//! Loading of delimited spectral matrix files.
//!
//! A spectral data file is a comma-delimited table carrying three things:
//! a chemical-shift axis, a sample name per spectrum, and an intensity
//! matrix. Two historical layouts exist and both are handled by one loader
//! parameterized by [`Orientation`].

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use log::warn;
use thiserror::Error;

/// Errors that can occur while loading a spectral data file.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("unsupported format '{extension}' for {path}: use .csv or .txt files")]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid numeric cell in {path}: {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("{path} holds no spectral data")]
    EmptyFile { path: PathBuf },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Table layout of a spectral data file.
///
/// Both layouts describe the same logical triple; they differ in which
/// transposition route extracts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Point-per-row table: the first column holds axis values from the
    /// second row onward, the first row holds sample names from the second
    /// column onward, and the data block is transposed so rows become
    /// samples.
    AxisMajor,
    /// The raw table is transposed first; the first row of the transposed
    /// table yields the axis, the first column yields sample names, and the
    /// remainder is taken as the intensity matrix without further
    /// transposition.
    SampleMajor,
}

impl std::str::FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "axis-major" | "axis_major" => Ok(Orientation::AxisMajor),
            "sample-major" | "sample_major" => Ok(Orientation::SampleMajor),
            other => Err(format!(
                "unknown orientation '{}': expected 'axis-major' or 'sample-major'",
                other
            )),
        }
    }
}

/// Container for one loaded set of spectra.
///
/// `intensities` has shape `n_samples x n_points`; row `i` is the spectrum
/// of `sample_names[i]` over `axis`.
#[derive(Debug, Clone)]
pub struct SpectrumSet {
    /// Chemical-shift positions, one per spectral point.
    pub axis: Vec<f64>,
    /// Intensity matrix, one row per sample.
    pub intensities: Vec<Vec<f64>>,
    /// Sample names, parallel to the matrix rows.
    pub sample_names: Vec<String>,
    /// Source file path, if loaded from disk.
    pub source_path: Option<PathBuf>,
}

impl SpectrumSet {
    /// Returns the number of samples (matrix rows).
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.intensities.len()
    }

    /// Returns the number of spectral points per sample.
    #[inline]
    pub fn num_points(&self) -> usize {
        self.intensities.first().map_or(0, |row| row.len())
    }

    /// Returns the index of the axis point closest to `value`, or `None`
    /// if the axis is empty.
    pub fn nearest_index(&self, value: f64) -> Option<usize> {
        let mut best = None;
        let mut best_dist = f64::INFINITY;
        for (i, &x) in self.axis.iter().enumerate() {
            let dist = (x - value).abs();
            if dist < best_dist {
                best_dist = dist;
                best = Some(i);
            }
        }
        best
    }
}

/// Errors raised when a loaded triple violates a shape invariant.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("the axis vector is empty")]
    EmptyAxis,

    #[error("the intensity matrix is empty")]
    EmptyMatrix,

    #[error("no sample names were found")]
    EmptySampleNames,

    #[error("axis has {axis_len} points but the data has {cols} columns")]
    AxisLengthMismatch { axis_len: usize, cols: usize },

    #[error("{names} sample names for {rows} data rows")]
    SampleCountMismatch { names: usize, rows: usize },
}

/// Load a spectral data file into an axis, intensity matrix, and sample
/// names.
///
/// Only `.csv` and `.txt` extensions are accepted (both comma-delimited).
/// Any non-numeric axis or intensity cell fails the whole load; the output
/// is never partially populated.
///
/// # Arguments
///
/// * `path` - Path to the data file
/// * `orientation` - Table layout, see [`Orientation`]
pub fn load_spectra<P: AsRef<Path>>(path: P, orientation: Orientation) -> Result<SpectrumSet> {
    let path = path.as_ref();

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if extension != "csv" && extension != "txt" {
        return Err(LoaderError::UnsupportedFormat {
            path: path.to_path_buf(),
            extension,
        });
    }

    let file = File::open(path).map_err(|e| LoaderError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let mut grid: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| LoaderError::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;
        grid.push(record.iter().map(|cell| cell.to_string()).collect());
    }

    if grid.len() < 2 || grid[0].len() < 2 {
        return Err(LoaderError::EmptyFile {
            path: path.to_path_buf(),
        });
    }

    let (axis, intensities, sample_names) = match orientation {
        Orientation::AxisMajor => extract_axis_major(&grid, path)?,
        Orientation::SampleMajor => {
            let transposed = transpose_grid(&grid);
            extract_sample_major(&transposed, path)?
        }
    };

    Ok(SpectrumSet {
        axis,
        intensities,
        sample_names,
        source_path: Some(path.to_path_buf()),
    })
}

/// Validate a loaded triple against its shape invariants.
///
/// Checked in order: non-empty axis, non-empty matrix, non-empty names,
/// axis length vs. column count, name count vs. row count. Duplicate
/// sample names are legal but logged, since name-keyed lookups become
/// ambiguous under them.
pub fn validate(set: &SpectrumSet) -> std::result::Result<(), ValidationError> {
    if set.axis.is_empty() {
        return Err(ValidationError::EmptyAxis);
    }
    if set.num_samples() == 0 || set.num_points() == 0 {
        return Err(ValidationError::EmptyMatrix);
    }
    if set.sample_names.is_empty() {
        return Err(ValidationError::EmptySampleNames);
    }
    if set.axis.len() != set.num_points() {
        return Err(ValidationError::AxisLengthMismatch {
            axis_len: set.axis.len(),
            cols: set.num_points(),
        });
    }
    if set.sample_names.len() != set.num_samples() {
        return Err(ValidationError::SampleCountMismatch {
            names: set.sample_names.len(),
            rows: set.num_samples(),
        });
    }

    let mut seen = HashSet::new();
    for name in &set.sample_names {
        if !seen.insert(name.as_str()) {
            warn!(
                "duplicate sample name '{}': name-keyed lookups will be ambiguous",
                name
            );
        }
    }

    Ok(())
}

type Triple = (Vec<f64>, Vec<Vec<f64>>, Vec<String>);

/// Extract the triple from a point-per-row table, transposing the data
/// block so rows become samples.
fn extract_axis_major(grid: &[Vec<String>], path: &Path) -> Result<Triple> {
    let n_points = grid.len() - 1;
    let n_samples = grid[0].len() - 1;

    let mut axis = Vec::with_capacity(n_points);
    for p in 0..n_points {
        axis.push(parse_cell(grid, 1 + p, 0, path)?);
    }

    let sample_names: Vec<String> = grid[0][1..].to_vec();

    let mut intensities = Vec::with_capacity(n_samples);
    for s in 0..n_samples {
        let mut row = Vec::with_capacity(n_points);
        for p in 0..n_points {
            row.push(parse_cell(grid, 1 + p, 1 + s, path)?);
        }
        intensities.push(row);
    }

    Ok((axis, intensities, sample_names))
}

/// Extract the triple from an already-transposed table: first row = axis,
/// first column = names, remainder = intensity matrix as-is.
fn extract_sample_major(grid: &[Vec<String>], path: &Path) -> Result<Triple> {
    let n_samples = grid.len() - 1;
    let n_points = grid[0].len() - 1;

    let mut axis = Vec::with_capacity(n_points);
    for p in 0..n_points {
        axis.push(parse_cell(grid, 0, 1 + p, path)?);
    }

    let mut sample_names = Vec::with_capacity(n_samples);
    let mut intensities = Vec::with_capacity(n_samples);
    for s in 0..n_samples {
        sample_names.push(grid[1 + s].first().cloned().unwrap_or_default());
        let mut row = Vec::with_capacity(n_points);
        for p in 0..n_points {
            row.push(parse_cell(grid, 1 + s, 1 + p, path)?);
        }
        intensities.push(row);
    }

    Ok((axis, intensities, sample_names))
}

/// Transpose a cell grid, padding ragged rows with empty cells.
fn transpose_grid(grid: &[Vec<String>]) -> Vec<Vec<String>> {
    let width = grid.iter().map(|row| row.len()).max().unwrap_or(0);
    (0..width)
        .map(|col| {
            grid.iter()
                .map(|row| row.get(col).cloned().unwrap_or_default())
                .collect()
        })
        .collect()
}

fn parse_cell(grid: &[Vec<String>], row: usize, col: usize, path: &Path) -> Result<f64> {
    let cell = grid
        .get(row)
        .and_then(|r| r.get(col))
        .ok_or_else(|| LoaderError::Parse {
            path: path.to_path_buf(),
            detail: format!("row {}, column {}: missing value", row + 1, col + 1),
        })?;
    cell.trim().parse::<f64>().map_err(|_| LoaderError::Parse {
        path: path.to_path_buf(),
        detail: format!(
            "row {}, column {}: '{}' is not a number",
            row + 1,
            col + 1,
            cell
        ),
    })
}
