//! Concentration calibration of integral tables.
//!
//! A proton-normalized integral is converted to a concentration through a
//! proportionality factor K. The factor comes either from an external
//! standard (one reference spectrum, one global K) or from an internal
//! standard (a reference compound present in every sample, one K per
//! sample). The working table is editable: cells that are not numeric are
//! carried through untouched instead of aborting the operation.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::core::loaders::SpectrumSet;
use crate::core::writers::{self, WriteError};
use crate::processors::integrate::IntegralTable;

/// Errors raised by calibration operations.
#[derive(Debug, Error)]
pub enum QuantError {
    #[error("the proton count must not be zero")]
    ZeroProtons,

    #[error("the proton count must be positive, got {0}")]
    NonPositiveProtons(f64),

    #[error("no calibration method has been configured")]
    NoCalibration,

    #[error("the reference spectrum holds no samples")]
    EmptyReference,
}

/// One cell of the quantification working table: a number, or verbatim
/// text that every numeric operation skips.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
}

impl Cell {
    /// Parse a raw cell, keeping the text verbatim when it is not numeric.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(v) => Cell::Number(v),
            Err(_) => Cell::Text(raw.to_string()),
        }
    }

    /// The numeric value, if this cell holds one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            Cell::Text(_) => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(v) => write!(f, "{}", v),
            Cell::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Editable working table for quantification: one row per sample, one
/// column per integrated region.
#[derive(Debug, Clone)]
pub struct QuantTable {
    /// Sample names, one per row.
    pub sample_names: Vec<String>,
    /// Region labels, one per column.
    pub region_labels: Vec<String>,
    /// Cell grid, `sample_names.len()` rows by `region_labels.len()` columns.
    pub cells: Vec<Vec<Cell>>,
}

impl QuantTable {
    /// Build the working table from an integral table.
    pub fn from_integrals(table: &IntegralTable, names: &[String]) -> Self {
        let region_labels: Vec<String> = table.labels().to_vec();
        let cells = names
            .iter()
            .enumerate()
            .map(|(i, _)| {
                table
                    .iter()
                    .map(|(_, column)| Cell::Number(column.get(i).copied().unwrap_or(0.0)))
                    .collect()
            })
            .collect();
        Self {
            sample_names: names.to_vec(),
            region_labels,
            cells,
        }
    }
}

/// Divide every column of the table by its proton count.
///
/// Proton entries are parsed cell by cell; an entry that is not numeric
/// falls back to `default_protons` instead of failing the operation, and
/// non-numeric table cells are left unmodified.
pub fn divide_by_protons(table: &mut QuantTable, protons: &[Cell], default_protons: f64) {
    let counts: Vec<f64> = (0..table.region_labels.len())
        .map(|j| {
            protons
                .get(j)
                .and_then(Cell::as_number)
                .unwrap_or(default_protons)
        })
        .collect();

    for row in &mut table.cells {
        for (cell, &count) in row.iter_mut().zip(counts.iter()) {
            if let Cell::Number(v) = cell {
                *v /= count;
            }
        }
    }
}

/// Compute the global calibration factor from an external standard.
///
/// Integrates the reference's first spectrum over the region between the
/// axis values closest to `start` and `end`, then applies
/// `K = concentration / (integral / protons)`.
pub fn external_standard_factor(
    reference: &SpectrumSet,
    start: f64,
    end: f64,
    protons: f64,
    concentration: f64,
) -> Result<f64, QuantError> {
    if protons == 0.0 {
        return Err(QuantError::ZeroProtons);
    }
    let row = reference
        .intensities
        .first()
        .ok_or(QuantError::EmptyReference)?;
    let integral = region_sum(reference, row, start, end).ok_or(QuantError::EmptyReference)?;

    Ok(concentration / (integral / protons))
}

/// Compute one calibration factor per sample from an internal standard.
///
/// The standard's region is integrated within each sample's own spectrum.
/// Under duplicate sample names the later row wins, so the returned map can
/// hold fewer entries than the dataset has rows.
pub fn internal_standard_factors(
    set: &SpectrumSet,
    start: f64,
    end: f64,
    protons: f64,
    concentration: f64,
) -> Result<HashMap<String, f64>, QuantError> {
    if protons <= 0.0 {
        return Err(QuantError::NonPositiveProtons(protons));
    }

    let mut factors = HashMap::with_capacity(set.num_samples());
    for (name, row) in set.sample_names.iter().zip(set.intensities.iter()) {
        if let Some(integral) = region_sum(set, row, start, end) {
            factors.insert(name.clone(), concentration / (integral / protons));
        }
    }
    Ok(factors)
}

/// Sum of a spectrum row between the axis points nearest to `start` and
/// `end`, inclusive. `None` when the axis is empty.
fn region_sum(set: &SpectrumSet, row: &[f64], start: f64, end: f64) -> Option<f64> {
    let i1 = set.nearest_index(start)?;
    let i2 = set.nearest_index(end)?;
    let (lo, hi) = if i1 <= i2 { (i1, i2) } else { (i2, i1) };
    Some(row[lo..=hi].iter().sum())
}

/// Active calibration mode: exactly one of the two procedures, or nothing
/// configured yet.
#[derive(Debug, Clone, Default)]
pub enum Calibration {
    /// No factor configured; applying is an error.
    #[default]
    None,
    /// One global factor from an external standard.
    External(f64),
    /// One factor per sample name from an internal standard.
    Internal(HashMap<String, f64>),
}

impl Calibration {
    /// Multiply the table's numeric cells by the calibration factor(s).
    ///
    /// With an internal standard, rows whose sample has no factor are left
    /// unmodified (a skip, not an error). Text cells are never touched.
    pub fn apply(&self, table: &mut QuantTable) -> Result<(), QuantError> {
        match self {
            Calibration::None => Err(QuantError::NoCalibration),
            Calibration::External(k) => {
                for row in &mut table.cells {
                    for cell in row {
                        if let Cell::Number(v) = cell {
                            *v *= k;
                        }
                    }
                }
                Ok(())
            }
            Calibration::Internal(factors) => {
                for (name, row) in table.sample_names.iter().zip(table.cells.iter_mut()) {
                    let k = match factors.get(name) {
                        Some(k) => *k,
                        None => continue,
                    };
                    for cell in row {
                        if let Cell::Number(v) = cell {
                            *v *= k;
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

/// Write the quantification table as CSV: sample name first, then one
/// column per region. Numbers use their shortest representation; text
/// cells are written verbatim.
pub fn write_quant_table(path: &Path, table: &QuantTable) -> Result<(), WriteError> {
    let mut writer = writers::create_csv_writer(path)?;
    let path_str = path.display().to_string();

    let mut header = Vec::with_capacity(table.region_labels.len() + 1);
    header.push(String::new());
    header.extend(table.region_labels.iter().cloned());
    writer.write_record(&header).map_err(|e| WriteError::Csv {
        path: path_str.clone(),
        source: e,
    })?;

    for (name, row) in table.sample_names.iter().zip(table.cells.iter()) {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(name.clone());
        record.extend(row.iter().map(|cell| cell.to_string()));
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

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    fn sample_table() -> QuantTable {
        QuantTable {
            sample_names: vec!["S1".to_string(), "S2".to_string()],
            region_labels: vec!["r1".to_string(), "r2".to_string()],
            cells: vec![
                vec![Cell::Number(6.0), Cell::Number(10.0)],
                vec![Cell::Number(9.0), Cell::Text("n/a".to_string())],
            ],
        }
    }

    #[test]
    fn test_cell_parse() {
        assert_eq!(Cell::parse("1.5"), Cell::Number(1.5));
        assert_eq!(Cell::parse(" 2 "), Cell::Number(2.0));
        assert_eq!(Cell::parse("n/a"), Cell::Text("n/a".to_string()));
    }

    #[test]
    fn test_from_integrals() {
        let mut integrals = IntegralTable::new();
        integrals.upsert("1.0000 - 2.0000".to_string(), vec![3.0, 9.0]);
        let names = vec!["S1".to_string(), "S2".to_string()];

        let table = QuantTable::from_integrals(&integrals, &names);

        assert_eq!(table.region_labels, vec!["1.0000 - 2.0000"]);
        assert_eq!(table.cells[0][0], Cell::Number(3.0));
        assert_eq!(table.cells[1][0], Cell::Number(9.0));
    }

    #[test]
    fn test_divide_by_protons() {
        let mut table = sample_table();
        divide_by_protons(&mut table, &[Cell::Number(3.0), Cell::Number(2.0)], 1.0);

        assert_eq!(table.cells[0][0], Cell::Number(2.0));
        assert_eq!(table.cells[0][1], Cell::Number(5.0));
        assert_eq!(table.cells[1][0], Cell::Number(3.0));
        // Text cell untouched
        assert_eq!(table.cells[1][1], Cell::Text("n/a".to_string()));
    }

    #[test]
    fn test_divide_by_protons_non_numeric_defaults_to_one() {
        let mut table = sample_table();
        divide_by_protons(&mut table, &[Cell::Text("?".to_string()), Cell::Number(2.0)], 1.0);

        // First column divided by the default 1.0
        assert_eq!(table.cells[0][0], Cell::Number(6.0));
        assert_eq!(table.cells[0][1], Cell::Number(5.0));
    }

    #[test]
    fn test_external_factor() {
        let reference = SpectrumSet {
            axis: vec![1.0, 2.0, 3.0],
            intensities: vec![vec![10.0, 10.0, 10.0]],
            sample_names: vec!["ref".to_string()],
            source_path: None,
        };
        // Region covers all three points: integral 30, protons 3, conc 10
        let k = external_standard_factor(&reference, 1.0, 3.0, 3.0, 10.0).unwrap();
        assert_close(k, 1.0);
    }

    #[test]
    fn test_external_factor_zero_protons() {
        let reference = SpectrumSet {
            axis: vec![1.0],
            intensities: vec![vec![1.0]],
            sample_names: vec!["ref".to_string()],
            source_path: None,
        };
        assert!(matches!(
            external_standard_factor(&reference, 1.0, 1.0, 0.0, 10.0).unwrap_err(),
            QuantError::ZeroProtons
        ));
    }

    #[test]
    fn test_internal_factors_per_sample() {
        let set = SpectrumSet {
            axis: vec![1.0, 2.0, 3.0],
            intensities: vec![vec![10.0, 10.0, 10.0], vec![5.0, 5.0, 5.0]],
            sample_names: vec!["S1".to_string(), "S2".to_string()],
            source_path: None,
        };
        let factors = internal_standard_factors(&set, 1.0, 3.0, 3.0, 10.0).unwrap();

        // S1: K = 10 / (30/3) = 1.0; S2: K = 10 / (15/3) = 2.0
        assert_close(factors["S1"], 1.0);
        assert_close(factors["S2"], 2.0);
    }

    #[test]
    fn test_internal_factors_reject_non_positive_protons() {
        let set = SpectrumSet {
            axis: vec![1.0],
            intensities: vec![vec![1.0]],
            sample_names: vec!["S1".to_string()],
            source_path: None,
        };
        assert!(matches!(
            internal_standard_factors(&set, 1.0, 1.0, 0.0, 10.0).unwrap_err(),
            QuantError::NonPositiveProtons(_)
        ));
    }

    #[test]
    fn test_apply_external_scales_numeric_cells() {
        let mut table = sample_table();
        Calibration::External(2.0).apply(&mut table).unwrap();

        assert_eq!(table.cells[0][0], Cell::Number(12.0));
        assert_eq!(table.cells[1][1], Cell::Text("n/a".to_string()));
    }

    #[test]
    fn test_apply_internal_skips_samples_without_factor() {
        let mut table = sample_table();
        let mut factors = HashMap::new();
        factors.insert("S1".to_string(), 2.0);
        Calibration::Internal(factors).apply(&mut table).unwrap();

        assert_eq!(table.cells[0][0], Cell::Number(12.0));
        // S2 has no factor: left unmodified
        assert_eq!(table.cells[1][0], Cell::Number(9.0));
    }

    #[test]
    fn test_apply_none_is_an_error() {
        let mut table = sample_table();
        assert!(matches!(
            Calibration::None.apply(&mut table).unwrap_err(),
            QuantError::NoCalibration
        ));
    }

    #[test]
    fn test_internal_calibration_end_to_end() {
        // conc 10, protons 3, region integral 30 -> K = 1.0; a table value
        // of 5 stays 5.0 after applying.
        let set = SpectrumSet {
            axis: vec![1.0, 2.0, 3.0],
            intensities: vec![vec![10.0, 10.0, 10.0]],
            sample_names: vec!["S1".to_string()],
            source_path: None,
        };
        let factors = internal_standard_factors(&set, 1.0, 3.0, 3.0, 10.0).unwrap();

        let mut table = QuantTable {
            sample_names: vec!["S1".to_string()],
            region_labels: vec!["r1".to_string()],
            cells: vec![vec![Cell::Number(5.0)]],
        };
        Calibration::Internal(factors).apply(&mut table).unwrap();

        assert_eq!(table.cells[0][0], Cell::Number(5.0));
    }

    #[test]
    fn test_write_quant_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("concentrations.csv");

        let table = sample_table();
        write_quant_table(&path, &table).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], ",r1,r2");
        assert_eq!(lines[1], "S1,6,10");
        assert_eq!(lines[2], "S2,9,n/a");
    }
}
