//! Region integration over a loaded spectrum set.
//!
//! An [`IntegrationSession`] owns the current dataset together with its
//! derived per-point column means and per-sample totals, and accumulates a
//! table of named region integrals. Loading a new file replaces the dataset
//! wholesale; the integral table deliberately survives reloads until
//! [`IntegrationSession::reset`] is called, so results from several passes
//! over one dataset can be collected side by side.

use std::path::Path;

use log::warn;
use thiserror::Error;

use crate::core::loaders::{self, LoaderError, Orientation, SpectrumSet, ValidationError};
use crate::core::writers::{self, format_value, WriteError};

/// Decimal places used when formatting region boundary labels.
const LABEL_DECIMALS: usize = 4;

/// Decimal places applied to relative integrals.
const RELATIVE_DECIMALS: i32 = 9;

/// Errors raised by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no dataset is loaded")]
    NoData,
}

/// Insertion-ordered table of named integral columns.
///
/// Every column holds one value per sample, aligned to the sample order of
/// the dataset it was computed from.
#[derive(Debug, Clone, Default)]
pub struct IntegralTable {
    labels: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl IntegralTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when no integrals have been recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of recorded regions.
    #[inline]
    pub fn num_regions(&self) -> usize {
        self.labels.len()
    }

    /// Region labels in insertion order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Column values for a region label.
    pub fn column(&self, label: &str) -> Option<&[f64]> {
        self.labels
            .iter()
            .position(|l| l == label)
            .map(|i| self.columns[i].as_slice())
    }

    /// Iterate over (label, column) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.labels
            .iter()
            .map(|l| l.as_str())
            .zip(self.columns.iter().map(|c| c.as_slice()))
    }

    /// Insert a column, replacing the values of an existing label in place.
    pub fn upsert(&mut self, label: String, values: Vec<f64>) {
        match self.labels.iter().position(|l| *l == label) {
            Some(i) => self.columns[i] = values,
            None => {
                self.labels.push(label);
                self.columns.push(values);
            }
        }
    }

    /// Remove every column.
    pub fn clear(&mut self) {
        self.labels.clear();
        self.columns.clear();
    }
}

/// Output of one region integration.
#[derive(Debug, Clone)]
pub struct RegionIntegral {
    /// Axis value at the lower column index of the region.
    pub start: f64,
    /// Axis value at the upper column index of the region.
    pub end: f64,
    /// Axis values across the region, in column order.
    pub axis_segment: Vec<f64>,
    /// Cumulative mean-intensity curve rescaled to the region's peak, for
    /// display next to the spectrum. Not part of the persisted table.
    pub display_curve: Vec<f64>,
}

struct SessionData {
    set: SpectrumSet,
    column_means: Vec<f64>,
    row_totals: Vec<f64>,
}

/// Session state for region integration over one loaded dataset.
#[derive(Default)]
pub struct IntegrationSession {
    data: Option<SessionData>,
    integrals: IntegralTable,
}

impl IntegrationSession {
    /// Creates an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a spectral data file (sample-major loader variant), replacing
    /// the current dataset and its derived vectors.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), SessionError> {
        let set = loaders::load_spectra(path, Orientation::SampleMajor)?;
        self.load_set(set)
    }

    /// Attach an already-loaded dataset after validating it.
    ///
    /// The integral table is left untouched; columns computed from a
    /// previous dataset keep accumulating until [`reset`](Self::reset).
    pub fn load_set(&mut self, set: SpectrumSet) -> Result<(), SessionError> {
        loaders::validate(&set)?;

        if !self.integrals.is_empty() {
            warn!(
                "integral table still holds {} column(s) from a previous dataset; \
                 call reset() to clear them",
                self.integrals.num_regions()
            );
        }

        let n_samples = set.num_samples();
        let n_points = set.num_points();

        let mut column_means = vec![0.0; n_points];
        for row in &set.intensities {
            for (m, &v) in column_means.iter_mut().zip(row.iter()) {
                *m += v;
            }
        }
        for m in &mut column_means {
            *m /= n_samples as f64;
        }

        let row_totals: Vec<f64> = set
            .intensities
            .iter()
            .map(|row| row.iter().sum())
            .collect();

        self.data = Some(SessionData {
            set,
            column_means,
            row_totals,
        });
        Ok(())
    }

    /// The currently loaded dataset, if any.
    pub fn dataset(&self) -> Option<&SpectrumSet> {
        self.data.as_ref().map(|d| &d.set)
    }

    /// Sample names of the current dataset.
    pub fn sample_names(&self) -> Option<&[String]> {
        self.data.as_ref().map(|d| d.set.sample_names.as_slice())
    }

    /// Integrate the inclusive column range `[i1, i2]` for every sample and
    /// record the result under the region's axis-value label.
    ///
    /// Indices may be given in either order. Bounds are the caller's
    /// responsibility: the front end clamps to valid column indices before
    /// calling.
    ///
    /// # Panics
    ///
    /// Panics if either index is outside the loaded point range.
    pub fn calculate_integral(
        &mut self,
        i1: usize,
        i2: usize,
    ) -> Result<RegionIntegral, SessionError> {
        let data = self.data.as_ref().ok_or(SessionError::NoData)?;

        let (lo, hi) = if i1 <= i2 { (i1, i2) } else { (i2, i1) };
        debug_assert!(hi < data.set.num_points(), "column index out of range");

        let values: Vec<f64> = data
            .set
            .intensities
            .iter()
            .map(|row| row[lo..=hi].iter().sum())
            .collect();

        let label = format!(
            "{:.*} - {:.*}",
            LABEL_DECIMALS, data.set.axis[lo], LABEL_DECIMALS, data.set.axis[hi]
        );
        self.integrals.upsert(label, values);

        let mut curve = Vec::with_capacity(hi - lo + 1);
        let mut running = 0.0;
        for &m in &data.column_means[lo..=hi] {
            running += m;
            curve.push(running);
        }
        let curve_max = curve.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !curve.is_empty() && curve_max > 0.0 {
            let region_max = data
                .set
                .intensities
                .iter()
                .flat_map(|row| row[lo..=hi].iter().copied())
                .fold(f64::NEG_INFINITY, f64::max);
            for v in &mut curve {
                *v = *v / curve_max * region_max;
            }
        } else {
            for v in &mut curve {
                *v = 0.0;
            }
        }

        Ok(RegionIntegral {
            start: data.set.axis[lo],
            end: data.set.axis[hi],
            axis_segment: data.set.axis[lo..=hi].to_vec(),
            display_curve: curve,
        })
    }

    /// Snapshot of the absolute integral table.
    pub fn integrals(&self) -> &IntegralTable {
        &self.integrals
    }

    /// Integrals divided by each sample's total intensity, rounded to nine
    /// decimals. Empty when nothing has been integrated or no dataset is
    /// loaded. Columns left over from a dataset with a different sample
    /// count are skipped with a warning.
    pub fn relative_integrals(&self) -> IntegralTable {
        let mut relative = IntegralTable::new();
        let data = match &self.data {
            Some(d) => d,
            None => return relative,
        };

        for (label, column) in self.integrals.iter() {
            if column.len() != data.row_totals.len() {
                warn!(
                    "skipping integral column '{}': {} value(s) for {} loaded sample(s)",
                    label,
                    column.len(),
                    data.row_totals.len()
                );
                continue;
            }
            let values = column
                .iter()
                .zip(data.row_totals.iter())
                .map(|(&v, &total)| round_to(v / total, RELATIVE_DECIMALS))
                .collect();
            relative.upsert(label.to_string(), values);
        }
        relative
    }

    /// Per-sample total intensity, indexed by sample name. `None` before
    /// the first load.
    pub fn totals(&self) -> Option<Vec<(String, f64)>> {
        self.data.as_ref().map(|d| {
            d.set
                .sample_names
                .iter()
                .cloned()
                .zip(d.row_totals.iter().copied())
                .collect()
        })
    }

    /// Clear the dataset, derived vectors, and the integral table.
    pub fn reset(&mut self) {
        self.data = None;
        self.integrals.clear();
    }
}

/// Write an integral table as CSV: sample name first, one column per
/// region. Absolute tables are conventionally written with four decimals;
/// pass `None` to keep full precision (relative tables are already
/// rounded).
pub fn write_integral_table(
    path: &Path,
    table: &IntegralTable,
    names: &[String],
    decimals: Option<u32>,
) -> Result<(), WriteError> {
    let mut writer = writers::create_csv_writer(path)?;
    let path_str = path.display().to_string();

    let mut header = Vec::with_capacity(table.num_regions() + 1);
    header.push(String::new());
    header.extend(table.labels().iter().cloned());
    writer.write_record(&header).map_err(|e| WriteError::Csv {
        path: path_str.clone(),
        source: e,
    })?;

    for (i, name) in names.iter().enumerate() {
        let mut record = Vec::with_capacity(table.num_regions() + 1);
        record.push(name.clone());
        for (_, column) in table.iter() {
            record.push(format_value(column.get(i).copied().unwrap_or(0.0), decimals));
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

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    fn test_set() -> SpectrumSet {
        SpectrumSet {
            axis: vec![3.0, 2.0, 1.0],
            intensities: vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
            sample_names: vec!["S1".to_string(), "S2".to_string()],
            source_path: None,
        }
    }

    fn loaded_session() -> IntegrationSession {
        let mut session = IntegrationSession::new();
        session.load_set(test_set()).unwrap();
        session
    }

    #[test]
    fn test_integral_values_and_label() {
        let mut session = loaded_session();
        let region = session.calculate_integral(0, 1).unwrap();

        // Descending axis: label keeps index order, high ppm first
        assert_eq!(session.integrals().labels(), ["3.0000 - 2.0000"]);
        assert_eq!(
            session.integrals().column("3.0000 - 2.0000").unwrap(),
            &[3.0, 9.0]
        );
        assert_close(region.start, 3.0);
        assert_close(region.end, 2.0);
        assert_eq!(region.axis_segment, vec![3.0, 2.0]);
    }

    #[test]
    fn test_integral_indices_any_order() {
        let mut a = loaded_session();
        let mut b = loaded_session();
        a.calculate_integral(0, 2).unwrap();
        b.calculate_integral(2, 0).unwrap();

        assert_eq!(a.integrals().labels(), b.integrals().labels());
        assert_eq!(
            a.integrals().column("3.0000 - 1.0000").unwrap(),
            b.integrals().column("3.0000 - 1.0000").unwrap()
        );
    }

    #[test]
    fn test_repeat_integration_overwrites_column() {
        let mut session = loaded_session();
        session.calculate_integral(0, 1).unwrap();
        session.calculate_integral(0, 1).unwrap();

        assert_eq!(session.integrals().num_regions(), 1);
    }

    #[test]
    fn test_columns_accumulate_across_regions() {
        let mut session = loaded_session();
        session.calculate_integral(0, 1).unwrap();
        session.calculate_integral(1, 2).unwrap();

        assert_eq!(
            session.integrals().labels(),
            ["3.0000 - 2.0000", "2.0000 - 1.0000"]
        );
    }

    #[test]
    fn test_display_curve_rescaled_to_region_peak() {
        let mut session = loaded_session();
        let region = session.calculate_integral(0, 2).unwrap();

        // Column means are [2.5, 3.5, 4.5]; cumulative [2.5, 6.0, 10.5];
        // region max intensity is 6.0, so the last point hits 6.0.
        assert_eq!(region.display_curve.len(), 3);
        assert_close(region.display_curve[2], 6.0);
        assert_close(region.display_curve[0], 2.5 / 10.5 * 6.0);
    }

    #[test]
    fn test_display_curve_zero_when_no_positive_mass() {
        let set = SpectrumSet {
            axis: vec![1.0, 2.0],
            intensities: vec![vec![-1.0, -2.0]],
            sample_names: vec!["S1".to_string()],
            source_path: None,
        };
        let mut session = IntegrationSession::new();
        session.load_set(set).unwrap();
        let region = session.calculate_integral(0, 1).unwrap();

        assert_eq!(region.display_curve, vec![0.0, 0.0]);
    }

    #[test]
    fn test_relative_integrals() {
        let mut session = loaded_session();
        session.calculate_integral(0, 1).unwrap();

        let relative = session.relative_integrals();
        // Row totals are 6 and 15; integrals 3 and 9.
        let column = relative.column("3.0000 - 2.0000").unwrap();
        assert_close(column[0], 0.5);
        assert_close(column[1], 0.6);
    }

    #[test]
    fn test_relative_integrals_rounded_to_nine_decimals() {
        let set = SpectrumSet {
            axis: vec![1.0, 2.0, 3.0],
            intensities: vec![vec![1.0, 1.0, 1.0]],
            sample_names: vec!["S1".to_string()],
            source_path: None,
        };
        let mut session = IntegrationSession::new();
        session.load_set(set).unwrap();
        session.calculate_integral(0, 0).unwrap();

        let relative = session.relative_integrals();
        let column = relative.column("1.0000 - 1.0000").unwrap();
        // 1/3 rounded at the ninth decimal
        assert_eq!(column[0], 0.333333333);
    }

    #[test]
    fn test_relative_integrals_empty_without_integrals() {
        let session = loaded_session();
        assert!(session.relative_integrals().is_empty());
    }

    #[test]
    fn test_stale_columns_skipped_after_reload() {
        let mut session = loaded_session();
        session.calculate_integral(0, 1).unwrap();

        // Reload with a different sample count; the old column survives in
        // the absolute table but is skipped in the relative view.
        let set = SpectrumSet {
            axis: vec![3.0, 2.0, 1.0],
            intensities: vec![
                vec![1.0, 1.0, 1.0],
                vec![2.0, 2.0, 2.0],
                vec![3.0, 3.0, 3.0],
            ],
            sample_names: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            source_path: None,
        };
        session.load_set(set).unwrap();

        assert_eq!(session.integrals().num_regions(), 1);
        assert!(session.relative_integrals().is_empty());
    }

    #[test]
    fn test_totals_indexed_by_sample() {
        let session = loaded_session();
        let totals = session.totals().unwrap();

        assert_eq!(totals[0], ("S1".to_string(), 6.0));
        assert_eq!(totals[1], ("S2".to_string(), 15.0));
    }

    #[test]
    fn test_no_data_errors() {
        let mut session = IntegrationSession::new();
        assert!(matches!(
            session.calculate_integral(0, 1).unwrap_err(),
            SessionError::NoData
        ));
        assert!(session.totals().is_none());
        assert!(session.relative_integrals().is_empty());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut session = loaded_session();
        session.calculate_integral(0, 1).unwrap();
        session.reset();

        assert!(session.dataset().is_none());
        assert!(session.integrals().is_empty());
        assert!(session.totals().is_none());
    }

    #[test]
    fn test_load_rejects_invalid_set() {
        let set = SpectrumSet {
            axis: vec![1.0, 2.0, 3.0],
            intensities: vec![vec![1.0, 2.0]],
            sample_names: vec!["A".to_string()],
            source_path: None,
        };
        let mut session = IntegrationSession::new();
        assert!(matches!(
            session.load_set(set).unwrap_err(),
            SessionError::Validation(ValidationError::AxisLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_write_integral_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("integrals.csv");

        let mut session = loaded_session();
        session.calculate_integral(0, 1).unwrap();

        write_integral_table(
            &path,
            session.integrals(),
            session.sample_names().unwrap(),
            Some(4),
        )
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], ",3.0000 - 2.0000");
        assert_eq!(lines[1], "S1,3.0000");
        assert_eq!(lines[2], "S2,9.0000");
    }
}
