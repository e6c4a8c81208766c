//! Per-day diagnostics and their date-indexed table.
//!
//! One [`DayRecord`] is assembled per day window and pollutant; rows for
//! days without data carry missing markers so the table stays aligned with
//! the day index. Statistics are NaN-aware with pandas conventions: sample
//! standard deviation, missing when fewer than two finite samples remain.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use ndarray::aview1;
use statrs::statistics::Statistics;

use crate::regression::{linear_fit, FitKind, LinearFit};
use crate::Result;

/// Mean over the finite samples, missing when none remain.
#[must_use]
pub fn nan_mean(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        f64::NAN
    } else {
        finite.mean()
    }
}

/// Sample standard deviation over the finite samples, missing when fewer
/// than two remain.
#[must_use]
pub fn nan_std(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 2 {
        f64::NAN
    } else {
        finite.std_dev()
    }
}

/// Pearson correlation over the finite pairs of `x` and `y`; `None` with
/// fewer than two pairs.
#[must_use]
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    linear_fit(aview1(x), aview1(y))
        .ok()
        .map(|fit| fit.r_value)
}

/// Diagnostics of the winning baseline fit for one day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineDiagnostics {
    pub fit: LinearFit,
    /// Winning envelope half-width.
    pub delta: usize,
    /// Regression model the winning fit used.
    pub kind: FitKind,
    /// Mean of baseline minus auxiliary electrode; missing for resistive
    /// sensors.
    pub delta_aux_avg: f64,
    /// Mean of baseline over auxiliary electrode; missing for resistive
    /// sensors.
    pub ratio_aux_avg: f64,
    /// Positive slope and r above 0.3.
    pub valid: bool,
}

/// One row of the per-day diagnostics table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayRecord {
    /// Squared Pearson correlation against the reference series.
    pub ref_r_squared: f64,
    pub temp_avg: f64,
    pub temp_std: f64,
    pub hum_avg: f64,
    pub hum_std: f64,
    pub conc_avg: f64,
    /// Present for baseline-method days with data.
    pub baseline: Option<BaselineDiagnostics>,
}

impl DayRecord {
    /// A row with every field marked missing, emitted for a day whose
    /// overlap window held no usable data.
    #[must_use]
    pub const fn missing() -> Self {
        Self {
            ref_r_squared: f64::NAN,
            temp_avg: f64::NAN,
            temp_std: f64::NAN,
            hum_avg: f64::NAN,
            hum_std: f64::NAN,
            conc_avg: f64::NAN,
            baseline: None,
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.baseline.is_none() && self.conc_avg.is_nan() && self.temp_avg.is_nan()
    }
}

/// Whole-run summary over the valid days of a table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidDaySummary {
    pub days: usize,
    pub delta_aux_avg: f64,
    pub delta_aux_std: f64,
    pub ratio_aux_avg: f64,
    pub ratio_aux_std: f64,
}

/// Date-indexed diagnostics for one pollutant.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsTable {
    rows: BTreeMap<NaiveDate, DayRecord>,
}

impl DiagnosticsTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, date: NaiveDate, record: DayRecord) {
        self.rows.insert(date, record);
    }

    #[must_use]
    pub fn get(&self, date: NaiveDate) -> Option<&DayRecord> {
        self.rows.get(&date)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &DayRecord)> {
        self.rows.iter().map(|(date, record)| (*date, record))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Mean and spread of the baseline-to-auxiliary offset over the days
    /// whose fit passed the validity thresholds; `None` when no day did.
    #[must_use]
    pub fn valid_day_summary(&self) -> Option<ValidDaySummary> {
        let (deltas, ratios): (Vec<f64>, Vec<f64>) = self
            .rows
            .values()
            .filter_map(|record| record.baseline)
            .filter(|diag| diag.valid)
            .map(|diag| (diag.delta_aux_avg, diag.ratio_aux_avg))
            .unzip();
        if deltas.is_empty() {
            return None;
        }
        Some(ValidDaySummary {
            days: deltas.len(),
            delta_aux_avg: nan_mean(&deltas),
            delta_aux_std: nan_std(&deltas),
            ratio_aux_avg: nan_mean(&ratios),
            ratio_aux_std: nan_std(&ratios),
        })
    }

    /// Writes the table as CSV, dates as `%Y-%m-%d` row keys and missing
    /// values as empty cells.
    ///
    /// # Errors
    ///
    /// Returns IO and CSV errors from the underlying writer.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record([
            "date",
            "r_value_ref",
            "avg_temp",
            "stderr_temp",
            "avg_hum",
            "stderr_hum",
            "avg_pollutant",
            "slope",
            "intercept",
            "r_value",
            "p_value",
            "std_err",
            "delta_aux_avg",
            "ratio_aux_avg",
            "delta",
            "regression",
            "valid",
        ])?;
        for (date, record) in &self.rows {
            let mut row = vec![
                date.format("%Y-%m-%d").to_string(),
                cell(record.ref_r_squared),
                cell(record.temp_avg),
                cell(record.temp_std),
                cell(record.hum_avg),
                cell(record.hum_std),
                cell(record.conc_avg),
            ];
            match record.baseline {
                Some(diag) => row.extend([
                    cell(diag.fit.slope),
                    cell(diag.fit.intercept),
                    cell(diag.fit.r_value),
                    cell(diag.fit.p_value),
                    cell(diag.fit.std_err),
                    cell(diag.delta_aux_avg),
                    cell(diag.ratio_aux_avg),
                    diag.delta.to_string(),
                    diag.kind.to_string(),
                    diag.valid.to_string(),
                ]),
                None => row.extend(std::iter::repeat(String::new()).take(10)),
            }
            csv.write_record(row)?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Writes the table to a CSV file; see [`Self::write_csv`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::write_csv`] plus file creation.
    pub fn write_csv_file(&self, path: &Path) -> Result<()> {
        self.write_csv(File::create(path)?)
    }
}

fn cell(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}
