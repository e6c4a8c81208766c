//! Per-sensor calibration constants and run configuration.
//!
//! Calibration data is owned by a read-only [`CalibrationSource`] injected
//! into the pipeline; the core never reaches for ambient state. The bundled
//! [`CalibrationTable`] loads records from a TOML document or a CSV table and
//! validates every record at load time, so a near-zero divisor or a
//! non-finite constant fails the load rather than seeding NaN into a run.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::regression::Regression;
use crate::Result;

/// Divisors smaller than this are treated as zero.
const MIN_DIVISOR: f64 = 1.0e-9;

/// The pollutants the concentration formulas know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum Pollutant {
    #[serde(rename = "CO")]
    Co,
    #[serde(rename = "NO2")]
    No2,
    #[serde(rename = "O3")]
    O3,
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Co => write!(f, "CO"),
            Self::No2 => write!(f, "NO2"),
            Self::O3 => write!(f, "O3"),
        }
    }
}

/// Opaque sensor identifier, as printed on the board.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SensorId(pub String);

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sensing technology of a board position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorFamily {
    /// Two-channel working/auxiliary electrode cell.
    Electrochemical,
    /// Single-channel metal-oxide resistance sensor.
    Resistive,
}

impl fmt::Display for SensorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Electrochemical => write!(f, "electrochemical"),
            Self::Resistive => write!(f, "resistive"),
        }
    }
}

/// Immutable calibration constants for one sensor.
///
/// Constants that do not apply to a family (the auxiliary zero current of a
/// resistive sensor, the zero-air resistance of an electrochemical cell)
/// default to zero and are ignored by the formulas.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CalibrationRecord {
    pub family: SensorFamily,
    pub target: Pollutant,
    /// Primary sensitivity, mV/ppb (electrochemical) or kOhm/ppb (resistive).
    pub sensitivity_1: f64,
    /// Cross-sensitivity to NO2, used by the O3 formula only.
    #[serde(default)]
    pub sensitivity_2: f64,
    /// Working electrode current in zero air, nA.
    #[serde(default)]
    pub zero_current: f64,
    /// Auxiliary electrode current in zero air, nA.
    #[serde(default)]
    pub aux_zero_current: f64,
    /// Sensor resistance in zero air, kOhm.
    #[serde(default)]
    pub zero_air_resistance: f64,
}

impl CalibrationRecord {
    /// Working-to-auxiliary zero current ratio, the classic-method `zero`
    /// scale factor.
    #[must_use]
    pub fn zero_ratio(&self) -> f64 {
        self.zero_current / self.aux_zero_current
    }

    /// Checks the constants this record will be divided by.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCalibration`] when any constant is non-finite,
    /// when `sensitivity_1` is near zero, when an electrochemical record has
    /// a near-zero auxiliary zero current, or when a record targeting O3 has
    /// a near-zero `sensitivity_2`.
    pub fn validate(&self, sensor: &SensorId) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidCalibration {
            sensor: sensor.clone(),
            reason: reason.into(),
        };
        let constants = [
            self.sensitivity_1,
            self.sensitivity_2,
            self.zero_current,
            self.aux_zero_current,
            self.zero_air_resistance,
        ];
        if constants.iter().any(|constant| !constant.is_finite()) {
            return Err(invalid("non-finite constant"));
        }
        if self.sensitivity_1.abs() < MIN_DIVISOR {
            return Err(invalid("sensitivity_1 is zero"));
        }
        if self.family == SensorFamily::Electrochemical && self.aux_zero_current.abs() < MIN_DIVISOR
        {
            return Err(invalid("auxiliary zero current is zero"));
        }
        if self.target == Pollutant::O3 && self.sensitivity_2.abs() < MIN_DIVISOR {
            return Err(invalid("sensitivity_2 is zero for an O3 sensor"));
        }
        Ok(())
    }
}

/// Read-only lookup of calibration records by sensor identifier.
pub trait CalibrationSource {
    fn record(&self, sensor: &SensorId) -> Option<&CalibrationRecord>;
}

/// An in-memory calibration table, the crate's [`CalibrationSource`].
#[derive(Debug, Clone, Default)]
pub struct CalibrationTable {
    records: HashMap<SensorId, CalibrationRecord>,
}

#[derive(Deserialize)]
struct TomlStore {
    sensors: HashMap<String, CalibrationRecord>,
}

#[derive(Deserialize)]
struct CsvRow {
    sensor_id: String,
    family: SensorFamily,
    target: Pollutant,
    sensitivity_1: f64,
    #[serde(default)]
    sensitivity_2: f64,
    #[serde(default)]
    zero_current: f64,
    #[serde(default)]
    aux_zero_current: f64,
    #[serde(default)]
    zero_air_resistance: f64,
}

impl CalibrationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record after validating it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCalibration`] for a record that fails
    /// [`CalibrationRecord::validate`].
    pub fn insert(&mut self, sensor: SensorId, record: CalibrationRecord) -> Result<()> {
        record.validate(&sensor)?;
        self.records.insert(sensor, record);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Loads a table from a TOML document with one `[sensors.<id>]` entry
    /// per sensor.
    ///
    /// # Errors
    ///
    /// Returns an IO or parse error for an unreadable document and
    /// [`Error::InvalidCalibration`] for a record that fails validation.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let document = fs::read_to_string(path)?;
        Self::from_toml_str(&document)
    }

    /// Loads a table from a TOML string; see [`Self::from_toml_file`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_toml_file`] minus the IO error.
    pub fn from_toml_str(document: &str) -> Result<Self> {
        let store: TomlStore = toml::from_str(document)?;
        let mut table = Self::new();
        for (sensor, record) in store.sensors {
            table.insert(SensorId(sensor), record)?;
        }
        Ok(table)
    }

    /// Loads a table from a headed CSV file with one row per sensor.
    ///
    /// # Errors
    ///
    /// Returns an IO or parse error for an unreadable file and
    /// [`Error::InvalidCalibration`] for a record that fails validation.
    pub fn from_csv_file(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut table = Self::new();
        for row in reader.deserialize() {
            let row: CsvRow = row?;
            let record = CalibrationRecord {
                family: row.family,
                target: row.target,
                sensitivity_1: row.sensitivity_1,
                sensitivity_2: row.sensitivity_2,
                zero_current: row.zero_current,
                aux_zero_current: row.aux_zero_current,
                zero_air_resistance: row.zero_air_resistance,
            };
            table.insert(SensorId(row.sensor_id), record)?;
        }
        Ok(table)
    }
}

impl CalibrationSource for CalibrationTable {
    fn record(&self, sensor: &SensorId) -> Option<&CalibrationRecord> {
        self.records.get(sensor)
    }
}

/// Run configuration for the pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Candidate envelope half-widths for electrochemical sensors.
    pub deltas: Vec<usize>,
    /// Candidate envelope half-widths for resistive sensors.
    pub deltas_resistive: Vec<usize>,
    /// Hours of neighbouring-day context on each side of a day window.
    pub overlap_hours: i64,
    pub regression: Regression,
    /// Single-pole smoothing coefficient, in `(0, 1]`.
    pub smoothing_alpha: f64,
    /// Suffix of exported concentration channel labels.
    pub suffix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deltas: (1..=19).collect(),
            deltas_resistive: (1..=199).collect(),
            overlap_hours: 2,
            regression: Regression::Best,
            smoothing_alpha: 0.2,
            suffix: "cal".into(),
        }
    }
}

impl Config {
    /// # Errors
    ///
    /// Returns [`Error::Config`] for empty or unsorted half-width lists, a
    /// half-width below one, a smoothing coefficient outside `(0, 1]`, a
    /// negative overlap, or an empty suffix.
    pub fn validate(&self) -> Result<()> {
        for (name, deltas) in [
            ("deltas", &self.deltas),
            ("deltas_resistive", &self.deltas_resistive),
        ] {
            if deltas.is_empty() {
                return Err(Error::Config(format!("{name} is empty")));
            }
            if !deltas.windows(2).all(|pair| pair[0] < pair[1]) {
                return Err(Error::Config(format!("{name} must be strictly ascending")));
            }
            if deltas[0] < 1 {
                return Err(Error::Config(format!("{name} must start at one or above")));
            }
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(Error::Config(format!(
                "smoothing_alpha {} is outside (0, 1]",
                self.smoothing_alpha
            )));
        }
        if self.overlap_hours < 0 {
            return Err(Error::Config("overlap_hours is negative".into()));
        }
        if self.suffix.is_empty() {
            return Err(Error::Config("suffix is empty".into()));
        }
        Ok(())
    }
}
