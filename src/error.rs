//! Failure modes of the calibration pipeline.
//!
//! Everything here is fatal to a run: configuration and calibration problems
//! are detected before any computation starts, so a bad spec never leaves
//! partial output behind. Recoverable conditions (an empty day window, a
//! missing reference) are not errors; they surface as missing markers in the
//! diagnostics instead.

use thiserror::Error;

use crate::calibration::{Pollutant, SensorId};
use crate::series::Channel;

#[derive(Debug, Error)]
pub enum Error {
    #[error("input series is empty")]
    EmptySeries,

    #[error("timestamps must be strictly ascending and unique")]
    UnorderedIndex,

    #[error("channel {channel} has {got} samples but the index has {expected}")]
    LengthMismatch {
        channel: Channel,
        got: usize,
        expected: usize,
    },

    #[error("required channel {0} is missing from the series")]
    MissingChannel(Channel),

    #[error("no calibration record for sensor {0}")]
    UnknownSensor(SensorId),

    #[error("sensor {sensor} is calibrated for {target}, not {requested}")]
    TargetMismatch {
        sensor: SensorId,
        target: Pollutant,
        requested: Pollutant,
    },

    #[error("invalid calibration for sensor {sensor}: {reason}")]
    InvalidCalibration { sensor: SensorId, reason: String },

    #[error("{pollutant} needs a {dependency} concentration computed earlier in the run")]
    MissingDependency {
        pollutant: Pollutant,
        dependency: Pollutant,
    },

    #[error("duplicate spec for {0}")]
    DuplicateSpec(Pollutant),

    #[error("unsupported spec for {pollutant}: {reason}")]
    UnsupportedSpec { pollutant: Pollutant, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("regression needs at least two finite pairs, found {0}")]
    DegenerateRegression(usize),

    #[error("exponential regression requires a strictly positive envelope")]
    NonPositiveEnvelope,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
