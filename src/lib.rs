//! Day-segmented baseline calibration for low-cost gas-sensor boards.
//!
//! Converts raw electrochemical and metal-oxide sensor readings into
//! calibrated pollutant concentrations: the series is split into calendar
//! days, a rolling-minimum lower envelope is regressed against a covariate
//! channel to estimate each day's zero-point drift, and the per-pollutant
//! concentration formula is applied and stitched back into one series with
//! per-day diagnostics. The entry point is [`pipeline::Pipeline`].

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod baseline;
pub mod calibration;
pub mod error;
pub mod filter;
pub mod formula;
pub mod pipeline;
pub mod regression;
pub mod report;
pub mod segment;
pub mod series;
pub mod stats;

pub use calibration::{CalibrationRecord, CalibrationSource, CalibrationTable, Config, Pollutant, SensorFamily, SensorId};
pub use error::Error;
pub use pipeline::{Covariate, Method, Output, Pipeline, PollutantSpec};
pub use series::{Channel, Slot, TimeSeries};

pub type Result<T> = ::std::result::Result<T, Error>;
