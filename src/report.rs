//! Structured progress reporting.
//!
//! The pipeline emits [`Event`]s instead of printing or plotting; callers
//! attach an [`Observer`] to watch a run. [`LogObserver`] forwards events to
//! the `log` facade and is what most binaries want; [`NopObserver`] is the
//! default.

use chrono::NaiveDate;

use crate::calibration::{Pollutant, SensorId};
use crate::regression::FitKind;

/// A notable moment in a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PollutantStarted {
        pollutant: Pollutant,
        sensor: SensorId,
        days: usize,
    },
    BaselineFitted {
        pollutant: Pollutant,
        date: NaiveDate,
        delta: usize,
        kind: FitKind,
        r_value: f64,
    },
    DayProcessed {
        pollutant: Pollutant,
        date: NaiveDate,
        valid: Option<bool>,
    },
    DayEmpty {
        pollutant: Pollutant,
        date: NaiveDate,
    },
    PollutantFinished {
        pollutant: Pollutant,
    },
}

/// Receives pipeline events as they happen.
pub trait Observer {
    fn notify(&mut self, event: &Event);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopObserver;

impl Observer for NopObserver {
    fn notify(&mut self, _event: &Event) {}
}

/// Forwards events to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn notify(&mut self, event: &Event) {
        match event {
            Event::PollutantStarted {
                pollutant,
                sensor,
                days,
            } => log::info!("computing {pollutant} from sensor {sensor} over {days} days"),
            Event::BaselineFitted {
                pollutant,
                date,
                delta,
                kind,
                r_value,
            } => log::debug!(
                "{pollutant} {date}: {kind} baseline with half-width {delta}, r = {r_value:.3}"
            ),
            Event::DayProcessed {
                pollutant,
                date,
                valid,
            } => match valid {
                Some(valid) => log::debug!("{pollutant} {date}: done, valid = {valid}"),
                None => log::debug!("{pollutant} {date}: done"),
            },
            Event::DayEmpty { pollutant, date } => {
                log::warn!("{pollutant} {date}: no data in the overlap window, skipping");
            }
            Event::PollutantFinished { pollutant } => log::info!("{pollutant} finished"),
        }
    }
}
