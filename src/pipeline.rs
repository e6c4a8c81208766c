//! The day-segmented calibration pipeline.
//!
//! [`Pipeline::run`] turns a raw series and an ordered list of
//! [`PollutantSpec`]s into an augmented series plus one diagnostics table
//! per pollutant. Every configuration, calibration, and dependency problem
//! is detected before any computation starts, so a bad spec can never leave
//! partial output behind; conditions that concern a single day (an empty
//! window, a missing reference) are absorbed into the diagnostics instead.
//!
//! Days are processed strictly in ascending order and merged first-write-
//! wins, so a later day's overlap context can never overwrite a value an
//! earlier day already finalized.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::aview1;

use crate::calibration::{
    CalibrationRecord, CalibrationSource, Config, Pollutant, SensorFamily, SensorId,
};
use crate::error::Error;
use crate::filter::exponential_smoothing;
use crate::formula;
use crate::regression::select_baseline;
use crate::report::{Event, NopObserver, Observer};
use crate::segment::{day_windows, DayWindow};
use crate::series::{Channel, Slot, TimeSeries};
use crate::stats::{nan_mean, nan_std, pearson, BaselineDiagnostics, DayRecord, DiagnosticsTable};
use crate::Result;

/// Channel the baseline is regressed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Covariate {
    /// Auxiliary electrode of the same slot; electrochemical only.
    Auxiliary,
    Temperature,
    Humidity,
}

/// How a pollutant's zero-point is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Fixed auxiliary-channel ratio from calibration. A no-op for
    /// resistive sensors, which have no auxiliary electrode.
    Classic,
    /// Day-segmented lower-envelope baseline regressed on a covariate.
    Baseline { covariate: Covariate },
}

/// One pollutant to compute, in run order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollutantSpec {
    pub pollutant: Pollutant,
    pub sensor: SensorId,
    pub method: Method,
    /// Board position of the electrode pair; ignored by resistive sensors.
    pub slot: Slot,
}

/// A finished run: the augmented series and per-pollutant diagnostics.
#[derive(Debug)]
pub struct Output {
    pub series: TimeSeries,
    pub diagnostics: BTreeMap<Pollutant, DiagnosticsTable>,
}

/// Orchestrates validation, the day loop, stitching, and smoothing.
pub struct Pipeline<'a> {
    calibration: &'a dyn CalibrationSource,
    config: Config,
    observer: Box<dyn Observer + 'a>,
}

impl<'a> Pipeline<'a> {
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid configuration.
    pub fn new(calibration: &'a dyn CalibrationSource, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            calibration,
            config,
            observer: Box::new(NopObserver),
        })
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Box<dyn Observer + 'a>) -> Self {
        self.observer = observer;
        self
    }

    /// Runs the pipeline over `series` for every spec in order.
    ///
    /// # Errors
    ///
    /// Returns the fatal errors of the taxonomy: an empty series, unknown
    /// sensors, calibration target mismatches, invalid constants, missing
    /// input channels, a missing O3-on-NO2 dependency, duplicate specs,
    /// unsupported family/method combinations, and degenerate regression
    /// input.
    pub fn run(
        &mut self,
        series: &TimeSeries,
        specs: &[PollutantSpec],
        reference: Option<&TimeSeries>,
    ) -> Result<Output> {
        let records = self.validate(series, specs)?;
        let bounds = series.bounds().ok_or(Error::EmptySeries)?;
        let windows = day_windows(bounds, self.config.overlap_hours);

        let mut result = series.clone();
        let mut diagnostics = BTreeMap::new();
        for (spec, record) in specs.iter().zip(&records) {
            self.observer.notify(&Event::PollutantStarted {
                pollutant: spec.pollutant,
                sensor: spec.sensor.clone(),
                days: windows.len(),
            });
            let table = match (record.family, spec.method) {
                (SensorFamily::Electrochemical, Method::Classic) => {
                    self.run_classic(&mut result, spec, record, &windows, reference)?
                }
                (_, Method::Baseline { covariate }) => {
                    self.run_baseline(&mut result, spec, record, covariate, &windows, reference)?
                }
                (SensorFamily::Resistive, Method::Classic) => {
                    log::warn!(
                        "classic method is a no-op for resistive sensor {}, skipping {}",
                        spec.sensor,
                        spec.pollutant
                    );
                    DiagnosticsTable::new()
                }
            };

            if let Some(concentration) = result.channel(Channel::Concentration(spec.pollutant)) {
                let zero_filled: Vec<f64> = concentration
                    .iter()
                    .map(|value| if value.is_nan() { 0.0 } else { *value })
                    .collect();
                let filtered = exponential_smoothing(&zero_filled, self.config.smoothing_alpha);
                result.insert_channel(Channel::Filtered(spec.pollutant), filtered)?;
            } else {
                log::warn!(
                    "no {} concentration was computed, skipping the smoothing pass",
                    spec.pollutant
                );
            }

            diagnostics.insert(spec.pollutant, table);
            self.observer.notify(&Event::PollutantFinished {
                pollutant: spec.pollutant,
            });
        }

        Ok(Output {
            series: result,
            diagnostics,
        })
    }

    /// Checks every spec before any computation starts.
    fn validate(
        &self,
        series: &TimeSeries,
        specs: &[PollutantSpec],
    ) -> Result<Vec<CalibrationRecord>> {
        if series.is_empty() {
            return Err(Error::EmptySeries);
        }
        let mut seen = BTreeSet::new();
        let mut records = Vec::with_capacity(specs.len());
        for (position, spec) in specs.iter().enumerate() {
            if !seen.insert(spec.pollutant) {
                return Err(Error::DuplicateSpec(spec.pollutant));
            }
            let record = self
                .calibration
                .record(&spec.sensor)
                .ok_or_else(|| Error::UnknownSensor(spec.sensor.clone()))?;
            if record.target != spec.pollutant {
                return Err(Error::TargetMismatch {
                    sensor: spec.sensor.clone(),
                    target: record.target,
                    requested: spec.pollutant,
                });
            }
            record.validate(&spec.sensor)?;

            let resistive_noop =
                record.family == SensorFamily::Resistive && spec.method == Method::Classic;
            match record.family {
                SensorFamily::Resistive => {
                    if spec.pollutant == Pollutant::O3 {
                        return Err(Error::UnsupportedSpec {
                            pollutant: spec.pollutant,
                            reason: "no resistive O3 formula exists".into(),
                        });
                    }
                    if spec.method
                        == (Method::Baseline {
                            covariate: Covariate::Auxiliary,
                        })
                    {
                        return Err(Error::UnsupportedSpec {
                            pollutant: spec.pollutant,
                            reason: "a resistive sensor has no auxiliary electrode".into(),
                        });
                    }
                    if !resistive_noop {
                        series.require(Channel::Resistance(spec.pollutant))?;
                    }
                }
                SensorFamily::Electrochemical => {
                    series.require(Channel::Working(spec.slot))?;
                    series.require(Channel::Auxiliary(spec.slot))?;
                }
            }
            if !resistive_noop {
                series.require(Channel::Temperature)?;
                series.require(Channel::Humidity)?;
            }

            if spec.pollutant == Pollutant::O3 {
                let no2_available = series.has_channel(Channel::Concentration(Pollutant::No2))
                    || specs[..position]
                        .iter()
                        .any(|earlier| earlier.pollutant == Pollutant::No2);
                if !no2_available {
                    return Err(Error::MissingDependency {
                        pollutant: Pollutant::O3,
                        dependency: Pollutant::No2,
                    });
                }
            }

            records.push(record.clone());
        }
        Ok(records)
    }

    /// Classic electrochemical method: one whole-series formula pass, then
    /// a day loop for statistics only.
    fn run_classic(
        &mut self,
        result: &mut TimeSeries,
        spec: &PollutantSpec,
        record: &CalibrationRecord,
        windows: &[DayWindow],
        reference: Option<&TimeSeries>,
    ) -> Result<DiagnosticsTable> {
        let working = result.require(Channel::Working(spec.slot))?;
        let auxiliary = result.require(Channel::Auxiliary(spec.slot))?;
        let ratio = record.zero_ratio();
        let zero: Vec<f64> = auxiliary.iter().map(|a| ratio * a).collect();
        let concentration = match spec.pollutant {
            Pollutant::O3 => {
                let no2 = result.require(Channel::Concentration(Pollutant::No2))?;
                formula::ozone(working, &zero, no2, record)
            }
            pollutant => formula::electrochemical(pollutant, working, &zero, record),
        };
        result.insert_channel(Channel::Concentration(spec.pollutant), concentration)?;

        let mut table = DiagnosticsTable::new();
        for window in windows {
            let mut core = result.slice(&window.core);
            core.fill_missing(0.0);
            let day = day_record(&core, spec.pollutant, reference, None)?;
            self.observer.notify(&Event::DayProcessed {
                pollutant: spec.pollutant,
                date: window.date,
                valid: None,
            });
            table.insert(window.date, day);
        }
        Ok(table)
    }

    /// Baseline method, for both sensor families: per day, fit the envelope
    /// proxy over the overlap window, apply the formula over the zero-filled
    /// core, and merge the computed channels first-write-wins.
    fn run_baseline(
        &mut self,
        result: &mut TimeSeries,
        spec: &PollutantSpec,
        record: &CalibrationRecord,
        covariate: Covariate,
        windows: &[DayWindow],
        reference: Option<&TimeSeries>,
    ) -> Result<DiagnosticsTable> {
        let signal_channel = match record.family {
            SensorFamily::Electrochemical => Channel::Working(spec.slot),
            SensorFamily::Resistive => Channel::Resistance(spec.pollutant),
        };
        let covariate_channel = match covariate {
            Covariate::Auxiliary => Channel::Auxiliary(spec.slot),
            Covariate::Temperature => Channel::Temperature,
            Covariate::Humidity => Channel::Humidity,
        };
        let baseline_channel = Channel::Baseline(spec.pollutant);
        let deltas = match record.family {
            SensorFamily::Electrochemical => self.config.deltas.clone(),
            SensorFamily::Resistive => self.config.deltas_resistive.clone(),
        };
        let regression = self.config.regression;

        let mut table = DiagnosticsTable::new();
        for window in windows {
            let mut overlap = result.slice(&window.overlap);
            if overlap.len() < 2 {
                table.insert(window.date, DayRecord::missing());
                self.observer.notify(&Event::DayEmpty {
                    pollutant: spec.pollutant,
                    date: window.date,
                });
                continue;
            }

            let signal = overlap.require(signal_channel)?;
            let covariate_values = overlap.require(covariate_channel)?;
            let selected =
                select_baseline(aview1(signal), aview1(covariate_values), &deltas, regression)?;
            self.observer.notify(&Event::BaselineFitted {
                pollutant: spec.pollutant,
                date: window.date,
                delta: selected.delta,
                kind: selected.kind,
                r_value: selected.fit.r_value,
            });

            // Baseline-to-auxiliary offset over the whole overlap window.
            let (delta_aux_avg, ratio_aux_avg) =
                if record.family == SensorFamily::Electrochemical {
                    let auxiliary = overlap.require(Channel::Auxiliary(spec.slot))?;
                    let differences: Vec<f64> = selected
                        .proxy
                        .iter()
                        .zip(auxiliary)
                        .map(|(baseline, aux)| baseline - aux)
                        .collect();
                    let ratios: Vec<f64> = selected
                        .proxy
                        .iter()
                        .zip(auxiliary)
                        .map(|(baseline, aux)| baseline / aux)
                        .collect();
                    (nan_mean(&differences), nan_mean(&ratios))
                } else {
                    (f64::NAN, f64::NAN)
                };
            let diag = BaselineDiagnostics {
                fit: selected.fit,
                delta: selected.delta,
                kind: selected.kind,
                delta_aux_avg,
                ratio_aux_avg,
                valid: selected.fit.slope > 0.0 && selected.fit.r_value > 0.3,
            };

            overlap.insert_channel(baseline_channel, selected.proxy.to_vec())?;
            let mut core = overlap.slice(&window.core);
            core.fill_missing(0.0);

            let baseline_values = core.require(baseline_channel)?.to_vec();
            let concentration = match (record.family, spec.pollutant) {
                (SensorFamily::Electrochemical, Pollutant::O3) => {
                    let no2 = core.require(Channel::Concentration(Pollutant::No2))?;
                    let working = core.require(Channel::Working(spec.slot))?;
                    formula::ozone(working, &baseline_values, no2, record)
                }
                (SensorFamily::Electrochemical, pollutant) => {
                    let working = core.require(Channel::Working(spec.slot))?;
                    formula::electrochemical(pollutant, working, &baseline_values, record)
                }
                (SensorFamily::Resistive, pollutant) => {
                    let resistance = core.require(Channel::Resistance(pollutant))?;
                    formula::resistive(pollutant, resistance, &baseline_values, record)
                }
            };
            core.insert_channel(Channel::Concentration(spec.pollutant), concentration)?;

            // Only the computed channels are merged back; raw channels stay
            // untouched in the accumulated series.
            let computed = TimeSeries::from_parts(
                core.index().to_vec(),
                BTreeMap::from([
                    (baseline_channel, core.require(baseline_channel)?.to_vec()),
                    (
                        Channel::Concentration(spec.pollutant),
                        core.require(Channel::Concentration(spec.pollutant))?.to_vec(),
                    ),
                ]),
            )?;
            result.merge_first_wins(&computed);

            let day = day_record(&core, spec.pollutant, reference, Some(diag))?;
            self.observer.notify(&Event::DayProcessed {
                pollutant: spec.pollutant,
                date: window.date,
                valid: Some(diag.valid),
            });
            table.insert(window.date, day);
        }
        Ok(table)
    }
}

fn day_record(
    core: &TimeSeries,
    pollutant: Pollutant,
    reference: Option<&TimeSeries>,
    baseline: Option<BaselineDiagnostics>,
) -> Result<DayRecord> {
    let temperature = core.require(Channel::Temperature)?;
    let humidity = core.require(Channel::Humidity)?;
    let concentration = core.require(Channel::Concentration(pollutant))?;
    Ok(DayRecord {
        ref_r_squared: reference_r_squared(core, concentration, reference, pollutant),
        temp_avg: nan_mean(temperature),
        temp_std: nan_std(temperature),
        hum_avg: nan_mean(humidity),
        hum_std: nan_std(humidity),
        conc_avg: nan_mean(concentration),
        baseline,
    })
}

/// Squared Pearson correlation against the reference, over the timestamp
/// intersection of the day core; missing without a reference channel or
/// with fewer than two finite pairs.
fn reference_r_squared(
    core: &TimeSeries,
    concentration: &[f64],
    reference: Option<&TimeSeries>,
    pollutant: Pollutant,
) -> f64 {
    let Some(reference) = reference else {
        return f64::NAN;
    };
    let Some(reference_concentration) = reference.channel(Channel::Concentration(pollutant))
    else {
        return f64::NAN;
    };
    let mut computed = Vec::new();
    let mut observed = Vec::new();
    for (row, at) in core.index().iter().enumerate() {
        if let Ok(reference_row) = reference.index().binary_search(at) {
            computed.push(concentration[row]);
            observed.push(reference_concentration[reference_row]);
        }
    }
    pearson(&computed, &observed).map_or(f64::NAN, |r| r * r)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::calibration::CalibrationTable;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 3, day, hour, 0, 0).unwrap()
    }

    fn hourly_series(hours: i64) -> TimeSeries {
        let index: Vec<DateTime<Utc>> =
            (0..=hours).map(|h| at(1, 0) + Duration::hours(h)).collect();
        let len = index.len();
        let channels = BTreeMap::from([
            (Channel::Working(Slot(1)), vec![300.0; len]),
            (Channel::Auxiliary(Slot(1)), vec![50.0; len]),
            (Channel::Temperature, vec![20.0; len]),
            (Channel::Humidity, vec![50.0; len]),
        ]);
        TimeSeries::from_parts(index, channels).unwrap()
    }

    fn no2_table() -> CalibrationTable {
        let mut table = CalibrationTable::new();
        table
            .insert(
                SensorId("S1".into()),
                CalibrationRecord {
                    family: SensorFamily::Electrochemical,
                    target: Pollutant::No2,
                    sensitivity_1: -400.0,
                    sensitivity_2: 0.0,
                    zero_current: 18.0,
                    aux_zero_current: 20.0,
                    zero_air_resistance: 0.0,
                },
            )
            .unwrap();
        table
    }

    fn no2_spec(method: Method) -> PollutantSpec {
        PollutantSpec {
            pollutant: Pollutant::No2,
            sensor: SensorId("S1".into()),
            method,
            slot: Slot(1),
        }
    }

    #[test]
    fn an_empty_series_is_fatal() {
        let table = no2_table();
        let mut pipeline = Pipeline::new(&table, Config::default()).unwrap();
        let result = pipeline.run(&TimeSeries::new(), &[no2_spec(Method::Classic)], None);
        assert!(matches!(result, Err(Error::EmptySeries)));
    }

    #[test]
    fn duplicate_specs_are_fatal() {
        let table = no2_table();
        let mut pipeline = Pipeline::new(&table, Config::default()).unwrap();
        let specs = [no2_spec(Method::Classic), no2_spec(Method::Classic)];
        let result = pipeline.run(&hourly_series(48), &specs, None);
        assert!(matches!(result, Err(Error::DuplicateSpec(Pollutant::No2))));
    }

    #[test]
    fn an_unknown_sensor_is_fatal() {
        let table = CalibrationTable::new();
        let mut pipeline = Pipeline::new(&table, Config::default()).unwrap();
        let result = pipeline.run(&hourly_series(48), &[no2_spec(Method::Classic)], None);
        assert!(matches!(result, Err(Error::UnknownSensor(_))));
    }

    #[test]
    fn a_missing_working_channel_is_fatal() {
        let table = no2_table();
        let mut pipeline = Pipeline::new(&table, Config::default()).unwrap();
        let index = vec![at(1, 0), at(1, 1)];
        let series = TimeSeries::from_parts(index, BTreeMap::new()).unwrap();
        let result = pipeline.run(&series, &[no2_spec(Method::Classic)], None);
        assert!(matches!(
            result,
            Err(Error::MissingChannel(Channel::Working(Slot(1))))
        ));
    }

    #[test]
    fn a_resistive_o3_spec_is_unsupported() {
        let mut table = CalibrationTable::new();
        table
            .insert(
                SensorId("M1".into()),
                CalibrationRecord {
                    family: SensorFamily::Resistive,
                    target: Pollutant::O3,
                    sensitivity_1: 2.0,
                    sensitivity_2: 300.0,
                    zero_current: 0.0,
                    aux_zero_current: 0.0,
                    zero_air_resistance: 100.0,
                },
            )
            .unwrap();
        let mut pipeline = Pipeline::new(&table, Config::default()).unwrap();
        let spec = PollutantSpec {
            pollutant: Pollutant::O3,
            sensor: SensorId("M1".into()),
            method: Method::Baseline {
                covariate: Covariate::Temperature,
            },
            slot: Slot(1),
        };
        // A preceding NO2 channel keeps the dependency check out of the way.
        let mut series = hourly_series(48);
        series
            .insert_channel(Channel::Concentration(Pollutant::No2), vec![0.0; 49])
            .unwrap();
        let result = pipeline.run(&series, &[spec], None);
        assert!(matches!(result, Err(Error::UnsupportedSpec { .. })));
    }

    #[test]
    fn a_resistive_classic_spec_is_a_noop() {
        let mut table = CalibrationTable::new();
        table
            .insert(
                SensorId("M1".into()),
                CalibrationRecord {
                    family: SensorFamily::Resistive,
                    target: Pollutant::Co,
                    sensitivity_1: 2.0,
                    sensitivity_2: 0.0,
                    zero_current: 0.0,
                    aux_zero_current: 0.0,
                    zero_air_resistance: 100.0,
                },
            )
            .unwrap();
        let mut pipeline = Pipeline::new(&table, Config::default()).unwrap();
        let spec = PollutantSpec {
            pollutant: Pollutant::Co,
            sensor: SensorId("M1".into()),
            method: Method::Classic,
            slot: Slot(1),
        };
        let series = hourly_series(48);
        let output = pipeline.run(&series, &[spec], None).unwrap();
        assert!(output.diagnostics[&Pollutant::Co].is_empty());
        assert!(!output
            .series
            .has_channel(Channel::Concentration(Pollutant::Co)));
        assert!(!output.series.has_channel(Channel::Filtered(Pollutant::Co)));
    }

    #[test]
    fn ozone_without_a_no2_source_is_fatal() {
        let mut table = no2_table();
        table
            .insert(
                SensorId("S2".into()),
                CalibrationRecord {
                    family: SensorFamily::Electrochemical,
                    target: Pollutant::O3,
                    sensitivity_1: -380.0,
                    sensitivity_2: -350.0,
                    zero_current: 18.0,
                    aux_zero_current: 20.0,
                    zero_air_resistance: 0.0,
                },
            )
            .unwrap();
        let mut pipeline = Pipeline::new(&table, Config::default()).unwrap();
        let spec = PollutantSpec {
            pollutant: Pollutant::O3,
            sensor: SensorId("S2".into()),
            method: Method::Classic,
            slot: Slot(1),
        };
        let result = pipeline.run(&hourly_series(48), &[spec], None);
        assert!(matches!(
            result,
            Err(Error::MissingDependency {
                pollutant: Pollutant::O3,
                dependency: Pollutant::No2,
            })
        ));
    }

    #[test]
    fn a_mismatched_target_is_fatal() {
        let table = no2_table();
        let mut pipeline = Pipeline::new(&table, Config::default()).unwrap();
        let spec = PollutantSpec {
            pollutant: Pollutant::Co,
            sensor: SensorId("S1".into()),
            method: Method::Classic,
            slot: Slot(1),
        };
        let result = pipeline.run(&hourly_series(48), &[spec], None);
        assert!(matches!(result, Err(Error::TargetMismatch { .. })));
    }
}
