//! Per-pollutant concentration formulas.
//!
//! Constants follow the board documentation: the AlphaDelta PCB converts
//! electrode current to voltage with a fixed transimpedance factor, and the
//! background concentrations come from urban street-canyon modelling
//! (Bright, Bloss and Cai). Output units are ppm for CO and ppb for NO2 and
//! O3, via the unit lookup below.

use itertools::izip;

use crate::calibration::{CalibrationRecord, Pollutant};

/// AlphaDelta PCB transimpedance factor, mV/nA.
pub const PCB_FACTOR: f64 = 6.36;

/// Assumed ambient background concentration, in the pollutant's output unit.
#[must_use]
pub const fn background(pollutant: Pollutant) -> f64 {
    match pollutant {
        Pollutant::Co => 0.2,
        Pollutant::No2 => 8.0,
        Pollutant::O3 => 40.0,
    }
}

/// Conversion factor from ppm to the pollutant's output unit.
#[must_use]
pub const fn unit_factor(pollutant: Pollutant) -> f64 {
    match pollutant {
        Pollutant::Co => 1.0,
        Pollutant::No2 | Pollutant::O3 => 1000.0,
    }
}

/// Conversion factor applied to the subtracted NO2 term of the O3 formula.
pub const SECONDARY_UNIT_FACTOR: f64 = 1000.0;

/// Two-channel electrochemical formula for CO and NO2.
///
/// `zero` is the estimated zero-point of the working electrode: the scaled
/// auxiliary electrode under the classic method, or the baseline proxy under
/// the baseline method.
#[must_use]
pub fn electrochemical(
    pollutant: Pollutant,
    working: &[f64],
    zero: &[f64],
    record: &CalibrationRecord,
) -> Vec<f64> {
    let gain = unit_factor(pollutant) * PCB_FACTOR / record.sensitivity_1.abs();
    izip!(working, zero)
        .map(|(w, z)| background(pollutant) + gain * (w - z))
        .collect()
}

/// Electrochemical O3 formula; subtracts the cross-response to an already
/// computed NO2 concentration.
#[must_use]
pub fn ozone(
    working: &[f64],
    zero: &[f64],
    no2_concentration: &[f64],
    record: &CalibrationRecord,
) -> Vec<f64> {
    let unit = unit_factor(Pollutant::O3);
    let sensitivity_2 = record.sensitivity_2.abs();
    izip!(working, zero, no2_concentration)
        .map(|(w, z, no2)| {
            background(Pollutant::O3)
                + unit * (PCB_FACTOR * (w - z) - no2 / SECONDARY_UNIT_FACTOR * sensitivity_2)
                    / record.sensitivity_1.abs()
        })
        .collect()
}

/// Single-channel resistive formula for CO and NO2.
///
/// The sensitivity keeps its sign here; metal-oxide calibrations quote it
/// signed and the original tables rely on that.
#[must_use]
pub fn resistive(
    pollutant: Pollutant,
    resistance: &[f64],
    baseline: &[f64],
    record: &CalibrationRecord,
) -> Vec<f64> {
    let gain = unit_factor(pollutant) / record.sensitivity_1;
    izip!(resistance, baseline)
        .map(|(r, b)| background(pollutant) + gain * (r - b - record.zero_air_resistance))
        .collect()
}
