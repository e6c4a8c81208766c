//! Timestamp-indexed channel data.
//!
//! A [`TimeSeries`] couples a strictly ascending vector of UTC timestamps
//! with a set of equally long channels. Missing readings are `f64::NAN`;
//! every channel is defined at every timestamp. Channels are identified by
//! the closed [`Channel`] enumeration rather than by strings, and all
//! human-readable labels are resolved in one place ([`Channel::label`]).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use itertools::Itertools;

use crate::calibration::Pollutant;
use crate::error::Error;
use crate::Result;

/// Board position of an electrochemical working/auxiliary electrode pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(pub u8);

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one channel of a [`TimeSeries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    /// Working electrode signal of an electrochemical cell, mV.
    Working(Slot),
    /// Auxiliary electrode signal of an electrochemical cell, mV.
    Auxiliary(Slot),
    /// Metal-oxide sensor resistance, kOhm.
    Resistance(Pollutant),
    /// Ambient temperature, degC.
    Temperature,
    /// Relative humidity, %.
    Humidity,
    /// Computed pollutant concentration.
    Concentration(Pollutant),
    /// Exponentially smoothed pollutant concentration.
    Filtered(Pollutant),
    /// Estimated baseline of the signal the pollutant was computed from.
    Baseline(Pollutant),
}

impl Channel {
    /// Resolves the exported label for this channel.
    ///
    /// Computed channels carry the configured output `suffix`; raw input
    /// channels keep their canonical names.
    #[must_use]
    pub fn label(&self, suffix: &str) -> String {
        match self {
            Self::Working(slot) => format!("working_{slot}"),
            Self::Auxiliary(slot) => format!("auxiliary_{slot}"),
            Self::Resistance(pollutant) => format!("resistance_{pollutant}"),
            Self::Temperature => "temperature".into(),
            Self::Humidity => "humidity".into(),
            Self::Concentration(pollutant) => format!("{pollutant}_{suffix}"),
            Self::Filtered(pollutant) => format!("{pollutant}_{suffix}_filter"),
            Self::Baseline(pollutant) => format!("{pollutant}_{suffix}_baseline"),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concentration(pollutant) => write!(f, "{pollutant}_conc"),
            Self::Filtered(pollutant) => write!(f, "{pollutant}_filter"),
            Self::Baseline(pollutant) => write!(f, "{pollutant}_baseline"),
            other => write!(f, "{}", other.label("")),
        }
    }
}

/// A time interval with `(start, end]` membership.
///
/// A span whose start was clipped to the series minimum keeps its first
/// sample (`closed_start`), so windows tiled over a series never orphan an
/// on-boundary first reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub closed_start: bool,
}

impl Span {
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let after_start = at > self.start || (self.closed_start && at == self.start);
        after_start && at <= self.end
    }
}

/// Timestamp-indexed channel data; the unit of work of the whole pipeline.
#[derive(Debug, Clone, Default)]
pub struct TimeSeries {
    index: Vec<DateTime<Utc>>,
    channels: BTreeMap<Channel, Vec<f64>>,
}

impl TimeSeries {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a series from an index and named channels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnorderedIndex`] unless timestamps are strictly
    /// ascending (which also enforces uniqueness), and
    /// [`Error::LengthMismatch`] if any channel disagrees with the index
    /// length.
    pub fn from_parts(
        index: Vec<DateTime<Utc>>,
        channels: BTreeMap<Channel, Vec<f64>>,
    ) -> Result<Self> {
        if !index.iter().tuple_windows().all(|(a, b)| a < b) {
            return Err(Error::UnorderedIndex);
        }
        for (channel, values) in &channels {
            if values.len() != index.len() {
                return Err(Error::LengthMismatch {
                    channel: *channel,
                    got: values.len(),
                    expected: index.len(),
                });
            }
        }
        Ok(Self { index, channels })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    /// First and last timestamp, `None` for an empty series.
    #[must_use]
    pub fn bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((*self.index.first()?, *self.index.last()?))
    }

    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.channels.keys().copied()
    }

    #[must_use]
    pub fn has_channel(&self, channel: Channel) -> bool {
        self.channels.contains_key(&channel)
    }

    #[must_use]
    pub fn channel(&self, channel: Channel) -> Option<&[f64]> {
        self.channels.get(&channel).map(Vec::as_slice)
    }

    /// Like [`Self::channel`] but missing channels are an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingChannel`].
    pub fn require(&self, channel: Channel) -> Result<&[f64]> {
        self.channel(channel).ok_or(Error::MissingChannel(channel))
    }

    /// Inserts (or wholesale replaces) a channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LengthMismatch`] if `values` disagrees with the
    /// index length.
    pub fn insert_channel(&mut self, channel: Channel, values: Vec<f64>) -> Result<()> {
        if values.len() != self.index.len() {
            return Err(Error::LengthMismatch {
                channel,
                got: values.len(),
                expected: self.index.len(),
            });
        }
        self.channels.insert(channel, values);
        Ok(())
    }

    /// Copies the rows inside `span` into a new series.
    #[must_use]
    pub fn slice(&self, span: &Span) -> Self {
        let rows: Vec<usize> = (0..self.len())
            .filter(|&row| span.contains(self.index[row]))
            .collect();
        let index = rows.iter().map(|&row| self.index[row]).collect();
        let channels = self
            .channels
            .iter()
            .map(|(&channel, values)| (channel, rows.iter().map(|&row| values[row]).collect()))
            .collect();
        Self { index, channels }
    }

    /// Replaces every missing value in every channel with `value`.
    pub fn fill_missing(&mut self, value: f64) {
        for values in self.channels.values_mut() {
            for cell in values.iter_mut() {
                if cell.is_nan() {
                    *cell = value;
                }
            }
        }
    }

    /// Merges `other` into `self` under first-write-wins.
    ///
    /// A cell is written only when it is currently missing; values already
    /// present always take precedence. Timestamps or channels absent from
    /// `self` are admitted and backfilled with missing markers elsewhere.
    pub fn merge_first_wins(&mut self, other: &Self) {
        if other.is_empty() && other.channels.is_empty() {
            return;
        }
        let index: Vec<DateTime<Utc>> = self
            .index
            .iter()
            .merge(other.index.iter())
            .dedup()
            .copied()
            .collect();
        let cell = |series: &Self, channel: Channel, at: &DateTime<Utc>| {
            series
                .channels
                .get(&channel)
                .and_then(|values| series.index.binary_search(at).ok().map(|row| values[row]))
                .unwrap_or(f64::NAN)
        };
        let channels = self
            .channels
            .keys()
            .merge(other.channels.keys())
            .dedup()
            .map(|&channel| {
                let values = index
                    .iter()
                    .map(|at| {
                        let existing = cell(self, channel, at);
                        if existing.is_nan() {
                            cell(other, channel, at)
                        } else {
                            existing
                        }
                    })
                    .collect();
                (channel, values)
            })
            .collect();
        self.index = index;
        self.channels = channels;
    }
}
