//! The simulation time grid and helpers for working with timestamps.
use crate::error::DispatchError;
use crate::units::Hours;
use anyhow::{Result, bail, ensure};
use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta};
use std::ops::Range;

/// The format used for timestamps in configuration and input files
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Number of days used to convert annual quantities
const DAYS_PER_YEAR: f64 = 365.0;

/// Parse a timestamp in [`TIMESTAMP_FORMAT`]
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    Ok(NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)?)
}

/// Parse a frequency string such as `60min`, `15min` or `1h` into a time step.
///
/// Fails with a [`DispatchError::Configuration`] if the string is not a positive number of minutes
/// or hours.
pub fn parse_frequency(freq: &str) -> Result<TimeDelta> {
    let freq = freq.trim();
    let lower = freq.to_lowercase();
    let (number, minutes_per_unit) = if let Some(number) = lower.strip_suffix("min") {
        (number, 1)
    } else if let Some(number) = lower.strip_suffix('h') {
        (number, 60)
    } else {
        bail!(DispatchError::Configuration(format!(
            "Invalid frequency '{freq}': expected e.g. '60min' or '1h'"
        )));
    };

    // Pandas-style frequencies allow the number to be omitted (e.g. "h")
    let count: i64 = if number.is_empty() {
        1
    } else {
        match number.parse() {
            Ok(count) if count > 0 => count,
            _ => bail!(DispatchError::Configuration(format!(
                "Invalid frequency '{freq}': the step length must be a positive integer"
            ))),
        }
    };

    TimeDelta::try_minutes(count * minutes_per_unit).ok_or_else(|| {
        DispatchError::Configuration(format!("Invalid frequency '{freq}': step too long")).into()
    })
}

/// An ordered sequence of equally spaced timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct TimeIndex {
    timestamps: Vec<NaiveDateTime>,
    step: TimeDelta,
}

impl TimeIndex {
    /// Create a time index spanning `[start, end]` with the given step.
    ///
    /// The end timestamp is included if it lies on the grid.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime, step: TimeDelta) -> Result<Self> {
        if start >= end {
            bail!(DispatchError::Configuration(format!(
                "Start time {start} must be before end time {end}"
            )));
        }
        ensure!(step > TimeDelta::zero(), "Time step must be positive");

        let mut timestamps = Vec::new();
        let mut current = start;
        while current <= end {
            timestamps.push(current);
            current += step;
        }

        Ok(Self { timestamps, step })
    }

    /// The number of time steps
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the index has no time steps
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// The length of a single time step
    pub fn step(&self) -> TimeDelta {
        self.step
    }

    /// The length of a single time step in hours
    pub fn step_hours(&self) -> Hours {
        Hours(self.step.num_seconds() as f64 / 3600.0)
    }

    /// The first timestamp
    pub fn start(&self) -> NaiveDateTime {
        self.timestamps[0]
    }

    /// The last timestamp
    pub fn end(&self) -> NaiveDateTime {
        self.timestamps[self.timestamps.len() - 1]
    }

    /// Iterate over the timestamps
    pub fn iter(&self) -> impl Iterator<Item = &NaiveDateTime> {
        self.timestamps.iter()
    }

    /// Get the timestamps as a slice
    pub fn as_slice(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    /// The number of whole time steps in a number of hours, if it is a whole number
    pub fn steps_in_hours(&self, hours: u32) -> Option<usize> {
        let seconds = i64::from(hours) * 3600;
        let step_seconds = self.step.num_seconds();
        (seconds % step_seconds == 0).then(|| (seconds / step_seconds) as usize)
    }

    /// Get a new time index covering a sub-range of this one
    pub fn window(&self, range: Range<usize>) -> TimeIndex {
        assert!(range.end <= self.len() && range.start < range.end);

        Self {
            timestamps: self.timestamps[range].to_vec(),
            step: self.step,
        }
    }

    /// The share of the index covered by `len` time steps
    pub fn share_of(&self, len: usize) -> f64 {
        len as f64 / self.len() as f64
    }
}

/// The number of whole days between two timestamps
pub fn days_between(d1: NaiveDateTime, d2: NaiveDateTime) -> i64 {
    let (earlier, later) = if d1 <= d2 { (d1, d2) } else { (d2, d1) };
    (later - earlier).num_days()
}

/// The number of whole time steps of length `step` between two timestamps
pub fn time_steps_between(ts1: NaiveDateTime, ts2: NaiveDateTime, step: TimeDelta) -> i64 {
    (ts2 - ts1).num_seconds().div_euclid(step.num_seconds())
}

/// Convert an annual limit into a limit for the period from `start` to `end`.
///
/// Within a single year the limit is scaled by the number of whole days in the period. Across
/// years, each full year in between contributes the whole limit and the first and last years
/// contribute the fraction of the year which lies within the period.
pub fn convert_annual_limit(annual_limit: f64, start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    let start_year = start.year();
    let end_year = end.year();

    if start_year == end_year {
        return annual_limit * days_between(start, end) as f64 / DAYS_PER_YEAR;
    }

    // NB: The first and last day exist in every year, so these can't fail
    let start_year_begin = NaiveDate::from_ymd_opt(start_year, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap();
    let end_year_end = NaiveDate::from_ymd_opt(end_year, 12, 31)
        .and_then(|date| date.and_hms_opt(23, 59, 59))
        .unwrap();
    let start_fraction =
        (DAYS_PER_YEAR - days_between(start_year_begin, start) as f64) / DAYS_PER_YEAR;
    let end_fraction = (DAYS_PER_YEAR - days_between(end, end_year_end) as f64) / DAYS_PER_YEAR;
    let full_years = f64::from(end_year - start_year - 1);

    annual_limit * (full_years + start_fraction + end_fraction)
}
