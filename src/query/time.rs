//! Absolute and relative time values accepted by query options.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::str::FromStr;
use thiserror::Error;

/// Wire format of absolute instants: `YYYYMMDDhhmm` in UTC.
pub(crate) const WIRE_FORMAT: &str = "%Y%m%d%H%M";

/// A point in time as given by the caller.
///
/// Relative values are resolved against the caller's clock when the request is built,
/// so the encoded request always carries absolute instants.
///
/// # Examples
///
/// ```
/// use synoptic::TimeValue;
/// use chrono::{Duration, TimeZone, Utc};
///
/// let absolute: TimeValue = "202101010000".parse().unwrap();
/// assert_eq!(absolute, TimeValue::Absolute(Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()));
///
/// let relative: TimeValue = "3 hours ago".parse().unwrap();
/// assert_eq!(relative, TimeValue::Ago(Duration::hours(3)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeValue {
    /// A fixed UTC instant.
    Absolute(DateTime<Utc>),
    /// A duration before "now".
    Ago(Duration),
}

impl TimeValue {
    /// Resolves the value to an absolute instant relative to `now`.
    ///
    /// Returns `None` when the instant falls outside the representable range.
    pub fn resolve(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimeValue::Absolute(dt) => Some(*dt),
            TimeValue::Ago(duration) => now.checked_sub_signed(*duration),
        }
    }
}

impl From<DateTime<Utc>> for TimeValue {
    fn from(value: DateTime<Utc>) -> Self {
        TimeValue::Absolute(value)
    }
}

impl From<NaiveDateTime> for TimeValue {
    fn from(value: NaiveDateTime) -> Self {
        TimeValue::Absolute(Utc.from_utc_datetime(&value))
    }
}

impl From<Duration> for TimeValue {
    fn from(value: Duration) -> Self {
        TimeValue::Ago(value)
    }
}

/// Error returned when a string cannot be read as a [`TimeValue`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    #[error("'{0}' is not a time (expected YYYYMMDDhhmm or 'N minutes/hours/days ago')")]
    Unrecognized(String),
    #[error("'{0}' is outside the representable time range")]
    OutOfRange(String),
}

impl FromStr for TimeValue {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.ends_with("ago") {
            let (amount, unit) = split_relative(trimmed)
                .ok_or_else(|| TimeParseError::Unrecognized(s.to_string()))?;
            return match parse_duration_unit(amount, unit) {
                Some(Some(duration)) => Ok(TimeValue::Ago(duration)),
                Some(None) => Err(TimeParseError::OutOfRange(s.to_string())),
                None => Err(TimeParseError::Unrecognized(s.to_string())),
            };
        }
        parse_absolute(trimmed)
            .map(TimeValue::Absolute)
            .ok_or_else(|| TimeParseError::Unrecognized(s.to_string()))
    }
}

fn parse_absolute(s: &str) -> Option<DateTime<Utc>> {
    if s.chars().all(|c| c.is_ascii_digit()) {
        return match s.len() {
            12 => NaiveDateTime::parse_from_str(s, WIRE_FORMAT)
                .ok()
                .map(|dt| Utc.from_utc_datetime(&dt)),
            8 => NaiveDate::parse_from_str(s, "%Y%m%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| Utc.from_utc_datetime(&dt)),
            _ => None,
        };
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn split_relative(s: &str) -> Option<(i64, &str)> {
    let mut parts = s.split_whitespace();
    let amount: i64 = parts.next()?.parse().ok()?;
    let unit = parts.next()?;
    if parts.next()? != "ago" || parts.next().is_some() || amount < 0 {
        return None;
    }
    Some((amount, unit))
}

/// Builds a duration from an amount and a unit word such as `minutes`, `h` or `days`.
///
/// The outer `None` means the unit is unknown, the inner one that the duration overflows.
pub(crate) fn parse_duration_unit(amount: i64, unit: &str) -> Option<Option<Duration>> {
    match unit.to_ascii_lowercase().as_str() {
        "m" | "min" | "mins" | "minute" | "minutes" => Some(Duration::try_minutes(amount)),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(Duration::try_hours(amount)),
        "d" | "day" | "days" => Some(Duration::try_days(amount)),
        "w" | "week" | "weeks" => Some(Duration::try_weeks(amount)),
        _ => None,
    }
}

pub(crate) fn format_wire(dt: DateTime<Utc>) -> String {
    dt.format(WIRE_FORMAT).to_string()
}
