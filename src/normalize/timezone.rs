//! Timestamp parsing and per-station timezone resolution.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which clock the timestamps of a normalized table are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimezonePreference {
    /// Every timestamp carries a zero offset.
    #[default]
    Utc,
    /// Timestamps carry the offset of the station's own timezone at that instant.
    Local,
}

impl fmt::Display for TimezonePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimezonePreference::Utc => write!(f, "utc"),
            TimezonePreference::Local => write!(f, "local"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown timezone preference '{0}' (expected utc or local)")]
pub struct UnknownTimezonePreference(pub String);

impl FromStr for TimezonePreference {
    type Err = UnknownTimezonePreference;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utc" => Ok(TimezonePreference::Utc),
            "local" => Ok(TimezonePreference::Local),
            _ => Err(UnknownTimezonePreference(s.to_string())),
        }
    }
}

/// A station timezone as recorded in its metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StationZone {
    Utc,
    Named(Tz),
    Fixed(FixedOffset),
}

impl StationZone {
    /// Resolves a recorded timezone label: an IANA name ("America/Denver") or a
    /// fixed offset ("-07:00", "+0530"). Returns `None` when the label is absent or unknown.
    pub fn resolve(label: Option<&str>) -> Option<StationZone> {
        let label = label.map(str::trim).filter(|l| !l.is_empty())?;
        if label.eq_ignore_ascii_case("utc") || label == "Z" {
            return Some(StationZone::Utc);
        }
        if let Ok(tz) = label.parse::<Tz>() {
            return Some(StationZone::Named(tz));
        }
        parse_offset(label).map(StationZone::Fixed)
    }

    /// Expresses a UTC instant in this zone.
    pub fn localize(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            StationZone::Utc => instant.fixed_offset(),
            StationZone::Named(tz) => instant.with_timezone(tz).fixed_offset(),
            StationZone::Fixed(offset) => instant.with_timezone(offset),
        }
    }
}

fn parse_offset(label: &str) -> Option<FixedOffset> {
    let (sign, rest) = match label.as_bytes().first()? {
        b'+' => (1, &label[1..]),
        b'-' => (-1, &label[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Parses a service timestamp into a UTC instant.
///
/// The service writes `2021-01-01T00:00:00Z`; offset-bearing and naive forms are
/// accepted too, naive values being read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}
