use crate::normalize::timezone::TimezonePreference;
use crate::normalize::units::UnitSystem;
use crate::types::service::Service;
use crate::types::station::StationRecord;
use chrono::{DateTime, Utc};
use std::fmt;

/// Context of the request an [`ObservationSet`] answers.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMetadata {
    pub service: Service,
    /// Unit system every numeric column was converted into.
    pub units: UnitSystem,
    /// Clock the station indexes are expressed in.
    pub timezone: TimezonePreference,
    /// Requested time range, when the query had one.
    pub window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Request URL with the token redacted.
    pub url: String,
    /// The service's own response message.
    pub message: Option<String>,
}

/// A non-fatal condition met while normalizing a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeWarning {
    /// Local time was requested but the station has no usable timezone; its index stays in UTC.
    TimezoneFallback { station: String },
    /// The payload repeated timestamps; the rows were merged.
    DuplicateTimestamps { station: String, merged: usize },
}

impl fmt::Display for NormalizeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeWarning::TimezoneFallback { station } => {
                write!(f, "station {} has no timezone, kept UTC", station)
            }
            NormalizeWarning::DuplicateTimestamps { station, merged } => {
                write!(f, "station {}: merged {} duplicate timestamps", station, merged)
            }
        }
    }
}

/// The normalized result of one query: one [`StationRecord`] per station.
#[derive(Debug, Clone)]
pub struct ObservationSet {
    pub stations: Vec<StationRecord>,
    pub metadata: RequestMetadata,
    pub warnings: Vec<NormalizeWarning>,
}

impl ObservationSet {
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Looks up a station by id, ignoring case.
    pub fn get(&self, stid: &str) -> Option<&StationRecord> {
        self.stations
            .iter()
            .find(|s| s.id.eq_ignore_ascii_case(stid))
    }

    pub fn get_mut(&mut self, stid: &str) -> Option<&mut StationRecord> {
        self.stations
            .iter_mut()
            .find(|s| s.id.eq_ignore_ascii_case(stid))
    }

    pub fn iter(&self) -> impl Iterator<Item = &StationRecord> {
        self.stations.iter()
    }
}

impl<'a> IntoIterator for &'a ObservationSet {
    type Item = &'a StationRecord;
    type IntoIter = std::slice::Iter<'a, StationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.stations.iter()
    }
}
