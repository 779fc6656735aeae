//! Per-station results and the catalogue records of the non-station services.

use crate::error::SynopticError;
use crate::normalize::units::Unit;
use crate::types::table::TimeTable;
use chrono::{DateTime, Utc};
use polars::prelude::{IntoLazy, LazyFrame};
use serde::Serialize;
use std::collections::BTreeMap;

/// One station of a query result: its metadata plus its normalized observations.
#[derive(Debug, Clone, PartialEq)]
pub struct StationRecord {
    /// Station identifier, e.g. "KSLC".
    pub id: String,
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Elevation in the length unit of the requested unit system, see `elevation_unit`.
    pub elevation: Option<f64>,
    pub elevation_unit: Unit,
    /// Id of the network (MNET) the station belongs to.
    pub network_id: Option<String>,
    pub state: Option<String>,
    /// "ACTIVE" or "INACTIVE" as reported.
    pub status: Option<String>,
    /// The recorded timezone label, usually an IANA name.
    pub timezone: Option<String>,
    pub period_of_record: Option<PeriodOfRecord>,
    /// Logical variables the station has sensors for, sorted.
    pub sensor_variables: Vec<String>,
    /// Distance from the centre of a radius query, in miles.
    pub distance_miles: Option<f64>,
    /// Observations keyed by canonical column name.
    pub table: TimeTable,
    /// Unit of every numeric column in `table`.
    pub units: BTreeMap<String, Unit>,
}

impl StationRecord {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            latitude: None,
            longitude: None,
            elevation: None,
            elevation_unit: Unit::Meters,
            network_id: None,
            state: None,
            status: None,
            timezone: None,
            period_of_record: None,
            sensor_variables: Vec::new(),
            distance_miles: None,
            table: TimeTable::default(),
            units: BTreeMap::new(),
        }
    }

    pub fn unit_of(&self, column: &str) -> Option<&Unit> {
        self.units.get(column)
    }

    /// The observations as a polars `LazyFrame`, one row per timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`SynopticError::Frame`] if polars rejects the columns.
    pub fn to_lazy_frame(&self) -> Result<LazyFrame, SynopticError> {
        self.table
            .to_dataframe()
            .map(|df| df.lazy())
            .map_err(|source| SynopticError::Frame {
                station: self.id.clone(),
                source,
            })
    }
}

/// First and last observation the service holds for a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeriodOfRecord {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// An observation network (MNET).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Network {
    pub id: String,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    pub url: Option<String>,
    /// Id of the network type, see [`NetworkType`].
    pub category: Option<String>,
    pub reporting_stations: Option<i64>,
    pub last_observation: Option<DateTime<Utc>>,
}

/// A category of observation networks (MNETCAT).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkType {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
}

/// A quality-control check the service may flag observations with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QcType {
    pub id: String,
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub source: Option<String>,
}

/// Catalogue entry of a sensor variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableInfo {
    /// Human readable description, e.g. "Temperature".
    pub long_name: String,
    /// Unit label the service reports the variable in, e.g. "Celsius".
    pub unit: Option<String>,
}
