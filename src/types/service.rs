//! Defines the remote services (endpoints) of the Synoptic API.

use std::fmt;

/// One of the Synoptic API services a request can target.
///
/// Station services live under `/stations/{name}`, the remaining services sit
/// directly under the API root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Token creation and revocation.
    Auth,
    /// Most recent observation of each variable.
    Latest,
    /// Observation nearest to a given instant.
    NearestTime,
    /// Accumulated precipitation over a period.
    Precipitation,
    /// Full time series over a period.
    TimeSeries,
    /// Station metadata without observations.
    Metadata,
    /// Observation networks.
    Networks,
    /// Categories of observation networks.
    NetworkTypes,
    /// Catalogue of sensor variables.
    Variables,
    /// Catalogue of quality-control checks.
    QcTypes,
}

impl Service {
    pub(crate) fn path_segment(&self) -> &'static str {
        match self {
            Service::Auth => "auth",
            Service::Latest => "stations/latest",
            Service::NearestTime => "stations/nearesttime",
            Service::Precipitation => "stations/precipitation",
            Service::TimeSeries => "stations/timeseries",
            Service::Metadata => "stations/metadata",
            Service::Networks => "networks",
            Service::NetworkTypes => "networktypes",
            Service::Variables => "variables",
            Service::QcTypes => "qctypes",
        }
    }

    /// Whether the service selects stations and therefore needs a station selector.
    pub fn is_station_service(&self) -> bool {
        matches!(
            self,
            Service::Latest
                | Service::NearestTime
                | Service::Precipitation
                | Service::TimeSeries
                | Service::Metadata
        )
    }

    /// Whether the service returns sensor observations.
    pub fn returns_observations(&self) -> bool {
        matches!(
            self,
            Service::Latest | Service::NearestTime | Service::Precipitation | Service::TimeSeries
        )
    }
}

/// Formats a `Service` using its URL path segment.
///
/// # Examples
///
/// ```
/// use synoptic::Service;
///
/// assert_eq!(Service::TimeSeries.to_string(), "stations/timeseries");
/// assert_eq!(format!("{}", Service::Networks), "networks");
/// ```
impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path_segment())
    }
}
