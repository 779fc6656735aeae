//! The structured filter a caller builds for each query.

use crate::normalize::resample::Resample;
use crate::normalize::timezone::TimezonePreference;
use crate::normalize::units::UnitSystem;
use crate::normalize::variables::VariantPolicy;
use crate::query::defaults;
use crate::query::time::TimeValue;
use bon::Builder;
use chrono::Duration;
use std::collections::BTreeMap;

/// Represents a geographical coordinate using latitude and longitude.
///
/// Latitude is the first element (index 0), and longitude is the second (index 1).
///
/// # Examples
///
/// ```
/// use synoptic::LatLon;
///
/// let salt_lake = LatLon(40.7608, -111.8910);
/// assert_eq!(salt_lake.0, 40.7608); // Latitude
/// assert_eq!(salt_lake.1, -111.8910); // Longitude
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon(pub f64, pub f64);

impl LatLon {
    pub(crate) fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.0) && (-180.0..=180.0).contains(&self.1)
    }
}

/// A latitude/longitude box, given by its south-west and north-east corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub south_west: LatLon,
    pub north_east: LatLon,
}

impl BoundingBox {
    pub fn new(south_west: LatLon, north_east: LatLon) -> Self {
        Self {
            south_west,
            north_east,
        }
    }
}

/// Where a radius search is centred.
#[derive(Debug, Clone, PartialEq)]
pub enum RadiusCenter {
    Point(LatLon),
    Station(String),
}

/// Stations within a great-circle distance of a point or of another station.
#[derive(Debug, Clone, PartialEq)]
pub struct Radius {
    pub center: RadiusCenter,
    pub miles: f64,
}

impl Radius {
    /// Stations within `miles` of a coordinate.
    pub fn around_point(point: LatLon, miles: f64) -> Self {
        Self {
            center: RadiusCenter::Point(point),
            miles,
        }
    }

    /// Stations within `miles` of the station `stid`.
    pub fn around_station(stid: impl Into<String>, miles: f64) -> Self {
        Self {
            center: RadiusCenter::Station(stid.into()),
            miles,
        }
    }
}

/// The station selector a valid spec resolves to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StationSelector<'a> {
    Ids(&'a [String]),
    BoundingBox(&'a BoundingBox),
    Radius(&'a Radius),
}

/// A list of names that accepts a single name or any collection of names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringList(pub Vec<String>);

impl StringList {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<&str> for StringList {
    fn from(value: &str) -> Self {
        StringList(vec![value.to_string()])
    }
}

impl From<String> for StringList {
    fn from(value: String) -> Self {
        StringList(vec![value])
    }
}

impl From<Vec<String>> for StringList {
    fn from(value: Vec<String>) -> Self {
        StringList(value)
    }
}

impl From<Vec<&str>> for StringList {
    fn from(value: Vec<&str>) -> Self {
        StringList(value.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for StringList {
    fn from(value: &[&str]) -> Self {
        StringList(value.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for StringList {
    fn from(value: [&str; N]) -> Self {
        StringList(value.iter().map(|s| s.to_string()).collect())
    }
}

/// How the `vars` list filters stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarsOperator {
    /// A station qualifies when it reports any of the variables.
    #[default]
    Or,
    /// A station qualifies only when it reports every variable.
    And,
}

impl VarsOperator {
    pub(crate) fn wire_value(&self) -> &'static str {
        match self {
            VarsOperator::Or => "or",
            VarsOperator::And => "and",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationStatus {
    Active,
    Inactive,
}

impl StationStatus {
    pub(crate) fn wire_value(&self) -> &'static str {
        match self {
            StationStatus::Active => "active",
            StationStatus::Inactive => "inactive",
        }
    }
}

/// Interval length of precipitation accumulations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecipInterval {
    /// Accumulations over N hours (1 to 24).
    Hours(u32),
    Day,
    Week,
    Month,
}

impl PrecipInterval {
    pub(crate) fn wire_value(&self) -> String {
        match self {
            PrecipInterval::Hours(hours) => hours.to_string(),
            PrecipInterval::Day => "day".to_string(),
            PrecipInterval::Week => "week".to_string(),
            PrecipInterval::Month => "month".to_string(),
        }
    }
}

/// A structured, immutable description of one query.
///
/// Built with [`QuerySpec::builder()`]. Omitted options take the values of
/// [`crate::query::defaults::OPTION_DEFAULTS`]. Validation happens when the spec
/// is encoded for a particular service, see [`crate::EncodedRequest::build`].
///
/// # Examples
///
/// ```
/// use synoptic::{QuerySpec, TimeValue, UnitSystem};
///
/// let spec = QuerySpec::builder()
///     .stid("KSLC")
///     .vars(["air_temp", "wind_speed"])
///     .start("202101010000".parse::<TimeValue>().unwrap())
///     .end("202101020000".parse::<TimeValue>().unwrap())
///     .build();
/// assert_eq!(spec.units(), UnitSystem::Metric);
/// ```
#[derive(Debug, Clone, Builder)]
pub struct QuerySpec {
    /// Explicit station ids.
    #[builder(into)]
    pub(crate) stid: Option<StringList>,
    /// Stations inside a latitude/longitude box.
    pub(crate) bbox: Option<BoundingBox>,
    /// Stations within a radius of a point or station.
    pub(crate) radius: Option<Radius>,
    /// Sensor variables, optionally with a `_set_N`/`_set_Nd` suffix naming the preferred variant.
    #[builder(into, default)]
    pub(crate) vars: StringList,
    #[builder(into)]
    pub(crate) start: Option<TimeValue>,
    #[builder(into)]
    pub(crate) end: Option<TimeValue>,
    /// Look-back window for time series instead of start/end.
    pub(crate) recent: Option<Duration>,
    /// Target instant of a nearest-time query.
    #[builder(into)]
    pub(crate) attime: Option<TimeValue>,
    /// Minutes of look-back for latest and nearest-time queries.
    #[builder(default = defaults::WITHIN_MINUTES)]
    pub(crate) within: u32,
    #[builder(default = defaults::UNITS)]
    pub(crate) units: UnitSystem,
    #[builder(default = defaults::OBTIMEZONE)]
    pub(crate) obtimezone: TimezonePreference,
    /// Network ids filter.
    pub(crate) network: Option<Vec<u32>>,
    pub(crate) status: Option<StationStatus>,
    #[builder(default = defaults::VARS_OPERATOR)]
    pub(crate) varsoperator: VarsOperator,
    #[builder(default = defaults::VARIANT_POLICY)]
    pub(crate) variant_policy: VariantPolicy,
    #[builder(default = defaults::RENAME_SETS)]
    pub(crate) rename_sets: bool,
    #[builder(default = defaults::DERIVE_WIND)]
    pub(crate) derive_wind: bool,
    /// Renames applied to canonical column names.
    #[builder(default)]
    pub(crate) rename: BTreeMap<String, String>,
    pub(crate) resample: Option<Resample>,
    /// Ask the metadata service for per-station sensor details.
    #[builder(default)]
    pub(crate) sensorvars: bool,
    pub(crate) precip_interval: Option<PrecipInterval>,
}

impl QuerySpec {
    pub fn units(&self) -> UnitSystem {
        self.units
    }

    pub fn obtimezone(&self) -> TimezonePreference {
        self.obtimezone
    }

    pub fn vars(&self) -> &[String] {
        &self.vars.0
    }

    pub fn variant_policy(&self) -> VariantPolicy {
        self.variant_policy
    }

    pub fn resample(&self) -> Option<Resample> {
        self.resample
    }

    /// Number of station-selector modes that are set.
    pub(crate) fn selector_count(&self) -> usize {
        [
            self.stid.is_some(),
            self.bbox.is_some(),
            self.radius.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    /// The single active station selector, if exactly one is set.
    pub fn station_selector(&self) -> Option<StationSelector<'_>> {
        if self.selector_count() != 1 {
            return None;
        }
        if let Some(ids) = &self.stid {
            return Some(StationSelector::Ids(&ids.0));
        }
        if let Some(bbox) = &self.bbox {
            return Some(StationSelector::BoundingBox(bbox));
        }
        self.radius.as_ref().map(StationSelector::Radius)
    }
}
