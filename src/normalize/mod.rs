//! Turns raw service responses into [`ObservationSet`]s.
//!
//! Per station the pipeline runs: extract columns, sort and merge duplicate
//! timestamps, resolve sensor variants to canonical names, convert units,
//! resample, express the index in the requested clock, append derived columns.

pub(crate) mod catalog;
pub(crate) mod columns;
pub(crate) mod payload;
pub mod resample;
pub mod timezone;
pub mod units;
pub mod variables;

use crate::derived::{append_wind_components, wind_pairs};
use crate::error::{ParseError, SynopticError};
use crate::normalize::columns::RawColumns;
use crate::normalize::payload::{Envelope, RawStation};
use crate::normalize::resample::resample;
use crate::normalize::timezone::{parse_timestamp, StationZone, TimezonePreference};
use crate::normalize::units::{convert, convert_column, Unit};
use crate::normalize::variables::{explicit_variants, Resolution, SensorKey};
use crate::query::spec::{QuerySpec, RadiusCenter};
use crate::transport::RawResponse;
use crate::types::observation_set::{NormalizeWarning, ObservationSet, RequestMetadata};
use crate::types::service::Service;
use crate::types::station::{PeriodOfRecord, StationRecord};
use crate::types::table::{TableError, TimeTable};
use chrono::{DateTime, Utc};
use haversine::{distance, Location as HaversineLocation, Units};
use log::{debug, warn};
use std::collections::BTreeMap;

/// Normalizes responses of the station services against the query that produced them.
pub struct Normalizer<'a> {
    spec: &'a QuerySpec,
    window: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl<'a> Normalizer<'a> {
    pub fn new(spec: &'a QuerySpec) -> Self {
        Self { spec, window: None }
    }

    /// Overrides the time window used as the resampling grid.
    pub fn with_window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.window = Some((start, end));
        self
    }

    /// Parses a response into an [`ObservationSet`].
    ///
    /// # Errors
    ///
    /// Returns [`SynopticError::Parse`] when the body is not JSON, a station lacks
    /// its id, a timestamp does not parse or a column does not match its index.
    pub fn parse(&self, raw: &RawResponse) -> Result<ObservationSet, SynopticError> {
        let service = raw.service;
        let envelope: Envelope =
            serde_json::from_str(&raw.body).map_err(|e| SynopticError::parse(service, e))?;
        let window = self.window.or(raw.window);

        let mut warnings = Vec::new();
        let mut stations = envelope
            .stations
            .iter()
            .map(|station| self.station(service, station, &envelope, window, &mut warnings))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(radius) = &self.spec.radius {
            if let RadiusCenter::Point(center) = radius.center {
                order_by_distance(&mut stations, center.0, center.1);
            }
        }

        Ok(ObservationSet {
            stations,
            metadata: RequestMetadata {
                service,
                units: self.spec.units,
                timezone: self.spec.obtimezone,
                window,
                url: raw.url.clone(),
                message: envelope
                    .summary
                    .as_ref()
                    .and_then(|s| s.response_message.clone()),
            },
            warnings,
        })
    }

    fn station(
        &self,
        service: Service,
        raw: &RawStation,
        envelope: &Envelope,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
        warnings: &mut Vec<NormalizeWarning>,
    ) -> Result<StationRecord, SynopticError> {
        let stid = raw
            .stid
            .clone()
            .ok_or_else(|| SynopticError::parse(service, ParseError::missing("STID", None)))?;
        let mut record = self.metadata(stid, raw, envelope);

        let mut columns = match (&raw.observations, service) {
            (_, Service::Metadata) => Ok(RawColumns::default()),
            (Some(obs), Service::TimeSeries) => columns::timeseries(&record.id, obs),
            (Some(obs), Service::Latest | Service::NearestTime) => columns::latest(&record.id, obs),
            (Some(obs), Service::Precipitation) => columns::precipitation(&record.id, obs),
            (None, _) if service.returns_observations() => Err(ParseError::missing(
                "OBSERVATIONS",
                Some(&record.id),
            )),
            _ => Ok(RawColumns::default()),
        }
        .map_err(|e| SynopticError::parse(service, e))?;

        let merged = columns.sort_and_merge();
        if merged > 0 {
            warn!(
                "Merged {} duplicate timestamps for station {}",
                merged, record.id
            );
            warnings.push(NormalizeWarning::DuplicateTimestamps {
                station: record.id.clone(),
                merged,
            });
        }

        let canonical = self.resolution_map(&columns);
        let mut numeric = BTreeMap::new();
        for (column, mut values) in std::mem::take(&mut columns.numeric) {
            let name = canonical.get(&column).cloned().unwrap_or_else(|| column.clone());
            let variable = SensorKey::parse(&column).variable;
            match unit_label(envelope, &variable) {
                Some(label) => {
                    let unit = convert_column(&mut values, &Unit::parse(label), self.spec.units);
                    record.units.insert(name.clone(), unit);
                }
                None => debug!("No unit reported for column '{}' of {}", column, record.id),
            }
            numeric.insert(name, values);
        }
        let text: BTreeMap<String, Vec<Option<String>>> = std::mem::take(&mut columns.text)
            .into_iter()
            .map(|(column, values)| {
                let name = canonical.get(&column).cloned().unwrap_or(column);
                (name, values)
            })
            .collect();

        let (index, numeric, text) = match self.spec.resample {
            Some(rs) => {
                let aligned = resample(&rs, &columns.index, &numeric, &text, window);
                (aligned.index, aligned.columns, aligned.text)
            }
            None => (columns.index, numeric, text),
        };

        record.table = self
            .build_table(&record, index, numeric, text, warnings)
            .map_err(|e| SynopticError::parse(service, e))?;

        if self.spec.derive_wind && !wind_pairs(&record.table).is_empty() {
            append_wind_components(&mut record)?;
        }
        Ok(record)
    }

    fn metadata(&self, stid: String, raw: &RawStation, envelope: &Envelope) -> StationRecord {
        let mut record = StationRecord::new(stid);
        let elevation_unit = envelope
            .unit_of("elevation")
            .map(Unit::parse)
            .unwrap_or(Unit::Feet);
        let elevation_target = elevation_unit.target(self.spec.units);

        record.name = raw.name.clone();
        record.latitude = raw.latitude;
        record.longitude = raw.longitude;
        record.elevation = raw
            .elevation
            .map(|e| convert(e, &elevation_unit, &elevation_target));
        record.elevation_unit = elevation_target;
        record.network_id = raw.network_id.clone();
        record.state = raw.state.clone();
        record.status = raw.status.clone();
        record.timezone = raw.timezone.clone();
        record.period_of_record = raw.period_of_record.as_ref().map(|p| PeriodOfRecord {
            start: p.start.as_deref().and_then(parse_timestamp),
            end: p.end.as_deref().and_then(parse_timestamp),
        });
        record.sensor_variables = raw
            .sensor_variables
            .as_ref()
            .map(|vars| vars.keys().cloned().collect())
            .unwrap_or_default();
        record.sensor_variables.sort();
        record.distance_miles = raw.distance;
        record
    }

    fn resolution_map(&self, columns: &RawColumns) -> BTreeMap<String, String> {
        let explicit = explicit_variants(self.spec.vars.iter());
        let resolution = Resolution {
            policy: self.spec.variant_policy,
            explicit: &explicit,
            rename_sets: self.spec.rename_sets,
            rename: &self.spec.rename,
        };
        resolution.resolve(&columns.names(), |column| columns.count_valid(column))
    }

    fn build_table(
        &self,
        record: &StationRecord,
        index: Vec<DateTime<Utc>>,
        numeric: BTreeMap<String, Vec<f64>>,
        text: BTreeMap<String, Vec<Option<String>>>,
        warnings: &mut Vec<NormalizeWarning>,
    ) -> Result<TimeTable, ParseError> {
        let zone = match self.spec.obtimezone {
            TimezonePreference::Utc => StationZone::Utc,
            TimezonePreference::Local => match StationZone::resolve(record.timezone.as_deref()) {
                Some(zone) => zone,
                None => {
                    warn!(
                        "Station {} has no usable timezone ({:?}), keeping UTC",
                        record.id, record.timezone
                    );
                    warnings.push(NormalizeWarning::TimezoneFallback {
                        station: record.id.clone(),
                    });
                    StationZone::Utc
                }
            },
        };

        let localized = index.into_iter().map(|t| zone.localize(t)).collect();
        let table_error = |e: TableError| match e {
            TableError::UnorderedIndex(position) => ParseError::UnorderedIndex {
                station: record.id.clone(),
                position,
            },
            TableError::LengthMismatch {
                column,
                expected,
                found,
            } => ParseError::LengthMismatch {
                station: record.id.clone(),
                column,
                expected,
                found,
            },
        };

        let mut table = TimeTable::new(localized).map_err(table_error)?;
        for (name, values) in numeric {
            table.insert_column(name, values).map_err(table_error)?;
        }
        for (name, values) in text {
            table.insert_text_column(name, values).map_err(table_error)?;
        }
        Ok(table)
    }
}

/// Parses a station-service response, see [`Normalizer::parse`].
pub fn parse(raw: &RawResponse, spec: &QuerySpec) -> Result<ObservationSet, SynopticError> {
    Normalizer::new(spec).parse(raw)
}

/// Unit label of a variable. Precipitation variants share the `precipitation` unit.
fn unit_label<'e>(envelope: &'e Envelope, variable: &str) -> Option<&'e str> {
    envelope.unit_of(variable).or_else(|| {
        if variable.contains("precip") {
            envelope.unit_of(columns::PRECIPITATION)
        } else {
            None
        }
    })
}

/// Fills in missing distances from the coordinates and sorts stations nearest first.
/// Stations without a known distance go last.
fn order_by_distance(stations: &mut [StationRecord], latitude: f64, longitude: f64) {
    for station in stations.iter_mut() {
        if station.distance_miles.is_some() {
            continue;
        }
        if let (Some(lat), Some(lon)) = (station.latitude, station.longitude) {
            station.distance_miles = Some(distance(
                HaversineLocation {
                    latitude,
                    longitude,
                },
                HaversineLocation {
                    latitude: lat,
                    longitude: lon,
                },
                Units::Miles,
            ));
        }
    }
    stations.sort_by(|a, b| {
        let a = a.distance_miles.unwrap_or(f64::INFINITY);
        let b = b.distance_miles.unwrap_or(f64::INFINITY);
        a.total_cmp(&b)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::resample::Resample;
    use crate::normalize::units::UnitSystem;
    use crate::normalize::variables::VariantPolicy;
    use crate::query::spec::{LatLon, Radius};
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    const KSLC: &str = r#"{
        "SUMMARY": {"RESPONSE_CODE": 1, "RESPONSE_MESSAGE": "OK", "NUMBER_OF_OBJECTS": 1},
        "UNITS": {"position": "ft", "elevation": "ft", "air_temp": "Celsius",
                  "wind_speed": "m/s", "wind_direction": "Degrees", "pressure": "Pascals"},
        "STATION": [{
            "STID": "KSLC",
            "NAME": "Salt Lake City, Salt Lake City International Airport",
            "ELEVATION": "4226",
            "LATITUDE": "40.77069",
            "LONGITUDE": "-111.96503",
            "MNET_ID": "1",
            "STATE": "UT",
            "STATUS": "ACTIVE",
            "TIMEZONE": "America/Denver",
            "PERIOD_OF_RECORD": {"start": "1997-01-01T00:00:00Z", "end": "2021-06-01T00:00:00Z"},
            "SENSOR_VARIABLES": {"air_temp": {}, "wind_speed": {}, "wind_direction": {}, "pressure": {}, "metar": {}},
            "OBSERVATIONS": {
                "date_time": ["2021-01-01T00:00:00Z", "2021-01-01T01:00:00Z", "2021-01-01T02:00:00Z"],
                "air_temp_set_1": [-1.0, null, -2.5],
                "air_temp_set_1d": [-1.1, -1.9, -2.4],
                "wind_speed_set_1": [10.0, 0.0, 3.0],
                "wind_direction_set_1": [270.0, 90.0, null],
                "pressure_set_1d": [86000.0, 86100.0, "NA"],
                "metar_set_1": ["KSLC 010000Z", null, "KSLC 010200Z"]
            }
        }]
    }"#;

    fn raw(service: Service, body: &str) -> RawResponse {
        RawResponse {
            service,
            url: "https://example.invalid/v2/stations/timeseries?token=HIDDEN".to_string(),
            status: 200,
            body: body.to_string(),
            window: Some((
                Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap(),
            )),
        }
    }

    fn kslc_spec() -> QuerySpec {
        QuerySpec::builder().stid("KSLC").vars("air_temp").build()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_kslc_timeseries_metric() {
        let set = parse(&raw(Service::TimeSeries, KSLC), &kslc_spec()).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.metadata.units, UnitSystem::Metric);
        assert_eq!(set.metadata.message.as_deref(), Some("OK"));
        let record = set.get("kslc").unwrap();
        assert_eq!(record.id, "KSLC");
        assert_eq!(record.latitude, Some(40.77069));
        assert_eq!(record.state.as_deref(), Some("UT"));
        assert!(close(record.elevation.unwrap(), 4226.0 * 0.3048));
        assert_eq!(record.elevation_unit, Unit::Meters);
        assert_eq!(record.sensor_variables.len(), 5);

        let table = &record.table;
        assert_eq!(table.len(), 3);
        assert!(table.index().windows(2).all(|w| w[0] < w[1]));
        let temps = table.column("air_temp").unwrap();
        assert_eq!(temps[0], -1.0);
        assert!(temps[1].is_nan());
        assert_eq!(record.unit_of("air_temp"), Some(&Unit::Celsius));
        assert!(table.column("air_temp_set_1d").is_some());

        let pressure = table.column("pressure").unwrap();
        assert!(close(pressure[0], 860.0));
        assert!(pressure[2].is_nan());
        assert_eq!(record.unit_of("pressure"), Some(&Unit::HectoPascal));

        assert_eq!(table.column("wind_u").unwrap()[0], 10.0);
        assert_eq!(table.column("wind_v").unwrap()[1], 0.0);
        assert!(table.column("wind_u").unwrap()[2].is_nan());
        assert_eq!(
            table.text_column("metar").unwrap()[2].as_deref(),
            Some("KSLC 010200Z")
        );
        assert!(set.warnings.is_empty());
    }

    #[test]
    fn test_imperial_and_local_time() {
        let spec = QuerySpec::builder()
            .stid("KSLC")
            .vars("air_temp")
            .units(UnitSystem::Imperial)
            .obtimezone(TimezonePreference::Local)
            .build();
        let set = parse(&raw(Service::TimeSeries, KSLC), &spec).unwrap();
        let record = &set.stations[0];
        assert!(close(record.table.column("air_temp").unwrap()[0], 30.2));
        assert_eq!(record.unit_of("wind_speed"), Some(&Unit::MilesPerHour));
        assert_eq!(record.elevation, Some(4226.0));
        assert_eq!(
            record.table.index()[0].to_rfc3339(),
            "2020-12-31T17:00:00-07:00"
        );
    }

    #[test]
    fn test_missing_timezone_falls_back_with_warning() {
        let body = KSLC.replace(r#""TIMEZONE": "America/Denver","#, "");
        let spec = QuerySpec::builder()
            .stid("KSLC")
            .vars("air_temp")
            .obtimezone(TimezonePreference::Local)
            .build();
        let set = parse(&raw(Service::TimeSeries, &body), &spec).unwrap();
        assert_eq!(
            set.warnings,
            vec![NormalizeWarning::TimezoneFallback {
                station: "KSLC".to_string()
            }]
        );
        assert_eq!(set.stations[0].table.index()[0].offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_resolution_is_deterministic_across_parses() {
        let spec = kslc_spec();
        let a = parse(&raw(Service::TimeSeries, KSLC), &spec).unwrap();
        let b = parse(&raw(Service::TimeSeries, KSLC), &spec).unwrap();
        let names = |set: &ObservationSet| {
            set.stations[0]
                .table
                .column_names()
                .map(str::to_string)
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&a), names(&b));
    }

    #[test]
    fn test_explicit_derived_variant_and_policy() {
        let explicit = QuerySpec::builder()
            .stid("KSLC")
            .vars("air_temp_set_1d")
            .build();
        let set = parse(&raw(Service::TimeSeries, KSLC), &explicit).unwrap();
        assert_eq!(set.stations[0].table.column("air_temp").unwrap()[1], -1.9);

        let most = QuerySpec::builder()
            .stid("KSLC")
            .vars("air_temp")
            .variant_policy(VariantPolicy::MostObservations)
            .build();
        let set = parse(&raw(Service::TimeSeries, KSLC), &most).unwrap();
        assert_eq!(set.stations[0].table.column("air_temp").unwrap()[0], -1.1);
    }

    #[test]
    fn test_all_missing_rows_are_kept() {
        let body = json!({
            "STATION": [{
                "STID": "EMPTY",
                "OBSERVATIONS": {
                    "date_time": ["2021-01-01T00:00:00Z", "2021-01-01T00:05:00Z"],
                    "air_temp_set_1": [null, null]
                }
            }]
        })
        .to_string();
        let set = parse(&raw(Service::TimeSeries, &body), &kslc_spec()).unwrap();
        let table = &set.stations[0].table;
        assert_eq!(table.len(), 2);
        assert!(table.column("air_temp").unwrap().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_duplicates_are_merged_with_warning() {
        let body = json!({
            "STATION": [{
                "STID": "DUP",
                "OBSERVATIONS": {
                    "date_time": ["2021-01-01T00:00:00Z", "2021-01-01T00:00:00Z", "2021-01-01T01:00:00Z"],
                    "air_temp_set_1": [null, 4.0, 5.0]
                }
            }]
        })
        .to_string();
        let set = parse(&raw(Service::TimeSeries, &body), &kslc_spec()).unwrap();
        assert_eq!(set.stations[0].table.column("air_temp").unwrap(), &[4.0, 5.0]);
        assert_eq!(
            set.warnings,
            vec![NormalizeWarning::DuplicateTimestamps {
                station: "DUP".to_string(),
                merged: 1
            }]
        );
    }

    #[test]
    fn test_structural_errors() {
        let not_json = parse(&raw(Service::TimeSeries, "<html>"), &kslc_spec());
        assert!(matches!(
            not_json,
            Err(SynopticError::Parse {
                source: ParseError::InvalidJson(_),
                ..
            })
        ));

        let no_stid = json!({"STATION": [{"NAME": "anonymous", "OBSERVATIONS": {"date_time": []}}]}).to_string();
        assert!(matches!(
            parse(&raw(Service::TimeSeries, &no_stid), &kslc_spec()),
            Err(SynopticError::Parse {
                source: ParseError::MissingField { .. },
                ..
            })
        ));

        let no_obs = json!({"STATION": [{"STID": "X"}]}).to_string();
        assert!(parse(&raw(Service::TimeSeries, &no_obs), &kslc_spec()).is_err());
        assert!(parse(&raw(Service::Metadata, &no_obs), &kslc_spec()).is_ok());
    }

    #[test]
    fn test_latest_payload() {
        let body = json!({
            "UNITS": {"air_temp": "Fahrenheit"},
            "STATION": [{
                "STID": "WBB",
                "TIMEZONE": "America/Denver",
                "OBSERVATIONS": {
                    "air_temp_value_1": {"date_time": "2021-01-01T01:00:00Z", "value": 50.0},
                    "air_temp_value_1d": {"date_time": "2021-01-01T01:00:00Z", "value": 49.0},
                    "wind_cardinal_direction_value_1d": {"date_time": "2021-01-01T00:55:00Z", "value": "NW"}
                }
            }]
        })
        .to_string();
        let set = parse(&raw(Service::Latest, &body), &QuerySpec::builder().stid("WBB").build()).unwrap();
        let table = &set.stations[0].table;
        assert_eq!(table.len(), 2);
        assert!(close(table.column("air_temp").unwrap()[1], 10.0));
        assert_eq!(
            table.text_column("wind_cardinal_direction").unwrap()[0].as_deref(),
            Some("NW")
        );
    }

    #[test]
    fn test_precipitation_totals_take_precip_unit() {
        let body = json!({
            "UNITS": {"precipitation": "Millimeters"},
            "STATION": [{
                "STID": "KSLC",
                "OBSERVATIONS": {
                    "total_precip_value_1": 25.4,
                    "ob_end_time_1": "2021-01-31T23:00:00Z"
                }
            }]
        })
        .to_string();
        let spec = QuerySpec::builder()
            .stid("KSLC")
            .units(UnitSystem::Imperial)
            .build();
        let set = parse(&raw(Service::Precipitation, &body), &spec).unwrap();
        let record = &set.stations[0];
        assert!(close(record.table.column("total_precip").unwrap()[0], 1.0));
        assert_eq!(record.unit_of("total_precip"), Some(&Unit::Inches));
    }

    #[test]
    fn test_resampled_grid_covers_window() {
        let spec = QuerySpec::builder()
            .stid("KSLC")
            .vars("air_temp")
            .resample(Resample::new(Duration::hours(6)))
            .build();
        let set = parse(&raw(Service::TimeSeries, KSLC), &spec).unwrap();
        let table = &set.stations[0].table;
        assert_eq!(table.len(), 5);
        assert_eq!(table.column("air_temp").unwrap()[0], -1.0);
        assert!(table.column("air_temp").unwrap()[1..].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_radius_point_orders_by_distance() {
        let body = json!({
            "STATION": [
                {"STID": "FAR", "LATITUDE": "41.5", "LONGITUDE": "-112.0"},
                {"STID": "NEAR", "LATITUDE": "40.77", "LONGITUDE": "-111.96"},
                {"STID": "NOWHERE"}
            ]
        })
        .to_string();
        let spec = QuerySpec::builder()
            .radius(Radius::around_point(LatLon(40.76, -111.89), 100.0))
            .build();
        let set = parse(&raw(Service::Metadata, &body), &spec).unwrap();
        let ids: Vec<&str> = set.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["NEAR", "FAR", "NOWHERE"]);
        assert!(set.stations[0].distance_miles.unwrap() < 5.0);
        assert!(set.stations[2].distance_miles.is_none());
    }

    #[test]
    fn test_wind_components_without_set_renames() {
        let spec = QuerySpec::builder()
            .stid("KSLC")
            .vars("air_temp")
            .rename_sets(false)
            .build();
        let set = parse(&raw(Service::TimeSeries, KSLC), &spec).unwrap();
        let table = &set.stations[0].table;
        assert!(table.column("wind_speed").is_none());
        assert_eq!(table.column("wind_u_set_1").unwrap()[0], 10.0);
        assert_eq!(table.column("wind_v_set_1").unwrap()[1], 0.0);
        assert_eq!(
            set.stations[0].unit_of("wind_u_set_1"),
            Some(&Unit::MetersPerSecond)
        );
    }

    #[test]
    fn test_colliding_renames_lose_no_column() {
        let body = json!({
            "STATION": [{
                "STID": "WBB",
                "OBSERVATIONS": {
                    "date_time": ["2021-01-01T00:00:00Z"],
                    "air_temp_set_1": [5.0],
                    "relative_humidity_set_1": [55.0]
                }
            }]
        })
        .to_string();
        let mut rename = BTreeMap::new();
        rename.insert("air_temp".to_string(), "x".to_string());
        rename.insert("relative_humidity".to_string(), "x".to_string());
        let spec = QuerySpec::builder()
            .stid("WBB")
            .vars("air_temp")
            .rename(rename)
            .build();
        let set = parse(&raw(Service::TimeSeries, &body), &spec).unwrap();
        let table = &set.stations[0].table;
        assert_eq!(table.column("x"), Some(&[5.0][..]));
        assert_eq!(table.column("relative_humidity"), Some(&[55.0][..]));
    }
}
