//! Extraction of raw, still service-named columns from an `OBSERVATIONS` object.

use crate::error::ParseError;
use crate::normalize::payload::value_as_f64;
use crate::normalize::timezone::parse_timestamp;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Strings the service uses for a missing reading.
const MISSING_MARKERS: &[&str] = &["", "na", "n/a", "nan", "null", "none"];

fn is_missing_marker(value: &str) -> bool {
    MISSING_MARKERS.contains(&value.trim().to_ascii_lowercase().as_str())
}

/// Columns in the shape the service reported them, aligned to a UTC index.
#[derive(Debug, Default)]
pub(crate) struct RawColumns {
    pub index: Vec<DateTime<Utc>>,
    pub numeric: BTreeMap<String, Vec<f64>>,
    pub text: BTreeMap<String, Vec<Option<String>>>,
}

impl RawColumns {
    /// Column names of both kinds.
    pub fn names(&self) -> Vec<String> {
        self.numeric.keys().chain(self.text.keys()).cloned().collect()
    }

    pub fn count_valid(&self, column: &str) -> usize {
        if let Some(values) = self.numeric.get(column) {
            return values.iter().filter(|v| !v.is_nan()).count();
        }
        self.text
            .get(column)
            .map(|values| values.iter().filter(|v| v.is_some()).count())
            .unwrap_or(0)
    }

    fn push(&mut self, name: String, values: &[Value]) {
        let textual = values.iter().any(|v| match v {
            Value::String(s) => !is_missing_marker(s) && value_as_f64(v).is_none(),
            Value::Bool(_) => true,
            _ => false,
        });
        if textual {
            let texts = values
                .iter()
                .map(|v| match v {
                    Value::String(s) if !is_missing_marker(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect();
            self.text.insert(name, texts);
        } else {
            let numbers = values
                .iter()
                .map(|v| value_as_f64(v).unwrap_or(f64::NAN))
                .collect();
            self.numeric.insert(name, numbers);
        }
    }

    /// Sorts rows by time and merges rows sharing a timestamp.
    ///
    /// Within a merged row each column keeps its first non-missing reading.
    /// Returns the number of rows merged away.
    pub fn sort_and_merge(&mut self) -> usize {
        let mut order: Vec<usize> = (0..self.index.len()).collect();
        order.sort_by_key(|&i| self.index[i]);

        let mut index: Vec<DateTime<Utc>> = Vec::with_capacity(order.len());
        let mut groups: Vec<Vec<usize>> = Vec::with_capacity(order.len());
        for i in order {
            let at = self.index[i];
            if index.last() == Some(&at) {
                if let Some(group) = groups.last_mut() {
                    group.push(i);
                }
            } else {
                index.push(at);
                groups.push(vec![i]);
            }
        }

        let merged = self.index.len() - index.len();
        let already_ordered = merged == 0 && groups.iter().enumerate().all(|(pos, g)| g[0] == pos);
        if already_ordered {
            return 0;
        }

        for values in self.numeric.values_mut() {
            *values = groups
                .iter()
                .map(|group| {
                    group
                        .iter()
                        .map(|&i| values[i])
                        .find(|v| !v.is_nan())
                        .unwrap_or(f64::NAN)
                })
                .collect();
        }
        for values in self.text.values_mut() {
            *values = groups
                .iter()
                .map(|group| group.iter().find_map(|&i| values[i].clone()))
                .collect();
        }
        self.index = index;
        merged
    }
}

fn timestamp(station: &str, value: &Value) -> Result<DateTime<Utc>, ParseError> {
    value
        .as_str()
        .and_then(parse_timestamp)
        .ok_or_else(|| ParseError::MalformedTimestamp {
            station: station.to_string(),
            value: value
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string()),
        })
}

/// Time series: a `date_time` array plus one equally long array per sensor column.
pub(crate) fn timeseries(station: &str, observations: &Map<String, Value>) -> Result<RawColumns, ParseError> {
    let times = observations
        .get("date_time")
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::missing("OBSERVATIONS.date_time", Some(station)))?;
    let index = times
        .iter()
        .map(|t| timestamp(station, t))
        .collect::<Result<Vec<_>, _>>()?;

    let mut columns = RawColumns {
        index,
        ..RawColumns::default()
    };
    for (name, value) in observations {
        if name == "date_time" {
            continue;
        }
        let Some(values) = value.as_array() else {
            continue;
        };
        if values.len() != columns.index.len() {
            return Err(ParseError::LengthMismatch {
                station: station.to_string(),
                column: name.clone(),
                expected: columns.index.len(),
                found: values.len(),
            });
        }
        columns.push(name.clone(), values);
    }
    Ok(columns)
}

/// Readings that each carry their own timestamp, gathered into one table with a
/// row per distinct instant.
fn sparse(entries: Vec<(String, DateTime<Utc>, Value)>) -> RawColumns {
    let mut index: Vec<DateTime<Utc>> = entries.iter().map(|(_, at, _)| *at).collect();
    index.sort();
    index.dedup();

    let mut per_column: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for (name, at, value) in entries {
        let column = per_column
            .entry(name)
            .or_insert_with(|| vec![Value::Null; index.len()]);
        if let Ok(position) = index.binary_search(&at) {
            column[position] = value;
        }
    }

    let mut columns = RawColumns {
        index,
        ..RawColumns::default()
    };
    for (name, values) in per_column {
        columns.push(name, &values);
    }
    columns
}

/// Latest and nearest-time: `{column: {"date_time": .., "value": ..}}` objects.
pub(crate) fn latest(station: &str, observations: &Map<String, Value>) -> Result<RawColumns, ParseError> {
    let mut entries = Vec::new();
    for (name, value) in observations {
        let Some(reading) = value.as_object() else {
            continue;
        };
        let at = reading
            .get("date_time")
            .ok_or_else(|| ParseError::missing(format!("OBSERVATIONS.{}.date_time", name), Some(station)))?;
        let at = timestamp(station, at)?;
        let value = reading.get("value").cloned().unwrap_or(Value::Null);
        entries.push((name.clone(), at, value));
    }
    Ok(sparse(entries))
}

pub(crate) const PRECIPITATION: &str = "precipitation";
pub(crate) const REPORT_COUNT: &str = "report_count";
const TOTAL_PREFIX: &str = "total_precip_value_";

/// Precipitation in either of its two shapes: a `precipitation` array of
/// intervals, or `total_precip_value_N` totals ending at `ob_end_time_N`.
pub(crate) fn precipitation(station: &str, observations: &Map<String, Value>) -> Result<RawColumns, ParseError> {
    let mut entries = Vec::new();
    if let Some(intervals) = observations.get(PRECIPITATION).and_then(Value::as_array) {
        for interval in intervals {
            let end = interval
                .get("last_report")
                .ok_or_else(|| ParseError::missing("precipitation.last_report", Some(station)))?;
            let at = timestamp(station, end)?;
            let total = interval.get("total").cloned().unwrap_or(Value::Null);
            let count = interval.get("count").cloned().unwrap_or(Value::Null);
            entries.push((PRECIPITATION.to_string(), at, total));
            entries.push((REPORT_COUNT.to_string(), at, count));
        }
        return Ok(sparse(entries));
    }

    for (name, value) in observations {
        let Some(sensor) = name.strip_prefix(TOTAL_PREFIX) else {
            continue;
        };
        let end_key = format!("ob_end_time_{}", sensor);
        let end = observations
            .get(&end_key)
            .ok_or_else(|| ParseError::missing(format!("OBSERVATIONS.{}", end_key), Some(station)))?;
        entries.push((name.clone(), timestamp(station, end)?, value.clone()));
    }
    Ok(sparse(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_timeseries_splits_text_and_numbers() {
        let obs = object(json!({
            "date_time": ["2021-01-01T00:00:00Z", "2021-01-01T01:00:00Z"],
            "air_temp_set_1": [1.5, null],
            "pressure_set_1d": ["86000", "NA"],
            "metar_set_1": ["KSLC 010000Z", null],
            "nested": {"ignored": true}
        }));
        let columns = timeseries("KSLC", &obs).unwrap();
        assert_eq!(columns.index.len(), 2);
        assert_eq!(columns.numeric["air_temp_set_1"][0], 1.5);
        assert!(columns.numeric["air_temp_set_1"][1].is_nan());
        assert_eq!(columns.numeric["pressure_set_1d"][0], 86000.0);
        assert_eq!(columns.text["metar_set_1"], vec![Some("KSLC 010000Z".to_string()), None]);
        assert!(!columns.numeric.contains_key("nested"));
        assert_eq!(columns.count_valid("metar_set_1"), 1);
    }

    #[test]
    fn test_timeseries_rejects_bad_payloads() {
        let short = object(json!({"date_time": ["2021-01-01T00:00:00Z"], "x_set_1": [1, 2]}));
        assert!(matches!(
            timeseries("A", &short),
            Err(ParseError::LengthMismatch { expected: 1, found: 2, .. })
        ));
        let bad_time = object(json!({"date_time": ["not a time"]}));
        assert!(matches!(
            timeseries("A", &bad_time),
            Err(ParseError::MalformedTimestamp { value, .. }) if value == "not a time"
        ));
        let no_index = object(json!({"x_set_1": [1]}));
        assert!(matches!(
            timeseries("A", &no_index),
            Err(ParseError::MissingField { .. })
        ));
    }

    #[test]
    fn test_latest_builds_row_per_instant() {
        let obs = object(json!({
            "air_temp_value_1": {"date_time": "2021-01-01T01:00:00Z", "value": 5.0},
            "wind_speed_value_1": {"date_time": "2021-01-01T00:55:00Z", "value": 2.1},
            "rh_value_1": {"date_time": "2021-01-01T01:00:00Z", "value": null}
        }));
        let columns = latest("WBB", &obs).unwrap();
        assert_eq!(
            columns.index,
            vec![
                Utc.with_ymd_and_hms(2021, 1, 1, 0, 55, 0).unwrap(),
                Utc.with_ymd_and_hms(2021, 1, 1, 1, 0, 0).unwrap()
            ]
        );
        assert!(columns.numeric["air_temp_value_1"][0].is_nan());
        assert_eq!(columns.numeric["air_temp_value_1"][1], 5.0);
        assert_eq!(columns.numeric["wind_speed_value_1"][0], 2.1);
        assert!(columns.numeric["rh_value_1"].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_precipitation_shapes() {
        let intervals = object(json!({"precipitation": [
            {"first_report": "2021-01-01T00:00:00Z", "last_report": "2021-01-01T23:00:00Z", "total": 2.5, "count": 24},
            {"first_report": "2021-01-02T00:00:00Z", "last_report": "2021-01-02T23:00:00Z", "total": 0.0, "count": 23}
        ]}));
        let columns = precipitation("KSLC", &intervals).unwrap();
        assert_eq!(columns.numeric[PRECIPITATION], vec![2.5, 0.0]);
        assert_eq!(columns.numeric[REPORT_COUNT], vec![24.0, 23.0]);

        let totals = object(json!({
            "total_precip_value_1": 7.4,
            "ob_start_time_1": "2021-01-01T00:00:00Z",
            "ob_end_time_1": "2021-01-31T23:00:00Z",
            "count_1": 700
        }));
        let columns = precipitation("KSLC", &totals).unwrap();
        assert_eq!(columns.index.len(), 1);
        assert_eq!(columns.numeric["total_precip_value_1"], vec![7.4]);
    }

    #[test]
    fn test_sort_and_merge() {
        let t = |h| Utc.with_ymd_and_hms(2021, 1, 1, h, 0, 0).unwrap();
        let mut columns = RawColumns {
            index: vec![t(2), t(1), t(2)],
            ..RawColumns::default()
        };
        columns.numeric.insert("a".into(), vec![f64::NAN, 1.0, 3.0]);
        columns.text.insert("b".into(), vec![Some("x".into()), None, Some("y".into())]);
        assert_eq!(columns.sort_and_merge(), 1);
        assert_eq!(columns.index, vec![t(1), t(2)]);
        assert_eq!(columns.numeric["a"], vec![1.0, 3.0]);
        assert_eq!(columns.text["b"], vec![None, Some("x".to_string())]);

        let mut sorted = RawColumns {
            index: vec![t(1), t(2)],
            ..RawColumns::default()
        };
        assert_eq!(sorted.sort_and_merge(), 0);
    }
}
