//! Wire shapes of the service's JSON responses.
//!
//! The service is loose about scalar types (coordinates arrive as strings, ids as
//! numbers or strings), so the station fields go through lenient deserializers.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Envelope {
    #[serde(rename = "SUMMARY", default)]
    pub summary: Option<Summary>,
    #[serde(rename = "UNITS", default)]
    pub units: BTreeMap<String, Value>,
    #[serde(rename = "STATION", default)]
    pub stations: Vec<RawStation>,
    #[serde(rename = "MNET", default)]
    pub networks: Vec<RawNetwork>,
    #[serde(rename = "MNETCAT", default)]
    pub network_types: Vec<RawNetworkType>,
    #[serde(rename = "VARIABLES", default)]
    pub variables: Vec<BTreeMap<String, RawVariable>>,
    #[serde(rename = "QCTYPES", default)]
    pub qc_types: Vec<RawQcType>,
    #[serde(rename = "TOKEN", default)]
    pub token: Option<String>,
}

impl Envelope {
    /// Unit label of a variable, if the response names one.
    pub fn unit_of(&self, variable: &str) -> Option<&str> {
        self.units.get(variable).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Summary {
    #[serde(rename = "RESPONSE_CODE", default, deserialize_with = "de_opt_i64")]
    pub response_code: Option<i64>,
    #[serde(rename = "RESPONSE_MESSAGE", default)]
    pub response_message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawStation {
    #[serde(rename = "STID", default, deserialize_with = "de_opt_string")]
    pub stid: Option<String>,
    #[serde(rename = "NAME", default)]
    pub name: Option<String>,
    #[serde(rename = "LATITUDE", default, deserialize_with = "de_opt_f64")]
    pub latitude: Option<f64>,
    #[serde(rename = "LONGITUDE", default, deserialize_with = "de_opt_f64")]
    pub longitude: Option<f64>,
    #[serde(rename = "ELEVATION", default, deserialize_with = "de_opt_f64")]
    pub elevation: Option<f64>,
    #[serde(rename = "MNET_ID", default, deserialize_with = "de_opt_string")]
    pub network_id: Option<String>,
    #[serde(rename = "STATE", default)]
    pub state: Option<String>,
    #[serde(rename = "STATUS", default)]
    pub status: Option<String>,
    #[serde(rename = "TIMEZONE", default)]
    pub timezone: Option<String>,
    #[serde(rename = "PERIOD_OF_RECORD", default)]
    pub period_of_record: Option<RawPeriod>,
    #[serde(rename = "SENSOR_VARIABLES", default)]
    pub sensor_variables: Option<Map<String, Value>>,
    #[serde(rename = "DISTANCE", default, deserialize_with = "de_opt_f64")]
    pub distance: Option<f64>,
    #[serde(rename = "OBSERVATIONS", default)]
    pub observations: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawPeriod {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawNetwork {
    #[serde(rename = "ID", deserialize_with = "de_string")]
    pub id: String,
    #[serde(rename = "SHORTNAME", default)]
    pub shortname: Option<String>,
    #[serde(rename = "LONGNAME", default)]
    pub longname: Option<String>,
    #[serde(rename = "URL", default)]
    pub url: Option<String>,
    #[serde(rename = "CATEGORY", default, deserialize_with = "de_opt_string")]
    pub category: Option<String>,
    #[serde(rename = "REPORTING_STATIONS", default, deserialize_with = "de_opt_i64")]
    pub reporting_stations: Option<i64>,
    #[serde(rename = "LAST_OBSERVATION", default)]
    pub last_observation: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawNetworkType {
    #[serde(rename = "ID", deserialize_with = "de_string")]
    pub id: String,
    #[serde(rename = "NAME", default)]
    pub name: Option<String>,
    #[serde(rename = "DESCRIPTION", default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawVariable {
    #[serde(default)]
    pub long_name: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawQcType {
    #[serde(rename = "ID", deserialize_with = "de_string")]
    pub id: String,
    #[serde(rename = "NAME", default)]
    pub name: Option<String>,
    #[serde(rename = "SHORTNAME", default)]
    pub shortname: Option<String>,
    #[serde(rename = "SOURCE", default)]
    pub source: Option<String>,
}

/// Reads a JSON scalar as a number: numbers as-is, numeric strings parsed,
/// anything else `None`.
pub(crate) fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn de_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_f64))
}

fn de_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn de_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn de_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    de_opt_string(deserializer)?.ok_or_else(|| serde::de::Error::custom("expected a string or number"))
}
