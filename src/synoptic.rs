//! The main entry point: a session that owns one API key's token and issues queries with it.

use crate::auth::{ApiKey, Token, TokenManager};
use crate::config::SynopticConfig;
use crate::error::SynopticError;
use crate::normalize::{self, catalog};
use crate::query::builder::EncodedRequest;
use crate::query::spec::QuerySpec;
use crate::transport::backend::{HttpBackend, ReqwestBackend};
use crate::transport::{RawResponse, Transport};
use crate::types::observation_set::ObservationSet;
use crate::types::service::Service;
use crate::types::station::{Network, NetworkType, QcType, VariableInfo};
use bon::bon;
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A client session for the Synoptic API.
///
/// The session owns its token: it is fetched on the first query, reused until it
/// expires, refreshed once when the service rejects it and revoked by
/// [`Synoptic::disable_token`]. Separate sessions never share token state.
///
/// Every query is one awaited call. Token acquisition and the one or two round
/// trips it needs run strictly in sequence; nothing happens in the background.
///
/// # Examples
///
/// ```no_run
/// # use synoptic::{QuerySpec, Synoptic, SynopticError, TimeValue};
/// # #[tokio::main]
/// # async fn main() -> Result<(), SynopticError> {
/// let client = Synoptic::new("my-api-key")?;
/// let spec = QuerySpec::builder()
///     .stid("KSLC")
///     .vars(["air_temp", "wind_speed", "wind_direction"])
///     .start("202101010000".parse::<TimeValue>().unwrap())
///     .end("202101020000".parse::<TimeValue>().unwrap())
///     .build();
/// let set = client.stations_timeseries().spec(&spec).call().await?;
/// for station in &set {
///     println!("{}: {} rows", station.id, station.table.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct Synoptic {
    tokens: TokenManager,
    transport: Transport,
}

#[bon]
impl Synoptic {
    /// Creates a session with default settings for `api_key`.
    ///
    /// # Errors
    ///
    /// [`SynopticError::Transport`] if the HTTP client cannot be initialised.
    pub fn new(api_key: impl Into<ApiKey>) -> Result<Self, SynopticError> {
        Self::with_config(SynopticConfig::builder().api_key(api_key).build())
    }

    /// Creates a session configured from `SYNOPTIC_API_KEY` and `SYNOPTIC_API_URL`.
    pub fn from_env() -> Result<Self, SynopticError> {
        Self::with_config(SynopticConfig::from_env()?)
    }

    /// Creates a session with explicit settings, using `reqwest` for HTTP.
    pub fn with_config(config: SynopticConfig) -> Result<Self, SynopticError> {
        let backend = ReqwestBackend::new(config.request_timeout()).map_err(|e| {
            SynopticError::Transport {
                url: config.base_url().to_string(),
                source: Box::new(e),
            }
        })?;
        Ok(Self::with_backend(config, Arc::new(backend)))
    }

    /// Creates a session that sends its requests through `backend`.
    pub fn with_backend(config: SynopticConfig, backend: Arc<dyn HttpBackend>) -> Self {
        let tokens = TokenManager::new(
            config.api_key().clone(),
            config.base_url(),
            config.token_lifetime(),
            Arc::clone(&backend),
        );
        let transport = Transport::new(config.base_url(), backend, config.hide_token());
        Self { tokens, transport }
    }

    /// The token manager of this session.
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Returns a valid token, fetching one only if none is cached or it expired.
    pub async fn get_token(&self) -> Result<Arc<Token>, SynopticError> {
        self.tokens.acquire().await
    }

    /// Drops the session's token and asks the service to revoke it.
    pub async fn disable_token(&self) {
        self.tokens.disable().await
    }

    /// Sends an already encoded request and returns the unparsed reply.
    pub async fn fetch(&self, request: &EncodedRequest) -> Result<RawResponse, SynopticError> {
        self.transport.send(request, &self.tokens).await
    }

    async fn observations(
        &self,
        service: Service,
        spec: &QuerySpec,
        now: Option<DateTime<Utc>>,
    ) -> Result<ObservationSet, SynopticError> {
        let request = EncodedRequest::build_at(service, spec, now.unwrap_or_else(Utc::now))?;
        let raw = self.fetch(&request).await?;
        let set = normalize::parse(&raw, spec)?;
        debug!(
            "{} returned {} stations with {} warnings",
            service,
            set.len(),
            set.warnings.len()
        );
        Ok(set)
    }

    async fn catalogue(&self, service: Service, spec: &QuerySpec) -> Result<RawResponse, SynopticError> {
        let request = EncodedRequest::build(service, spec)?;
        self.fetch(&request).await
    }

    /// Observations of the selected stations over a time range.
    ///
    /// The spec needs exactly one station selector, at least one variable and
    /// either `start`/`end` or `recent`. Relative times resolve against `now`
    /// (default: the current clock).
    ///
    /// # Errors
    ///
    /// [`SynopticError::InvalidQuery`] before any request is sent when the spec is
    /// invalid; otherwise the auth, service, transport or parse error of the call.
    #[builder]
    pub async fn stations_timeseries(
        &self,
        spec: &QuerySpec,
        now: Option<DateTime<Utc>>,
    ) -> Result<ObservationSet, SynopticError> {
        self.observations(Service::TimeSeries, spec, now).await
    }

    /// The most recent observation of each variable within `within` minutes.
    #[builder]
    pub async fn stations_latest(
        &self,
        spec: &QuerySpec,
        now: Option<DateTime<Utc>>,
    ) -> Result<ObservationSet, SynopticError> {
        self.observations(Service::Latest, spec, now).await
    }

    /// The observation of each variable closest to `attime`, looking back at most `within` minutes.
    #[builder]
    pub async fn stations_nearesttime(
        &self,
        spec: &QuerySpec,
        now: Option<DateTime<Utc>>,
    ) -> Result<ObservationSet, SynopticError> {
        self.observations(Service::NearestTime, spec, now).await
    }

    /// Precipitation totals over the time range, optionally split into intervals.
    #[builder]
    pub async fn stations_precipitation(
        &self,
        spec: &QuerySpec,
        now: Option<DateTime<Utc>>,
    ) -> Result<ObservationSet, SynopticError> {
        self.observations(Service::Precipitation, spec, now).await
    }

    /// Station metadata only; the station tables are empty.
    #[builder]
    pub async fn stations_metadata(
        &self,
        spec: &QuerySpec,
        now: Option<DateTime<Utc>>,
    ) -> Result<ObservationSet, SynopticError> {
        self.observations(Service::Metadata, spec, now).await
    }

    /// Observation networks, all of them or only those with the given ids.
    #[builder]
    pub async fn networks(&self, ids: Option<Vec<u32>>) -> Result<Vec<Network>, SynopticError> {
        let spec = QuerySpec::builder().maybe_network(ids).build();
        let raw = self.catalogue(Service::Networks, &spec).await?;
        catalog::networks(&raw)
    }

    /// Network categories.
    pub async fn network_types(&self) -> Result<Vec<NetworkType>, SynopticError> {
        let raw = self
            .catalogue(Service::NetworkTypes, &QuerySpec::builder().build())
            .await?;
        catalog::network_types(&raw)
    }

    /// Quality-control check types.
    pub async fn qc_types(&self) -> Result<Vec<QcType>, SynopticError> {
        let raw = self
            .catalogue(Service::QcTypes, &QuerySpec::builder().build())
            .await?;
        catalog::qc_types(&raw)
    }

    /// All sensor variables the service knows, by name.
    pub async fn variables(&self) -> Result<BTreeMap<String, VariableInfo>, SynopticError> {
        let raw = self
            .catalogue(Service::Variables, &QuerySpec::builder().build())
            .await?;
        catalog::variables(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::units::Unit;
    use crate::query::time::TimeValue;
    use crate::transport::backend::scripted::ScriptedBackend;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    const BASE: &str = "https://api.example.invalid/v2";

    fn session(backend: ScriptedBackend) -> (Arc<ScriptedBackend>, Synoptic) {
        let backend = Arc::new(backend);
        let config = SynopticConfig::builder()
            .api_key("VALID123")
            .base_url(BASE)
            .build();
        let client = Synoptic::with_backend(config, backend.clone());
        (backend, client)
    }

    fn kslc_hourly() -> serde_json::Value {
        json!({
            "SUMMARY": {"RESPONSE_CODE": 1, "RESPONSE_MESSAGE": "OK", "NUMBER_OF_OBJECTS": 1},
            "UNITS": {"air_temp": "Fahrenheit", "elevation": "ft"},
            "STATION": [{
                "STID": "KSLC",
                "NAME": "Salt Lake City, Salt Lake City International Airport",
                "ELEVATION": "4226",
                "LATITUDE": "40.77069",
                "LONGITUDE": "-111.96503",
                "TIMEZONE": "America/Denver",
                "OBSERVATIONS": {
                    "date_time": [
                        "2021-01-01T01:00:00Z",
                        "2021-01-01T02:00:00Z",
                        "2021-01-01T03:00:00Z"
                    ],
                    "air_temp_set_1": [32.0, 212.0, null]
                }
            }]
        })
    }

    #[tokio::test]
    async fn test_get_token_is_cached() {
        let (backend, client) = session(ScriptedBackend::new().json(json!({"TOKEN": "tok-1"})));
        let before = Utc::now();
        let first = client.get_token().await.unwrap();
        assert!(first.expires_at() > before);
        let second = client.tokens().acquire().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.request_count(), 1);
    }

    #[tokio::test]
    async fn test_kslc_timeseries_in_celsius() {
        let (backend, client) = session(
            ScriptedBackend::new()
                .json(json!({"TOKEN": "tok-1"}))
                .json(kslc_hourly()),
        );
        let start = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap();
        let spec = QuerySpec::builder()
            .stid("KSLC")
            .vars("air_temp")
            .start(TimeValue::Absolute(start))
            .end(TimeValue::Absolute(end))
            .build();
        let set = client.stations_timeseries().spec(&spec).call().await.unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(set.metadata.window, Some((start, end)));
        let record = &set.stations[0];
        assert_eq!(record.id, "KSLC");
        assert!(record.table.index().iter().all(|t| *t > start && *t < end));
        assert!(record.table.index().windows(2).all(|w| w[0] < w[1]));
        let temps = record.table.column("air_temp").unwrap();
        assert!((temps[0] - 0.0).abs() < 1e-9);
        assert!((temps[1] - 100.0).abs() < 1e-9);
        assert!(temps[2].is_nan());
        assert_eq!(record.unit_of("air_temp"), Some(&Unit::Celsius));

        let url = &backend.requests()[1];
        assert!(url.starts_with(&format!("{}/stations/timeseries?", BASE)));
        assert!(url.contains("start=202101010000&"));
        assert!(url.contains("units=metric"));
    }

    #[tokio::test]
    async fn test_invalid_spec_sends_nothing() {
        let (backend, client) = session(ScriptedBackend::new());
        let spec = QuerySpec::builder().vars("air_temp").build();
        let result = client.stations_latest().spec(&spec).call().await;
        assert!(matches!(result, Err(SynopticError::InvalidQuery { .. })));
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_relative_times_use_supplied_clock() {
        let (backend, client) = session(
            ScriptedBackend::new()
                .json(json!({"TOKEN": "tok-1"}))
                .json(json!({"SUMMARY": {"RESPONSE_CODE": 1}, "STATION": []})),
        );
        let now = Utc.with_ymd_and_hms(2021, 1, 1, 12, 0, 0).unwrap();
        let spec = QuerySpec::builder()
            .stid("KSLC")
            .vars("air_temp")
            .attime("3 hours ago".parse::<TimeValue>().unwrap())
            .build();
        let set = client
            .stations_nearesttime()
            .spec(&spec)
            .now(now)
            .call()
            .await
            .unwrap();
        assert!(set.is_empty());
        assert!(backend.requests()[1].contains("attime=202101010900"));
    }

    #[tokio::test]
    async fn test_catalogue_operations() {
        let (backend, client) = session(
            ScriptedBackend::new()
                .json(json!({"TOKEN": "tok-1"}))
                .json(json!({
                    "SUMMARY": {"RESPONSE_CODE": 1},
                    "MNET": [{"ID": "1", "SHORTNAME": "ASOS/AWOS", "LONGNAME": "ASOS/AWOS"}]
                }))
                .json(json!({
                    "SUMMARY": {"RESPONSE_CODE": 1},
                    "VARIABLES": [
                        {"air_temp": {"long_name": "Temperature", "unit": "Celsius"}},
                        {"wind_speed": {"long_name": "Wind Speed", "unit": "m/s"}}
                    ]
                })),
        );
        let networks = client.networks().ids(vec![1]).call().await.unwrap();
        assert_eq!(networks.len(), 1);
        assert_eq!(networks[0].short_name.as_deref(), Some("ASOS/AWOS"));
        assert!(backend.requests()[1].starts_with(&format!("{}/networks?id=1&", BASE)));

        let variables = client.variables().await.unwrap();
        assert_eq!(variables["air_temp"].long_name, "Temperature");
        assert_eq!(variables.len(), 2);
    }

    #[tokio::test]
    async fn test_disable_then_query_fetches_new_token() {
        let (backend, client) = session(
            ScriptedBackend::new()
                .json(json!({"TOKEN": "tok-1"}))
                .json(json!({"SUMMARY": {"RESPONSE_CODE": 1}}))
                .json(json!({"TOKEN": "tok-2"})),
        );
        client.get_token().await.unwrap();
        client.disable_token().await;
        assert!(client.tokens().cached().await.is_none());
        let token = client.get_token().await.unwrap();
        assert_eq!(token.value(), "tok-2");
        assert_eq!(backend.request_count(), 3);
    }

    #[tokio::test]
    async fn test_recent_window_reaches_result_metadata() {
        let (_, client) = session(
            ScriptedBackend::new()
                .json(json!({"TOKEN": "tok-1"}))
                .json(json!({"SUMMARY": {"RESPONSE_CODE": 1}, "STATION": []})),
        );
        let now = Utc.with_ymd_and_hms(2021, 1, 1, 12, 0, 0).unwrap();
        let spec = QuerySpec::builder()
            .stid("KSLC")
            .recent(Duration::hours(6))
            .build();
        let set = client
            .stations_precipitation()
            .spec(&spec)
            .now(now)
            .call()
            .await
            .unwrap();
        assert_eq!(set.metadata.window, Some((now - Duration::hours(6), now)));
    }
}
