//! Validation of a [`QuerySpec`] against a service and its encoding into wire parameters.

use crate::error::SynopticError;
use crate::normalize::variables::SensorKey;
use crate::query::spec::{PrecipInterval, QuerySpec, RadiusCenter};
use crate::query::time::{format_wire, TimeValue};
use crate::types::service::Service;
use chrono::{DateTime, Duration, Utc};
use reqwest::Url;
use std::collections::BTreeMap;

/// A validated request: the target service and its encoded parameters.
///
/// Parameters are kept sorted, so equal specs always encode to the same query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRequest {
    service: Service,
    params: BTreeMap<&'static str, String>,
    window: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl EncodedRequest {
    /// Validates `spec` for `service` and encodes it, resolving relative times
    /// against the current clock.
    ///
    /// # Errors
    ///
    /// [`SynopticError::InvalidQuery`] when the spec does not have exactly one
    /// station selector (station services), has a selector it cannot use
    /// (catalogue services), lacks variables (observation services), or has
    /// a time range or option the service does not accept.
    ///
    /// # Examples
    ///
    /// ```
    /// use synoptic::{EncodedRequest, QuerySpec, Service};
    ///
    /// let spec = QuerySpec::builder().stid(["KSLC", "WBB"]).vars("air_temp").build();
    /// let request = EncodedRequest::build(Service::Latest, &spec).unwrap();
    /// assert_eq!(request.param("stid"), Some("KSLC,WBB"));
    /// assert_eq!(request.param("within"), Some("60"));
    ///
    /// let no_selector = QuerySpec::builder().vars("air_temp").build();
    /// assert!(EncodedRequest::build(Service::Latest, &no_selector).is_err());
    /// ```
    pub fn build(service: Service, spec: &QuerySpec) -> Result<Self, SynopticError> {
        Self::build_at(service, spec, Utc::now())
    }

    /// Like [`EncodedRequest::build`] with an explicit "now" for relative times.
    pub fn build_at(
        service: Service,
        spec: &QuerySpec,
        now: DateTime<Utc>,
    ) -> Result<Self, SynopticError> {
        let mut encoder = Encoder {
            service,
            spec,
            params: BTreeMap::new(),
        };
        let window = encoder.encode(now)?;
        Ok(Self {
            service,
            params: encoder.params,
            window,
        })
    }

    pub fn service(&self) -> Service {
        self.service
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// The absolute time range the request covers, if it has one.
    pub fn window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.window
    }

    /// The full request URL under `base_url`, with `extra` parameters appended in order.
    ///
    /// # Errors
    ///
    /// [`SynopticError::InvalidBaseUrl`] when `base_url` is not an absolute URL.
    pub fn url(&self, base_url: &str, extra: &[(&str, &str)]) -> Result<Url, SynopticError> {
        let mut pairs: Vec<(&str, &str)> = self.params().collect();
        pairs.extend_from_slice(extra);
        endpoint_url(base_url, self.service, &pairs)
    }
}

/// Builds `{base_url}/{service path}` with `params` as its form-encoded query.
pub(crate) fn endpoint_url(
    base_url: &str,
    service: Service,
    params: &[(&str, &str)],
) -> Result<Url, SynopticError> {
    let mut url = Url::parse(&format!("{}/{}", base_url, service.path_segment())).map_err(|e| {
        SynopticError::InvalidBaseUrl {
            url: base_url.to_string(),
            source: Box::new(e),
        }
    })?;
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params.iter().copied());
    }
    Ok(url)
}

fn join<I, T>(items: I) -> String
where
    I: IntoIterator<Item = T>,
    T: ToString,
{
    items
        .into_iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Minutes of a positive duration, rounded up.
fn whole_minutes(duration: Duration) -> i64 {
    let seconds = duration.num_seconds();
    (seconds + 59) / 60
}

struct Encoder<'a> {
    service: Service,
    spec: &'a QuerySpec,
    params: BTreeMap<&'static str, String>,
}

impl Encoder<'_> {
    fn invalid(&self, message: impl Into<String>) -> SynopticError {
        SynopticError::invalid_query(self.service, message)
    }

    fn set(&mut self, name: &'static str, value: impl Into<String>) {
        self.params.insert(name, value.into());
    }

    fn encode(&mut self, now: DateTime<Utc>) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, SynopticError> {
        if self.service == Service::Auth {
            return Err(self.invalid("auth requests are issued by the token manager"));
        }
        if let Some(resample) = self.spec.resample {
            if !resample.is_valid() {
                return Err(self.invalid("resample interval must be positive"));
            }
        }

        if self.service.is_station_service() {
            self.selector()?;
            self.filters()?;
        } else if self.spec.selector_count() > 0 {
            return Err(self.invalid(format!(
                "{} does not accept a station selector",
                self.service
            )));
        }

        match self.service {
            Service::TimeSeries | Service::Precipitation => {
                self.reject_attime()?;
                if self.service == Service::Precipitation {
                    self.precip_mode()?;
                }
                self.observation_options();
                self.range(now).map(Some)
            }
            Service::Latest => {
                self.reject_range()?;
                self.reject_attime()?;
                self.observation_options();
                self.within()?;
                Ok(None)
            }
            Service::NearestTime => {
                self.reject_range()?;
                let attime = self
                    .spec
                    .attime
                    .ok_or_else(|| self.invalid("attime is required"))?;
                let attime = self.resolve(attime, now)?;
                self.set("attime", format_wire(attime));
                self.observation_options();
                self.within()?;
                Ok(None)
            }
            Service::Metadata => {
                self.reject_attime()?;
                if self.spec.recent.is_some() {
                    return Err(self.invalid("recent is not supported, use start/end"));
                }
                if self.spec.sensorvars {
                    self.set("sensorvars", "1");
                }
                self.optional_obrange(now)
            }
            Service::Networks => {
                if let Some(ids) = &self.spec.network {
                    self.set("id", join(ids));
                }
                Ok(None)
            }
            Service::NetworkTypes | Service::Variables | Service::QcTypes | Service::Auth => {
                Ok(None)
            }
        }
    }

    fn selector(&mut self) -> Result<(), SynopticError> {
        let count = self.spec.selector_count();
        if count != 1 {
            return Err(self.invalid(format!(
                "exactly one station selector (stid, bbox or radius) is required, found {}",
                count
            )));
        }
        if let Some(ids) = &self.spec.stid {
            if ids.is_empty() || ids.iter().any(|id| id.trim().is_empty()) {
                return Err(self.invalid("stid must list non-empty station ids"));
            }
            let ids = join(ids.iter().map(str::trim));
            self.set("stid", ids);
        }
        if let Some(bbox) = &self.spec.bbox {
            let (sw, ne) = (bbox.south_west, bbox.north_east);
            if !sw.is_valid() || !ne.is_valid() || sw.0 > ne.0 || sw.1 > ne.1 {
                return Err(self.invalid(
                    "bbox needs valid south-west and north-east corners in that order",
                ));
            }
            self.set("bbox", join([sw.1, sw.0, ne.1, ne.0]));
        }
        if let Some(radius) = &self.spec.radius {
            if !(radius.miles.is_finite() && radius.miles > 0.0) {
                return Err(self.invalid("radius must be a positive number of miles"));
            }
            let value = match &radius.center {
                RadiusCenter::Point(point) if point.is_valid() => {
                    join([point.0, point.1, radius.miles])
                }
                RadiusCenter::Point(_) => {
                    return Err(self.invalid("radius centre is not a valid coordinate"))
                }
                RadiusCenter::Station(stid) if !stid.trim().is_empty() => {
                    format!("{},{}", stid.trim(), radius.miles)
                }
                RadiusCenter::Station(_) => {
                    return Err(self.invalid("radius centre station id is empty"))
                }
            };
            self.set("radius", value);
        }
        Ok(())
    }

    /// Variable, network and status filters shared by the station services.
    fn filters(&mut self) -> Result<(), SynopticError> {
        let requires_vars = matches!(
            self.service,
            Service::TimeSeries | Service::Latest | Service::NearestTime
        );
        if self.spec.vars.iter().any(|v| v.trim().is_empty()) {
            return Err(self.invalid("variable names must not be empty"));
        }
        if requires_vars && self.spec.vars.is_empty() {
            return Err(self.invalid("at least one variable is required"));
        }
        if !self.spec.vars.is_empty() {
            // The service filters by logical variable; variant suffixes only steer resolution.
            let mut seen = Vec::new();
            for var in self.spec.vars.iter() {
                let variable = SensorKey::parse(var.trim()).variable;
                if !seen.contains(&variable) {
                    seen.push(variable);
                }
            }
            self.set("vars", join(seen));
            self.set("varsoperator", self.spec.varsoperator.wire_value());
        }
        if let Some(networks) = &self.spec.network {
            if networks.is_empty() {
                return Err(self.invalid("network filter must list at least one id"));
            }
            self.set("network", join(networks));
        }
        if let Some(status) = self.spec.status {
            self.set("status", status.wire_value());
        }
        Ok(())
    }

    /// Units and clock of observation services. Timestamps are always requested in
    /// UTC; local time is applied per station during normalization.
    fn observation_options(&mut self) {
        self.set("units", self.spec.units.wire_value());
        self.set("obtimezone", "utc");
    }

    fn within(&mut self) -> Result<(), SynopticError> {
        if self.spec.within == 0 {
            return Err(self.invalid("within must be at least one minute"));
        }
        self.set("within", self.spec.within.to_string());
        Ok(())
    }

    fn reject_attime(&self) -> Result<(), SynopticError> {
        match self.spec.attime {
            Some(_) => Err(self.invalid("attime is only valid for nearest-time queries")),
            None => Ok(()),
        }
    }

    fn resolve(&self, value: TimeValue, now: DateTime<Utc>) -> Result<DateTime<Utc>, SynopticError> {
        value
            .resolve(now)
            .ok_or_else(|| self.invalid("time reaches outside the representable range"))
    }

    fn reject_range(&self) -> Result<(), SynopticError> {
        if self.spec.start.is_some() || self.spec.end.is_some() || self.spec.recent.is_some() {
            return Err(self.invalid("start, end and recent are not accepted"));
        }
        Ok(())
    }

    fn resolved_pair(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, SynopticError> {
        match (self.spec.start, self.spec.end) {
            (None, None) => Ok(None),
            (Some(start), Some(end)) => {
                let (start, end) = (self.resolve(start, now)?, self.resolve(end, now)?);
                if start > end {
                    return Err(self.invalid(format!(
                        "start {} is after end {}",
                        format_wire(start),
                        format_wire(end)
                    )));
                }
                Ok(Some((start, end)))
            }
            _ => Err(self.invalid("start and end must be given together")),
        }
    }

    /// Time range of time series and precipitation: start/end or recent, never both.
    fn range(&mut self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>), SynopticError> {
        let explicit = self.resolved_pair(now)?;
        match (explicit, self.spec.recent) {
            (Some(_), Some(_)) => Err(self.invalid("use either start/end or recent, not both")),
            (Some((start, end)), None) => {
                self.set("start", format_wire(start));
                self.set("end", format_wire(end));
                Ok((start, end))
            }
            (None, Some(recent)) => {
                let minutes = whole_minutes(recent);
                if minutes <= 0 {
                    return Err(self.invalid("recent must be a positive duration"));
                }
                let start = Duration::try_minutes(minutes)
                    .and_then(|recent| now.checked_sub_signed(recent))
                    .ok_or_else(|| self.invalid("recent reaches outside the representable time range"))?;
                self.set("recent", minutes.to_string());
                Ok((start, now))
            }
            (None, None) => Err(self.invalid("a time range (start/end or recent) is required")),
        }
    }

    fn optional_obrange(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, SynopticError> {
        let pair = self.resolved_pair(now)?;
        if let Some((start, end)) = pair {
            self.set(
                "obrange",
                format!("{},{}", start.format("%Y%m%d"), end.format("%Y%m%d")),
            );
        }
        Ok(pair)
    }

    fn precip_mode(&mut self) -> Result<(), SynopticError> {
        let Some(interval) = self.spec.precip_interval else {
            return Ok(());
        };
        if let PrecipInterval::Hours(hours) = interval {
            if !(1..=24).contains(&hours) {
                return Err(self.invalid("precipitation interval must be 1 to 24 hours"));
            }
        }
        self.set("pmode", "intervals");
        self.set("interval", interval.wire_value());
        Ok(())
    }
}
