//! Responses of the catalogue services: networks, network types, QC types, variables.

use crate::error::SynopticError;
use crate::normalize::payload::Envelope;
use crate::normalize::timezone::parse_timestamp;
use crate::transport::RawResponse;
use crate::types::station::{Network, NetworkType, QcType, VariableInfo};
use std::collections::BTreeMap;

fn envelope(raw: &RawResponse) -> Result<Envelope, SynopticError> {
    serde_json::from_str(&raw.body).map_err(|e| SynopticError::parse(raw.service, e))
}

/// Sort key of a service id: numeric ids in numeric order, the rest after them.
fn id_order(id: &str) -> (u64, String) {
    (id.parse().unwrap_or(u64::MAX), id.to_string())
}

pub(crate) fn networks(raw: &RawResponse) -> Result<Vec<Network>, SynopticError> {
    let mut networks: Vec<Network> = envelope(raw)?
        .networks
        .into_iter()
        .map(|n| Network {
            id: n.id,
            short_name: n.shortname,
            long_name: n.longname,
            url: n.url.filter(|u| !u.is_empty()),
            category: n.category,
            reporting_stations: n.reporting_stations,
            last_observation: n.last_observation.as_deref().and_then(parse_timestamp),
        })
        .collect();
    networks.sort_by_key(|n| id_order(&n.id));
    Ok(networks)
}

pub(crate) fn network_types(raw: &RawResponse) -> Result<Vec<NetworkType>, SynopticError> {
    let mut types: Vec<NetworkType> = envelope(raw)?
        .network_types
        .into_iter()
        .map(|t| NetworkType {
            id: t.id,
            name: t.name,
            description: t.description,
        })
        .collect();
    types.sort_by_key(|t| id_order(&t.id));
    Ok(types)
}

pub(crate) fn qc_types(raw: &RawResponse) -> Result<Vec<QcType>, SynopticError> {
    let mut types: Vec<QcType> = envelope(raw)?
        .qc_types
        .into_iter()
        .map(|q| QcType {
            id: q.id,
            name: q.name,
            short_name: q.shortname,
            source: q.source,
        })
        .collect();
    types.sort_by_key(|q| id_order(&q.id));
    Ok(types)
}

pub(crate) fn variables(raw: &RawResponse) -> Result<BTreeMap<String, VariableInfo>, SynopticError> {
    Ok(envelope(raw)?
        .variables
        .into_iter()
        .flatten()
        .map(|(name, info)| {
            let long_name = info.long_name.unwrap_or_else(|| name.clone());
            (
                name,
                VariableInfo {
                    long_name,
                    unit: info.unit,
                },
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::service::Service;
    use serde_json::json;

    fn raw(service: Service, body: serde_json::Value) -> RawResponse {
        RawResponse {
            service,
            url: format!("https://example.invalid/v2/{}", service),
            status: 200,
            body: body.to_string(),
            window: None,
        }
    }

    #[test]
    fn test_networks_sorted_by_numeric_id() {
        let body = json!({"MNET": [
            {"ID": "10", "SHORTNAME": "UofU", "LONGNAME": "University of Utah", "URL": "",
             "CATEGORY": "7", "REPORTING_STATIONS": 20, "LAST_OBSERVATION": "2021-01-01T00:00:00Z"},
            {"ID": 2, "SHORTNAME": "RAWS"}
        ]});
        let networks = networks(&raw(Service::Networks, body)).unwrap();
        assert_eq!(networks[0].id, "2");
        assert_eq!(networks[1].short_name.as_deref(), Some("UofU"));
        assert_eq!(networks[1].url, None);
        assert_eq!(networks[1].reporting_stations, Some(20));
        assert!(networks[1].last_observation.is_some());
    }

    #[test]
    fn test_variables_map() {
        let body = json!({"VARIABLES": [
            {"air_temp": {"long_name": "Temperature", "unit": "Celsius"}},
            {"metar": {"unit": "text"}}
        ]});
        let variables = variables(&raw(Service::Variables, body)).unwrap();
        assert_eq!(variables["air_temp"].long_name, "Temperature");
        assert_eq!(variables["metar"].long_name, "metar");
        assert_eq!(variables["air_temp"].unit.as_deref(), Some("Celsius"));
    }

    #[test]
    fn test_types_and_bad_body() {
        let body = json!({
            "MNETCAT": [{"ID": "1", "NAME": "NWS/FAA"}],
            "QCTYPES": [{"ID": 3, "NAME": "Range Check", "SHORTNAME": "sl_range_check"}, {"ID": 1}]
        });
        assert_eq!(network_types(&raw(Service::NetworkTypes, body.clone())).unwrap().len(), 1);
        let qc = qc_types(&raw(Service::QcTypes, body)).unwrap();
        assert_eq!(qc.iter().map(|q| q.id.as_str()).collect::<Vec<_>>(), vec!["1", "3"]);

        let broken = RawResponse {
            body: "{".to_string(),
            ..raw(Service::Networks, json!({}))
        };
        assert!(matches!(networks(&broken), Err(SynopticError::Parse { .. })));
    }
}
