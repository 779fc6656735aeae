use crate::types::service::Service;
use polars::error::PolarsError;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum SynopticError {
    #[error("Invalid query for {service}: {message}")]
    InvalidQuery { service: Service, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Service error from {service} ({url}), status {status}: {message}")]
    Service {
        service: Service,
        url: String,
        status: u16,
        message: String,
    },

    #[error("Network request failed for {url}")]
    Transport {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to parse {service} response")]
    Parse {
        service: Service,
        #[source]
        source: ParseError,
    },

    #[error(transparent)]
    MissingColumn(#[from] MissingColumnError),

    #[error("Failed to build polars frame for station {station}")]
    Frame {
        station: String,
        #[source]
        source: PolarsError,
    },

    #[error("Missing configuration value '{0}'")]
    MissingConfig(&'static str),

    #[error("Invalid base URL '{url}'")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: BoxError,
    },
}

impl SynopticError {
    pub(crate) fn invalid_query(service: Service, message: impl Into<String>) -> Self {
        SynopticError::InvalidQuery {
            service,
            message: message.into(),
        }
    }

    pub(crate) fn parse(service: Service, source: impl Into<ParseError>) -> Self {
        SynopticError::Parse {
            service,
            source: source.into(),
        }
    }

    /// True for the errors a caller may reasonably retry later.
    pub fn is_transient(&self) -> bool {
        matches!(self, SynopticError::Transport { .. })
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Response body is not valid JSON")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Missing required field '{field}'{}", station_suffix(.station))]
    MissingField {
        field: String,
        station: Option<String>,
    },

    #[error("Malformed timestamp '{value}' for station {station}")]
    MalformedTimestamp { station: String, value: String },

    #[error("Column '{column}' for station {station} has {found} values, expected {expected}")]
    LengthMismatch {
        station: String,
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("Timestamps for station {station} are not strictly increasing at position {position}")]
    UnorderedIndex { station: String, position: usize },
}

/// A derived quantity was asked for but one of its source columns is absent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Missing required column '{column}'{}", station_suffix(.station))]
pub struct MissingColumnError {
    pub column: String,
    pub station: Option<String>,
}

fn station_suffix(station: &Option<String>) -> String {
    match station {
        Some(stid) => format!(" for station {}", stid),
        None => String::new(),
    }
}

impl ParseError {
    pub(crate) fn missing(field: impl Into<String>, station: Option<&str>) -> Self {
        ParseError::MissingField {
            field: field.into(),
            station: station.map(str::to_string),
        }
    }
}
