mod auth;
mod config;
mod derived;
mod error;
mod normalize;
mod query;
mod synoptic;
mod transport;
mod types;

pub use error::{BoxError, MissingColumnError, ParseError, SynopticError};
pub use synoptic::*;
pub use config::*;

pub use auth::{ApiKey, Token, TokenManager};

pub use query::builder::EncodedRequest;
pub use query::defaults::{default_for, OPTION_DEFAULTS};
pub use query::spec::*;
pub use query::time::{TimeParseError, TimeValue};

pub use transport::backend::{HttpBackend, HttpReply, ReqwestBackend};
pub use transport::{RawResponse, Transport};

pub use normalize::resample::Resample;
pub use normalize::timezone::{TimezonePreference, UnknownTimezonePreference};
pub use normalize::units::{convert, Unit, UnitSystem, UnknownUnitSystem};
pub use normalize::variables::{SensorKey, SensorVariant, VariantPolicy};
pub use normalize::{parse, Normalizer};

pub use derived::*;

pub use types::observation_set::*;
pub use types::service::Service;
pub use types::station::*;
pub use types::table::*;
