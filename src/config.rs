//! Session configuration.

use crate::auth::ApiKey;
use crate::error::SynopticError;
use bon::Builder;
use chrono::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.synopticdata.com/v2";
pub const API_KEY_VAR: &str = "SYNOPTIC_API_KEY";
pub const API_URL_VAR: &str = "SYNOPTIC_API_URL";

/// Settings of a [`crate::Synoptic`] session.
///
/// # Examples
///
/// ```
/// use synoptic::SynopticConfig;
///
/// let config = SynopticConfig::builder().api_key("my-key").build();
/// assert_eq!(config.base_url(), "https://api.synopticdata.com/v2");
/// assert!(config.hide_token());
/// ```
#[derive(Debug, Clone, Builder)]
pub struct SynopticConfig {
    #[builder(into)]
    api_key: ApiKey,
    #[builder(into, default = DEFAULT_BASE_URL.to_string())]
    base_url: String,
    /// How long requested tokens stay valid.
    #[builder(default = Duration::hours(24))]
    token_lifetime: Duration,
    #[builder(default = std::time::Duration::from_secs(30))]
    request_timeout: std::time::Duration,
    /// Redact the token from logged and reported URLs.
    #[builder(default = true)]
    hide_token: bool,
}

impl SynopticConfig {
    /// Reads the API key from `SYNOPTIC_API_KEY` and, if set, the base URL from
    /// `SYNOPTIC_API_URL`. Everything else keeps its default.
    ///
    /// # Errors
    ///
    /// [`SynopticError::MissingConfig`] when `SYNOPTIC_API_KEY` is unset or empty.
    pub fn from_env() -> Result<Self, SynopticError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SynopticError> {
        let api_key = lookup(API_KEY_VAR)
            .filter(|key| !key.trim().is_empty())
            .ok_or(SynopticError::MissingConfig(API_KEY_VAR))?;
        let base_url = lookup(API_URL_VAR).filter(|url| !url.trim().is_empty());
        Ok(Self::builder()
            .api_key(api_key.trim())
            .maybe_base_url(base_url)
            .build())
    }

    pub fn api_key(&self) -> &ApiKey {
        &self.api_key
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn token_lifetime(&self) -> Duration {
        self.token_lifetime
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        self.request_timeout
    }

    pub fn hide_token(&self) -> bool {
        self.hide_token
    }
}
