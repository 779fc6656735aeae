//! Sends encoded requests with the current token and classifies the replies.

pub mod backend;

use crate::auth::{Token, TokenManager};
use crate::error::SynopticError;
use crate::normalize::payload::Summary;
use crate::query::builder::EncodedRequest;
use crate::types::service::Service;
use backend::{HttpBackend, HttpReply};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Deserialize;
use std::sync::Arc;

/// Response code the service uses for a missing, invalid or expired token.
const AUTH_FAILURE_CODE: i64 = 200;
const OK_CODE: i64 = 1;
const SECRET_PARAMS: &[&str] = &["token", "apikey", "disableToken"];

/// Replaces the values of credential parameters in a URL with `HIDDEN`.
pub(crate) fn redact(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let params: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if SECRET_PARAMS.contains(&key) => format!("{}=HIDDEN", key),
            _ => pair.to_string(),
        })
        .collect();
    format!("{}?{}", base, params.join("&"))
}

/// A successful reply, not yet parsed.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub(crate) service: Service,
    /// Request URL, token redacted unless configured otherwise.
    pub(crate) url: String,
    pub(crate) status: u16,
    pub(crate) body: String,
    /// Resolved time window of the request, if it had one.
    pub(crate) window: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl RawResponse {
    /// Wraps a stored or replayed body so it can go through the normalizer.
    pub fn from_body(service: Service, body: impl Into<String>) -> Self {
        Self {
            service,
            url: String::new(),
            status: 200,
            body: body.into(),
            window: None,
        }
    }

    pub fn service(&self) -> Service {
        self.service
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

#[derive(Deserialize)]
struct SummaryOnly {
    #[serde(rename = "SUMMARY", default)]
    summary: Option<Summary>,
}

enum Attempt {
    Accepted(RawResponse),
    /// The service refused the token.
    Rejected(String),
}

pub struct Transport {
    base_url: String,
    backend: Arc<dyn HttpBackend>,
    hide_token: bool,
}

impl Transport {
    pub fn new(base_url: impl Into<String>, backend: Arc<dyn HttpBackend>, hide_token: bool) -> Self {
        Self {
            base_url: base_url.into(),
            backend,
            hide_token,
        }
    }

    /// Sends `request` with the current token.
    ///
    /// A token rejection triggers exactly one refresh and one retry. A second
    /// rejection invalidates the cached token and returns [`SynopticError::Auth`].
    /// Nothing else is retried.
    pub async fn send(
        &self,
        request: &EncodedRequest,
        tokens: &TokenManager,
    ) -> Result<RawResponse, SynopticError> {
        let token = tokens.acquire().await?;
        let message = match self.attempt(request, &token).await? {
            Attempt::Accepted(response) => return Ok(response),
            Attempt::Rejected(message) => message,
        };

        warn!(
            "Token rejected by {} ({}), refreshing and retrying once",
            request.service(),
            message
        );
        let token = tokens.refresh_after_rejection(&token).await?;
        match self.attempt(request, &token).await? {
            Attempt::Accepted(response) => Ok(response),
            Attempt::Rejected(message) => {
                tokens.invalidate().await;
                Err(SynopticError::Auth(format!(
                    "{} rejected a freshly issued token: {}",
                    request.service(),
                    message
                )))
            }
        }
    }

    fn display_url(&self, url: &str) -> String {
        if self.hide_token {
            redact(url)
        } else {
            url.to_string()
        }
    }

    async fn attempt(&self, request: &EncodedRequest, token: &Token) -> Result<Attempt, SynopticError> {
        let url = request
            .url(&self.base_url, &[("token", token.value())])?
            .to_string();
        let shown = self.display_url(&url);
        info!("Requesting {}", shown);

        let reply = self
            .backend
            .get(&url)
            .await
            .map_err(|source| {
                warn!("Request to {} failed: {}", shown, source);
                SynopticError::Transport {
                    url: shown.clone(),
                    source,
                }
            })?;
        classify(request, shown, reply)
    }
}

fn classify(request: &EncodedRequest, url: String, reply: HttpReply) -> Result<Attempt, SynopticError> {
    if reply.status == 401 || reply.status == 403 {
        return Ok(Attempt::Rejected(format!("HTTP {}", reply.status)));
    }

    let summary = serde_json::from_str::<SummaryOnly>(&reply.body)
        .ok()
        .and_then(|s| s.summary);
    let code = summary.as_ref().and_then(|s| s.response_code);
    let message = summary.and_then(|s| s.response_message);

    if code == Some(AUTH_FAILURE_CODE) {
        return Ok(Attempt::Rejected(
            message.unwrap_or_else(|| "invalid token".to_string()),
        ));
    }
    if !reply.is_success() {
        warn!("HTTP error for {}: {}", url, reply.status);
        return Err(SynopticError::Service {
            service: request.service(),
            url,
            status: reply.status,
            message: message.unwrap_or(reply.body),
        });
    }
    if let Some(code) = code.filter(|c| *c != OK_CODE) {
        return Err(SynopticError::Service {
            service: request.service(),
            url,
            status: reply.status,
            message: message.unwrap_or_else(|| format!("response code {}", code)),
        });
    }

    Ok(Attempt::Accepted(RawResponse {
        service: request.service(),
        url,
        status: reply.status,
        body: reply.body,
        window: request.window(),
    }))
}
