use crate::auth::token::{ApiKey, Token};
use crate::error::{ParseError, SynopticError};
use crate::normalize::payload::Envelope;
use crate::query::builder::endpoint_url;
use crate::query::time::format_wire;
use crate::transport::backend::HttpBackend;
use crate::transport::redact;
use crate::types::service::Service;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Owns the token of one API key: fetches it lazily, hands out the cached copy
/// until it expires, and drops it on rejection or `disable`.
///
/// All token changes happen under one lock, so concurrent callers that find the
/// token missing or rejected wait for a single refresh instead of each requesting one.
pub struct TokenManager {
    api_key: ApiKey,
    base_url: String,
    lifetime: Duration,
    backend: Arc<dyn HttpBackend>,
    current: Mutex<Option<Arc<Token>>>,
}

impl TokenManager {
    pub fn new(
        api_key: ApiKey,
        base_url: impl Into<String>,
        lifetime: Duration,
        backend: Arc<dyn HttpBackend>,
    ) -> Self {
        Self {
            api_key,
            base_url: base_url.into(),
            lifetime,
            backend,
            current: Mutex::new(None),
        }
    }

    /// Returns the cached token, fetching a new one if there is none or it has expired.
    ///
    /// # Errors
    ///
    /// [`SynopticError::Auth`] when the service rejects the API key, otherwise the
    /// transport, service or parse error of the auth request.
    pub async fn acquire(&self) -> Result<Arc<Token>, SynopticError> {
        let mut current = self.current.lock().await;
        let now = Utc::now();
        if let Some(token) = current.as_ref() {
            if !token.is_expired_at(now) {
                debug!("Using cached token, expires {}", token.expires_at());
                return Ok(Arc::clone(token));
            }
            info!("Token expired at {}, requesting a new one", token.expires_at());
        }
        *current = None;
        let token = Arc::new(self.request_token(now).await?);
        *current = Some(Arc::clone(&token));
        Ok(token)
    }

    /// Discards the cached token and fetches a new one unconditionally.
    pub async fn force_refresh(&self) -> Result<Arc<Token>, SynopticError> {
        let mut current = self.current.lock().await;
        *current = None;
        let token = Arc::new(self.request_token(Utc::now()).await?);
        *current = Some(Arc::clone(&token));
        Ok(token)
    }

    /// Refreshes after the service rejected `rejected`.
    ///
    /// If another caller already replaced that token, the replacement is returned
    /// without a new request.
    pub async fn refresh_after_rejection(
        &self,
        rejected: &Arc<Token>,
    ) -> Result<Arc<Token>, SynopticError> {
        let mut current = self.current.lock().await;
        let now = Utc::now();
        if let Some(token) = current.as_ref() {
            if !Arc::ptr_eq(token, rejected) && !token.is_expired_at(now) {
                debug!("Token was already refreshed by another request");
                return Ok(Arc::clone(token));
            }
        }
        *current = None;
        let token = Arc::new(self.request_token(now).await?);
        *current = Some(Arc::clone(&token));
        Ok(token)
    }

    /// Drops the cached token; the next `acquire` fetches a fresh one.
    pub async fn invalidate(&self) {
        if self.current.lock().await.take().is_some() {
            debug!("Cached token invalidated");
        }
    }

    /// Drops the cached token and asks the service to revoke it.
    ///
    /// Revocation is best effort: a failure is logged, never returned.
    pub async fn disable(&self) {
        let Some(token) = self.current.lock().await.take() else {
            debug!("No token to disable");
            return;
        };
        let url = match endpoint_url(
            &self.base_url,
            Service::Auth,
            &[("apikey", self.api_key.expose()), ("disableToken", token.value())],
        ) {
            Ok(url) => url.to_string(),
            Err(e) => {
                warn!("Cannot revoke token: {}", e);
                return;
            }
        };
        match self.backend.get(&url).await {
            Ok(reply) if reply.is_success() => info!("Token disabled"),
            Ok(reply) => warn!(
                "Failed to revoke token via {}: HTTP {}",
                redact(&url),
                reply.status
            ),
            Err(e) => warn!("Failed to revoke token via {}: {}", redact(&url), e),
        }
    }

    /// The cached token, if any, without fetching.
    pub async fn cached(&self) -> Option<Arc<Token>> {
        self.current.lock().await.clone()
    }

    async fn request_token(&self, now: DateTime<Utc>) -> Result<Token, SynopticError> {
        let expires_at = now + self.lifetime;
        let expire = format_wire(expires_at);
        let url = endpoint_url(
            &self.base_url,
            Service::Auth,
            &[("apikey", self.api_key.expose()), ("expire", expire.as_str())],
        )?
        .to_string();
        let shown = redact(&url);
        info!("Requesting token from {}", shown);

        let reply = self
            .backend
            .get(&url)
            .await
            .map_err(|source| SynopticError::Transport {
                url: shown.clone(),
                source,
            })?;

        if reply.status == 401 || reply.status == 403 {
            return Err(SynopticError::Auth(format!(
                "API key rejected (HTTP {})",
                reply.status
            )));
        }
        if !reply.is_success() {
            return Err(SynopticError::Service {
                service: Service::Auth,
                url: shown,
                status: reply.status,
                message: reply.body,
            });
        }

        let envelope: Envelope = serde_json::from_str(&reply.body)
            .map_err(|e| SynopticError::parse(Service::Auth, e))?;
        if let Some(summary) = &envelope.summary {
            if summary.response_code.is_some_and(|code| code != 1) {
                let message = summary
                    .response_message
                    .clone()
                    .unwrap_or_else(|| "API key rejected".to_string());
                return Err(SynopticError::Auth(message));
            }
        }
        match envelope.token.filter(|t| !t.is_empty()) {
            Some(value) => Ok(Token::new(value, now, expires_at)),
            None => Err(SynopticError::parse(
                Service::Auth,
                ParseError::missing("TOKEN", None),
            )),
        }
    }
}
