//! Tenant access token acquisition and caching.
//!
//! The Feishu API issues short-lived tenant tokens. This cache refreshes them
//! ahead of expiry and shares a single in-flight refresh between concurrent
//! callers.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{FEISHU_API_BASE, TOKEN_REFRESH_MARGIN_SECS};
use crate::retry::RetryPolicy;

/// Errors surfaced while obtaining a tenant token
#[derive(Debug, Error)]
pub enum AuthError {
    /// The API rejected the app id / secret pair
    #[error("credentials rejected: {code} {message}")]
    Rejected {
        /// Feishu error code
        code: i64,
        /// Error message from the server
        message: String,
    },
    /// Network failure after retries
    #[error("auth network error: {0}")]
    Network(String),
}

/// A short-lived access token with its expiry instant
#[derive(Debug, Clone)]
pub struct Credential {
    /// Opaque bearer token
    pub token: String,
    /// Instant after which the token is no longer valid
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// True while the token remains valid outside the refresh margin.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now > ChronoDuration::seconds(TOKEN_REFRESH_MARGIN_SECS)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    tenant_access_token: String,
    /// Token lifetime in seconds
    #[serde(default)]
    expire: i64,
}

/// In-memory cache around the tenant token endpoint.
///
/// The mutex is held across the refresh request, so callers arriving during a
/// refresh await the in-flight fetch instead of issuing their own.
pub struct TokenCache {
    http: HttpClient,
    endpoint: String,
    app_id: String,
    app_secret: String,
    retry: RetryPolicy,
    cached: Mutex<Option<Credential>>,
}

impl TokenCache {
    /// Create a cache for the given app credentials.
    #[must_use]
    pub fn new(http: HttpClient, app_id: String, app_secret: String) -> Self {
        Self {
            http,
            endpoint: format!("{FEISHU_API_BASE}/auth/v3/tenant_access_token/internal"),
            app_id,
            app_secret,
            retry: RetryPolicy::default(),
            cached: Mutex::new(None),
        }
    }

    /// Override the token endpoint and retry policy (used by tests).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: String, retry: RetryPolicy) -> Self {
        self.endpoint = endpoint;
        self.retry = retry;
        self
    }

    /// Return a valid credential, refreshing when the cached one is missing
    /// or inside the expiry margin.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Rejected` when the id/secret pair is refused, or
    /// `AuthError::Network` when the endpoint stays unreachable after retries.
    pub async fn token(&self) -> Result<Credential, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(cred) = cached.as_ref() {
            if cred.is_fresh(Utc::now()) {
                return Ok(cred.clone());
            }
            debug!("cached tenant token inside refresh margin, refreshing");
        }
        let cred = self.fetch().await?;
        *cached = Some(cred.clone());
        Ok(cred)
    }

    /// Drop the cached credential after a downstream authorization failure,
    /// forcing the next `token` call to refresh.
    pub async fn invalidate(&self) {
        let mut cached = self.cached.lock().await;
        if cached.take().is_some() {
            info!("cached tenant token invalidated after authorization failure");
        }
    }

    async fn fetch(&self) -> Result<Credential, AuthError> {
        let body = json!({
            "app_id": self.app_id,
            "app_secret": self.app_secret,
        });

        let resp: TokenResponse = self
            .retry
            .run(
                || async {
                    let resp = self
                        .http
                        .post(&self.endpoint)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| AuthError::Network(e.to_string()))?;
                    let status = resp.status();
                    if status.is_server_error() || status.as_u16() == 429 {
                        return Err(AuthError::Network(format!(
                            "token endpoint returned {status}"
                        )));
                    }
                    resp.json::<TokenResponse>()
                        .await
                        .map_err(|e| AuthError::Network(e.to_string()))
                },
                |e: &AuthError| matches!(e, AuthError::Network(_)),
            )
            .await?;

        if resp.code != 0 {
            warn!(code = resp.code, msg = %resp.msg, "tenant token request rejected");
            return Err(AuthError::Rejected {
                code: resp.code,
                message: resp.msg,
            });
        }

        let expires_at = Utc::now() + ChronoDuration::seconds(resp.expire);
        debug!(%expires_at, "tenant token refreshed");
        Ok(Credential {
            token: resp.tenant_access_token,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_fresh_outside_margin() {
        let now = Utc::now();
        let cred = Credential {
            token: "t".to_string(),
            expires_at: now + ChronoDuration::seconds(TOKEN_REFRESH_MARGIN_SECS + 60),
        };
        assert!(cred.is_fresh(now));
    }

    #[test]
    fn test_credential_stale_inside_margin() {
        let now = Utc::now();
        let cred = Credential {
            token: "t".to_string(),
            expires_at: now + ChronoDuration::seconds(TOKEN_REFRESH_MARGIN_SECS - 60),
        };
        assert!(!cred.is_fresh(now));
    }

    #[test]
    fn test_credential_expired() {
        let now = Utc::now();
        let cred = Credential {
            token: "t".to_string(),
            expires_at: now - ChronoDuration::seconds(10),
        };
        assert!(!cred.is_fresh(now));
    }

    #[test]
    fn test_token_response_parses_feishu_shape() {
        let raw = r#"{"code":0,"msg":"ok","tenant_access_token":"t-abc","expire":7200}"#;
        let resp: TokenResponse = serde_json::from_str(raw).expect("token response parses");
        assert_eq!(resp.code, 0);
        assert_eq!(resp.tenant_access_token, "t-abc");
        assert_eq!(resp.expire, 7200);
    }
}
