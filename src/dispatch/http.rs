//! Shared HTTP plumbing for the Feishu open API.
//!
//! Provides common request/response handling to keep the transport
//! implementations free of status-mapping duplication.

use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::FEISHU_HTTP_TIMEOUT_SECS;
use crate::dispatch::{Channel, DispatchError};

/// Feishu error code for a rejected or expired access token
pub const CODE_INVALID_ACCESS_TOKEN: i64 = 99991663;

/// Envelope every Feishu open API response carries
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
    /// Zero on success
    #[serde(default)]
    pub code: i64,
    /// Human-readable status message
    #[serde(default)]
    pub msg: String,
}

/// Creates an HTTP client configured with the standard API timeout.
///
/// The per-client timeout prevents infinite hangs when the API is slow or
/// unresponsive.
#[must_use]
pub fn create_http_client() -> HttpClient {
    let timeout = Duration::from_secs(FEISHU_HTTP_TIMEOUT_SECS);
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Sends an authorized POST and maps the HTTP layer onto the dispatch error
/// taxonomy: timeouts, 5xx and 429 are transient; other non-success statuses
/// are permanent for `channel`.
///
/// The Feishu-level `code` inside the envelope is left to the caller, since
/// its meaning differs per endpoint.
///
/// # Errors
///
/// Returns `DispatchError::Transient` for retryable failures and
/// `DispatchError::Delivery` for definitive ones.
pub async fn post_json(
    client: &HttpClient,
    channel: Channel,
    url: &str,
    bearer_token: &str,
    body: &Value,
) -> Result<ApiEnvelope, DispatchError> {
    let response = client
        .post(url)
        .bearer_auth(bearer_token)
        .json(body)
        .send()
        .await
        .map_err(|e| DispatchError::Transient(e.to_string()))?;

    let status = response.status();
    if status.is_server_error() || status.as_u16() == 429 {
        return Err(DispatchError::Transient(format!(
            "{channel} endpoint returned {status}"
        )));
    }
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(DispatchError::Delivery {
            channel,
            cause: format!("{status} - {}", truncate_detail(&detail)),
        });
    }

    response
        .json::<ApiEnvelope>()
        .await
        .map_err(|e| DispatchError::Delivery {
            channel,
            cause: format!("invalid response body: {e}"),
        })
}

/// Keep error payloads short enough for logs.
fn truncate_detail(detail: &str) -> String {
    if detail.len() > 500 {
        format!("{}... (truncated)", &detail[..500])
    } else {
        detail.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_parses_feishu_shape() {
        let raw = r#"{"code":230001,"msg":"invalid receive_id","data":{}}"#;
        let envelope: ApiEnvelope = serde_json::from_str(raw).expect("envelope parses");
        assert_eq!(envelope.code, 230_001);
        assert_eq!(envelope.msg, "invalid receive_id");
    }

    #[test]
    fn test_truncate_detail_long_body() {
        let long = "x".repeat(600);
        let short = truncate_detail(&long);
        assert!(short.len() < 600);
        assert!(short.ends_with("(truncated)"));
    }
}
