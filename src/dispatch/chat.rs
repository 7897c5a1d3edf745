//! Interactive card delivery to a Feishu group chat.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::json;
use tracing::{debug, warn};

use crate::auth::TokenCache;
use crate::compose::CardPayload;
use crate::config::FEISHU_API_BASE;
use crate::dispatch::http::{post_json, CODE_INVALID_ACCESS_TOKEN};
use crate::dispatch::{Channel, ChatTransport, DispatchError};

/// Chat transport backed by the Feishu `im/v1/messages` endpoint.
pub struct FeishuChat {
    http: HttpClient,
    tokens: Arc<TokenCache>,
    api_base: String,
    chat_id: String,
}

impl FeishuChat {
    /// Create a transport targeting the given group chat.
    #[must_use]
    pub fn new(http: HttpClient, tokens: Arc<TokenCache>, chat_id: String) -> Self {
        Self {
            http,
            tokens,
            api_base: FEISHU_API_BASE.to_string(),
            chat_id,
        }
    }

    /// Override the API base URL (used by tests).
    #[must_use]
    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base;
        self
    }
}

#[async_trait]
impl ChatTransport for FeishuChat {
    async fn send_card(&self, card: &CardPayload) -> Result<(), DispatchError> {
        let credential = self.tokens.token().await?;
        let url = format!(
            "{}/im/v1/messages?receive_id_type=chat_id",
            self.api_base
        );
        let body = json!({
            "receive_id": self.chat_id,
            "msg_type": card.msg_type,
            "content": card.content,
        });

        let envelope = post_json(&self.http, Channel::Chat, &url, &credential.token, &body).await?;

        if envelope.code == CODE_INVALID_ACCESS_TOKEN {
            // The cached token was rejected downstream; drop it so the next
            // retry attempt fetches a fresh one.
            warn!("chat endpoint rejected the access token, invalidating cache");
            self.tokens.invalidate().await;
            return Err(DispatchError::Transient(
                "access token rejected, refreshed for retry".to_string(),
            ));
        }
        if envelope.code != 0 {
            return Err(DispatchError::Delivery {
                channel: Channel::Chat,
                cause: format!("{} {}", envelope.code, envelope.msg),
            });
        }

        debug!(chat_id = %self.chat_id, "card accepted by chat endpoint");
        Ok(())
    }
}
