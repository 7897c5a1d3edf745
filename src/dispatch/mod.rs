//! Delivery to chat and document channels.
//!
//! Transports are traits so tests can substitute fakes without touching
//! process-wide state. Retry mechanics for transient failures live in the
//! shared [`RetryPolicy`]; permanent failures surface immediately.

/// Interactive card delivery to a Feishu group chat.
pub mod chat;
/// Durable document sinks (remote Docx and local file fallback).
pub mod document;
/// Shared HTTP plumbing for the Feishu open API.
pub mod http;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::auth::AuthError;
use crate::compose::CardPayload;
use crate::retry::RetryPolicy;

/// Errors raised while delivering to a channel
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Retryable network-level failure (timeout, 5xx, rate limit)
    #[error("transient network error: {0}")]
    Transient(String),
    /// Permanent per-channel failure, not retried
    #[error("delivery to {channel} failed: {cause}")]
    Delivery {
        /// Channel that refused the payload
        channel: Channel,
        /// Cause reported by the API or filesystem
        cause: String,
    },
    /// Credential acquisition failed
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl DispatchError {
    /// True for failures worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Delivery channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Group chat card message
    Chat,
    /// Remote durable document
    Document,
    /// Local-file stand-in for the durable document
    DocumentFallback,
}

impl Channel {
    /// Stable channel identifier used in reports and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Document => "document",
            Self::DocumentFallback => "document-fallback",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The channel accepted the payload
    Delivered,
    /// Nothing new to deliver
    SkippedDuplicate,
    /// Retries exhausted or the channel refused the payload
    Failed,
}

/// Per-channel outcome consumed by the orchestrator
#[derive(Debug, Clone)]
pub struct DispatchResult {
    /// Channel the result refers to
    pub channel: Channel,
    /// What happened
    pub outcome: Outcome,
    /// Error detail when failed
    pub error: Option<String>,
}

impl DispatchResult {
    /// Successful delivery on `channel`.
    #[must_use]
    pub fn delivered(channel: Channel) -> Self {
        Self {
            channel,
            outcome: Outcome::Delivered,
            error: None,
        }
    }

    /// Nothing new for `channel`; every record was already delivered.
    #[must_use]
    pub fn skipped(channel: Channel) -> Self {
        Self {
            channel,
            outcome: Outcome::SkippedDuplicate,
            error: None,
        }
    }

    /// Definitive failure on `channel`.
    #[must_use]
    pub fn failed(channel: Channel, error: &DispatchError) -> Self {
        Self {
            channel,
            outcome: Outcome::Failed,
            error: Some(error.to_string()),
        }
    }

    /// True when the channel accepted the payload.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        self.outcome == Outcome::Delivered
    }
}

/// Transport that can deliver one interactive card to a chat channel.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Deliver the card, returning once the platform accepted it.
    async fn send_card(&self, card: &CardPayload) -> Result<(), DispatchError>;
}

/// A durable document that accepts prepend-style updates.
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Insert `block` ahead of the existing document body.
    async fn prepend(&self, block: &str) -> Result<(), DispatchError>;
}

/// Delivery front-end used by the pipeline.
pub struct Dispatcher {
    chat: Arc<dyn ChatTransport>,
    document: Option<Arc<dyn DocumentSink>>,
    fallback: Arc<dyn DocumentSink>,
    retry: RetryPolicy,
}

impl Dispatcher {
    /// Build a dispatcher over the configured channels. `document` is the
    /// remote target when one is configured; `fallback` is always present.
    #[must_use]
    pub fn new(
        chat: Arc<dyn ChatTransport>,
        document: Option<Arc<dyn DocumentSink>>,
        fallback: Arc<dyn DocumentSink>,
    ) -> Self {
        Self {
            chat,
            document,
            fallback,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy (used by tests to avoid real backoff).
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Send the composed card to the group chat.
    ///
    /// Transient failures are retried with bounded backoff; the returned
    /// result is definitive either way.
    pub async fn send_card(&self, card: &CardPayload) -> DispatchResult {
        let sent = self
            .retry
            .run(|| self.chat.send_card(card), DispatchError::is_transient)
            .await;
        match sent {
            Ok(()) => {
                info!("chat card delivered");
                DispatchResult::delivered(Channel::Chat)
            }
            Err(e) => {
                error!(error = %e, "chat delivery failed");
                DispatchResult::failed(Channel::Chat, &e)
            }
        }
    }

    /// Prepend the markdown block to the durable document, falling back to
    /// the local file when the remote target is unconfigured or keeps
    /// failing. A successful fallback write counts as a delivery.
    pub async fn append_document(&self, block: &str) -> DispatchResult {
        if let Some(doc) = &self.document {
            match self
                .retry
                .run(|| doc.prepend(block), DispatchError::is_transient)
                .await
            {
                Ok(()) => {
                    info!("remote document updated");
                    return DispatchResult::delivered(Channel::Document);
                }
                Err(e) => {
                    warn!(error = %e, "remote document update failed, falling back to local file");
                }
            }
        }

        match self
            .retry
            .run(|| self.fallback.prepend(block), DispatchError::is_transient)
            .await
        {
            Ok(()) => {
                info!("document block written to local fallback");
                DispatchResult::delivered(Channel::DocumentFallback)
            }
            Err(e) => {
                error!(error = %e, "document fallback write failed");
                DispatchResult::failed(Channel::DocumentFallback, &e)
            }
        }
    }
}
