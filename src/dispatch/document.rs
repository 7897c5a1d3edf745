//! Durable document sinks.
//!
//! The document target is selected at configuration time: a remote Feishu
//! Docx document when a token is configured, and a local markdown file
//! otherwise or as the fallback when the remote target fails definitively.
//! Concurrent writers are not coordinated; last-writer-wins is the accepted
//! limitation for the remote document.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::auth::TokenCache;
use crate::config::{FEISHU_API_BASE, HISTORY_DOC_HEADER};
use crate::dispatch::http::{post_json, CODE_INVALID_ACCESS_TOKEN};
use crate::dispatch::{Channel, DispatchError, DocumentSink};
use crate::utils::markdown_to_paragraphs;

/// Remote sink backed by the Feishu `docx/v1` block API.
///
/// Markdown is converted to plain-text paragraphs (Docx text blocks carry no
/// markup) and inserted as block children at index 0, which prepends the new
/// content ahead of the existing body.
pub struct FeishuDocSink {
    http: HttpClient,
    tokens: Arc<TokenCache>,
    api_base: String,
    doc_token: String,
}

impl FeishuDocSink {
    /// Create a sink targeting the given document.
    #[must_use]
    pub fn new(http: HttpClient, tokens: Arc<TokenCache>, doc_token: String) -> Self {
        Self {
            http,
            tokens,
            api_base: FEISHU_API_BASE.to_string(),
            doc_token,
        }
    }

    /// Override the API base URL (used by tests).
    #[must_use]
    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base;
        self
    }

    fn paragraph_block(text: &str) -> Value {
        json!({
            "block_type": 2,
            "text": {
                "style": {},
                "elements": [
                    { "text_run": { "content": text } }
                ],
            },
        })
    }
}

#[async_trait]
impl DocumentSink for FeishuDocSink {
    async fn prepend(&self, block: &str) -> Result<(), DispatchError> {
        let credential = self.tokens.token().await?;
        let url = format!(
            "{}/docx/v1/documents/{}/blocks/{}/children?document_revision_id=-1",
            self.api_base, self.doc_token, self.doc_token
        );

        let children: Vec<Value> = markdown_to_paragraphs(block)
            .iter()
            .map(|p| Self::paragraph_block(p))
            .collect();
        let block_count = children.len();
        let body = json!({
            "children": children,
            "index": 0,
        });

        let envelope =
            post_json(&self.http, Channel::Document, &url, &credential.token, &body).await?;

        if envelope.code == CODE_INVALID_ACCESS_TOKEN {
            warn!("document endpoint rejected the access token, invalidating cache");
            self.tokens.invalidate().await;
            return Err(DispatchError::Transient(
                "access token rejected, refreshed for retry".to_string(),
            ));
        }
        if envelope.code != 0 {
            return Err(DispatchError::Delivery {
                channel: Channel::Document,
                cause: format!("{} {}", envelope.code, envelope.msg),
            });
        }

        debug!(doc_token = %self.doc_token, blocks = block_count, "document blocks prepended");
        Ok(())
    }
}

/// Local-file document sink.
///
/// Prepends the block to a markdown file, creating it with a history header
/// on first write. Serves both as the configured target when no remote
/// document is set and as the fallback when the remote one fails.
pub struct LocalFileSink {
    path: PathBuf,
}

impl LocalFileSink {
    /// Create a sink writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_error(&self, e: &std::io::Error) -> DispatchError {
        DispatchError::Delivery {
            channel: Channel::DocumentFallback,
            cause: format!("{}: {e}", self.path.display()),
        }
    }
}

#[async_trait]
impl DocumentSink for LocalFileSink {
    async fn prepend(&self, block: &str) -> Result<(), DispatchError> {
        let existing = match tokio::fs::read_to_string(&self.path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                HISTORY_DOC_HEADER.to_string()
            }
            Err(e) => return Err(self.io_error(&e)),
        };

        let updated = format!("{block}{existing}");
        tokio::fs::write(&self.path, updated)
            .await
            .map_err(|e| self.io_error(&e))?;

        debug!(path = %self.path.display(), "local history file updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_sink_creates_file_with_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("history.md");
        let sink = LocalFileSink::new(&path);

        sink.prepend("## day one\n\n").await.expect("first write");

        let body = tokio::fs::read_to_string(&path).await.expect("read back");
        assert!(body.starts_with("## day one"));
        assert!(body.contains(HISTORY_DOC_HEADER.trim_end()));
    }

    #[tokio::test]
    async fn test_local_sink_prepends_new_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("history.md");
        let sink = LocalFileSink::new(&path);

        sink.prepend("old\n").await.expect("first write");
        sink.prepend("new\n").await.expect("second write");

        let body = tokio::fs::read_to_string(&path).await.expect("read back");
        let new_pos = body.find("new").expect("new present");
        let old_pos = body.find("old").expect("old present");
        assert!(new_pos < old_pos, "new content must come first");
    }

    #[test]
    fn test_paragraph_block_shape() {
        let block = FeishuDocSink::paragraph_block("hello");
        assert_eq!(block["block_type"], 2);
        assert_eq!(
            block["text"]["elements"][0]["text_run"]["content"],
            "hello"
        );
    }
}
