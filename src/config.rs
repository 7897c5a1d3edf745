//! Configuration and settings management
//!
//! Loads settings from environment variables and defines dispatch constants.

use config::{Config, ConfigError, Environment, File};
use lazy_regex::lazy_regex;
use serde::{Deserialize, Serialize};

/// Match a document token inside a pasted Feishu document URL
static RE_DOC_TOKEN: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"/(?:docx|docs|wiki)/([A-Za-z0-9]+)");

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Feishu application ID
    pub feishu_app_id: String,
    /// Feishu application secret
    pub feishu_app_secret: String,
    /// Target group chat ID
    pub feishu_chat_id: String,

    /// Durable document target: a raw document token or a full document URL
    pub feishu_doc_token: Option<String>,
    /// Public URL of the durable document, linked from the chat card
    pub feishu_doc_url: Option<String>,

    /// Path to the local delivery ledger
    #[serde(default = "default_history_file")]
    pub history_file: String,
    /// Path of the local markdown file used when the remote document is
    /// unavailable or unconfigured
    #[serde(default = "default_doc_fallback_file")]
    pub doc_fallback_file: String,
    /// Path to the JSON file with the day's paper batch
    pub papers_file: Option<String>,
}

fn default_history_file() -> String {
    "history.json".to_string()
}

fn default_doc_fallback_file() -> String {
    "history.md".to_string()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(File::with_name("config/default").required(false))
            // Add in the current environment file
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked into git
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of APP)
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Also add settings from environment variables directly (without prefix)
            // ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Fallback: check environment variables directly if config didn't pick
        // up the optional document fields
        if settings.feishu_doc_token.is_none() {
            if let Ok(val) = std::env::var("FEISHU_DOC_TOKEN") {
                if !val.is_empty() {
                    settings.feishu_doc_token = Some(val);
                }
            }
        }
        if settings.feishu_doc_url.is_none() {
            if let Ok(val) = std::env::var("FEISHU_DOC_URL") {
                if !val.is_empty() {
                    settings.feishu_doc_url = Some(val);
                }
            }
        }

        Ok(settings)
    }

    /// Resolved document token, accepting either a raw token or a full
    /// document URL pasted from the browser address bar.
    ///
    /// Returns `None` when no document target is configured or a URL was
    /// given that no token can be extracted from.
    #[must_use]
    pub fn doc_token(&self) -> Option<String> {
        let raw = self.feishu_doc_token.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.contains('/') {
            return RE_DOC_TOKEN
                .captures(raw)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string());
        }
        Some(raw.to_string())
    }
}

/// Base URL of the Feishu open API
pub const FEISHU_API_BASE: &str = "https://open.feishu.cn/open-apis";

/// Safety margin before token expiry that triggers a refresh
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

/// HTTP timeout for Feishu API calls
pub const FEISHU_HTTP_TIMEOUT_SECS: u64 = 30;

/// Maximum attempts per network call, including the first
pub const DISPATCH_MAX_ATTEMPTS: usize = 4;
/// Initial backoff delay for transient failures
pub const DISPATCH_INITIAL_BACKOFF_MS: u64 = 500;
/// Ceiling applied to every backoff delay
pub const DISPATCH_MAX_BACKOFF_MS: u64 = 8_000;

/// Papers shown inline in the chat card before the detail affordance
pub const CARD_PREVIEW_LIMIT: usize = 3;

/// Header written when the local history markdown is first created
pub const HISTORY_DOC_HEADER: &str = "# Daily arXiv digest history\n\n";
