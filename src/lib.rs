#![deny(missing_docs)]
//! Arxiv Herald core library.
//!
//! Daily delivery of a curated paper batch to a Feishu group chat as an
//! interactive card, with a prepend-style update of a durable document and a
//! local ledger that deduplicates deliveries across runs.

/// Tenant token acquisition and caching.
pub mod auth;
/// Card and markdown composition.
pub mod compose;
/// Configuration management.
pub mod config;
/// Delivery to chat and document channels.
pub mod dispatch;
/// Local delivery ledger.
pub mod ledger;
/// Paper records from the upstream discovery step.
pub mod paper;
/// Run orchestration.
pub mod pipeline;
/// Reusable retry policy.
pub mod retry;
pub mod utils;
