//! Run orchestration.
//!
//! One run per invocation: FILTER → COMPOSE → DISPATCH_CHAT ∥ DISPATCH_DOC →
//! COMMIT_LEDGER. Ledger entries are committed only after both dispatch
//! outcomes are known, so an aborted run never double-counts a later retry.

use std::fmt;

use thiserror::Error;
use tracing::{error, info};

use crate::compose::compose;
use crate::dispatch::{Channel, DispatchResult, Dispatcher};
use crate::ledger::{DeliveryChannel, Ledger, LedgerError};
use crate::paper::PaperRecord;

/// Overall status of one run, the contract surface for external schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// No new papers; nothing was dispatched or committed
    NoOp,
    /// Chat and document both accepted the batch
    Success,
    /// Chat accepted the batch, the document channel failed
    PartialSuccess,
    /// Chat delivery or the ledger commit failed
    Failure,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoOp => "no-op",
            Self::Success => "success",
            Self::PartialSuccess => "partial-success",
            Self::Failure => "failure",
        })
    }
}

/// Terminal failure causes, kept distinct so operators can tell a failed
/// delivery from the at-least-once window after a delivered batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Chat delivery failed permanently; nothing was committed
    #[error("chat delivery failed: {0}")]
    ChatDelivery(String),
    /// Papers were delivered but the ledger could not be written; a future
    /// run may re-deliver them until the ledger is reconciled manually
    #[error("ledger commit failed after delivery: {0}")]
    LedgerCommit(#[from] LedgerError),
}

/// Structured outcome of one pipeline run.
#[derive(Debug)]
pub struct RunReport {
    /// Overall status
    pub status: RunStatus,
    /// Chat channel outcome, when dispatch was attempted
    pub chat: Option<DispatchResult>,
    /// Document channel outcome, when dispatch was attempted
    pub document: Option<DispatchResult>,
    /// Identifiers committed to the ledger this run
    pub delivered: Vec<String>,
    /// Failure cause when `status` is [`RunStatus::Failure`]
    pub error: Option<PipelineError>,
}

impl RunReport {
    /// No-op run: `skipped` distinguishes an all-duplicates batch from an
    /// empty input batch.
    fn no_op(skipped: usize) -> Self {
        let (chat, document) = if skipped > 0 {
            (
                Some(DispatchResult::skipped(Channel::Chat)),
                Some(DispatchResult::skipped(Channel::Document)),
            )
        } else {
            (None, None)
        };
        Self {
            status: RunStatus::NoOp,
            chat,
            document,
            delivered: Vec::new(),
            error: None,
        }
    }
}

/// One-shot pipeline over a pre-ranked paper batch.
pub struct Pipeline {
    dispatcher: Dispatcher,
    ledger: Ledger,
    doc_url: Option<String>,
}

impl Pipeline {
    /// Assemble the pipeline from its owned collaborators.
    #[must_use]
    pub fn new(dispatcher: Dispatcher, ledger: Ledger, doc_url: Option<String>) -> Self {
        Self {
            dispatcher,
            ledger,
            doc_url,
        }
    }

    /// Run the state machine once.
    ///
    /// Never panics: every outcome, including failure, is reported through
    /// the returned [`RunReport`].
    pub async fn run(&mut self, papers: &[PaperRecord], date_label: &str) -> RunReport {
        // FILTER
        let fresh = self.ledger.filter_new(papers);
        let skipped = papers.len() - fresh.len();
        if skipped > 0 {
            info!(skipped, "papers already delivered, skipping");
        }
        if fresh.is_empty() {
            info!("no new papers, run is a no-op");
            return RunReport::no_op(skipped);
        }
        info!(count = fresh.len(), "dispatching new papers");

        // COMPOSE
        let (card, block) = compose(&fresh, date_label, self.doc_url.as_deref());

        // DISPATCH: chat and document are independent; both must settle
        // before the ledger commit evaluates.
        let (chat, document) = tokio::join!(
            self.dispatcher.send_card(&card),
            self.dispatcher.append_document(&block)
        );

        // COMMIT_LEDGER
        if !chat.is_delivered() {
            let cause = chat
                .error
                .clone()
                .unwrap_or_else(|| "unknown chat failure".to_string());
            error!(cause = %cause, "chat delivery failed, not committing ledger");
            return RunReport {
                status: RunStatus::Failure,
                chat: Some(chat),
                document: Some(document),
                delivered: Vec::new(),
                error: Some(PipelineError::ChatDelivery(cause)),
            };
        }

        let delivered: Vec<String> = fresh.iter().map(|p| p.arxiv_id.clone()).collect();
        let channel = if document.is_delivered() {
            DeliveryChannel::Both
        } else {
            DeliveryChannel::Chat
        };

        if let Err(e) = self.ledger.commit(&delivered, channel) {
            error!(error = %e, "ledger commit failed after delivery, manual reconciliation needed");
            return RunReport {
                status: RunStatus::Failure,
                chat: Some(chat),
                document: Some(document),
                delivered: Vec::new(),
                error: Some(PipelineError::LedgerCommit(e)),
            };
        }

        let status = if document.is_delivered() {
            RunStatus::Success
        } else {
            RunStatus::PartialSuccess
        };
        RunReport {
            status,
            chat: Some(chat),
            document: Some(document),
            delivered,
            error: None,
        }
    }
}
