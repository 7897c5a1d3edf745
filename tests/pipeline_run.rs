//! End-to-end pipeline runs against in-memory transports.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use arxiv_herald::compose::CardPayload;
use arxiv_herald::dispatch::{
    Channel, ChatTransport, DispatchError, Dispatcher, DocumentSink, Outcome,
};
use arxiv_herald::ledger::Ledger;
use arxiv_herald::paper::PaperRecord;
use arxiv_herald::pipeline::{Pipeline, PipelineError, RunStatus};
use arxiv_herald::retry::RetryPolicy;
use async_trait::async_trait;

fn paper(id: &str, title: &str) -> PaperRecord {
    PaperRecord {
        arxiv_id: id.to_string(),
        title: title.to_string(),
        authors: vec!["Ada Lovelace".to_string(), "Alan Turing".to_string()],
        tldr: "Short summary.".to_string(),
        score: Some(8.0),
        pdf_url: format!("https://arxiv.org/pdf/{id}"),
        code_url: None,
        keywords: vec!["ml".to_string()],
        affiliations: vec![],
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
    }
}

/// Chat transport failure behaviour for a test run
enum ChatMode {
    Ok,
    PermanentFail,
    TransientFirst(usize),
}

struct MockChat {
    mode: ChatMode,
    calls: AtomicUsize,
    sent: Mutex<Vec<CardPayload>>,
}

impl MockChat {
    fn new(mode: ChatMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent_cards(&self) -> Vec<CardPayload> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl ChatTransport for MockChat {
    async fn send_card(&self, card: &CardPayload) -> Result<(), DispatchError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            ChatMode::Ok => {}
            ChatMode::PermanentFail => {
                return Err(DispatchError::Delivery {
                    channel: Channel::Chat,
                    cause: "230001 invalid receive_id".to_string(),
                })
            }
            ChatMode::TransientFirst(n) => {
                if attempt < n {
                    return Err(DispatchError::Transient("connection reset".to_string()));
                }
            }
        }
        self.sent.lock().expect("sent lock").push(card.clone());
        Ok(())
    }
}

/// In-memory prepend-only document
struct MemoryDoc {
    body: Mutex<String>,
    fail: bool,
}

impl MemoryDoc {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            body: Mutex::new(String::new()),
            fail,
        })
    }

    fn body(&self) -> String {
        self.body.lock().expect("body lock").clone()
    }
}

#[async_trait]
impl DocumentSink for MemoryDoc {
    async fn prepend(&self, block: &str) -> Result<(), DispatchError> {
        if self.fail {
            return Err(DispatchError::Delivery {
                channel: Channel::Document,
                cause: "permission denied".to_string(),
            });
        }
        let mut body = self.body.lock().expect("body lock");
        *body = format!("{block}{body}");
        Ok(())
    }
}

struct Harness {
    chat: Arc<MockChat>,
    doc: Arc<MemoryDoc>,
    fallback: Arc<MemoryDoc>,
    ledger_path: std::path::PathBuf,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new(chat_mode: ChatMode, doc_fails: bool) -> Self {
        Self::with_fallback(chat_mode, doc_fails, false)
    }

    fn with_fallback(chat_mode: ChatMode, doc_fails: bool, fallback_fails: bool) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        Self {
            chat: MockChat::new(chat_mode),
            doc: MemoryDoc::new(doc_fails),
            fallback: MemoryDoc::new(fallback_fails),
            ledger_path: dir.path().join("history.json"),
            _dir: dir,
        }
    }

    fn pipeline(&self) -> Pipeline {
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.chat) as Arc<dyn ChatTransport>,
            Some(Arc::clone(&self.doc) as Arc<dyn DocumentSink>),
            Arc::clone(&self.fallback) as Arc<dyn DocumentSink>,
        )
        .with_retry(fast_retry());
        Pipeline::new(dispatcher, Ledger::load(&self.ledger_path), None)
    }

    fn reload_ledger(&self) -> Ledger {
        Ledger::load(&self.ledger_path)
    }
}

#[tokio::test]
async fn test_first_run_delivers_everything() {
    let harness = Harness::new(ChatMode::Ok, false);
    let papers = vec![
        paper("2401.00001", "P1"),
        paper("2401.00002", "P2"),
        paper("2401.00003", "P3"),
    ];

    let report = harness.pipeline().run(&papers, "2026-08-06").await;

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(
        report.delivered,
        vec!["2401.00001", "2401.00002", "2401.00003"]
    );
    let ledger = harness.reload_ledger();
    assert_eq!(ledger.len(), 3);
    assert!(ledger.contains("2401.00002"));

    let doc = harness.doc.body();
    assert!(doc.contains("P1") && doc.contains("P3"));
    assert!(harness.fallback.body().is_empty());
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let harness = Harness::new(ChatMode::Ok, false);
    let papers = vec![paper("2401.00001", "P1"), paper("2401.00002", "P2")];

    let first = harness.pipeline().run(&papers, "2026-08-06").await;
    assert_eq!(first.status, RunStatus::Success);
    let cards_after_first = harness.chat.sent_cards().len();

    let second = harness.pipeline().run(&papers, "2026-08-07").await;
    assert_eq!(second.status, RunStatus::NoOp);
    assert!(second.delivered.is_empty());
    let chat_result = second.chat.expect("all-duplicates run reports the chat channel");
    assert_eq!(chat_result.outcome, Outcome::SkippedDuplicate);
    assert_eq!(harness.chat.sent_cards().len(), cards_after_first);
    assert_eq!(harness.reload_ledger().len(), 2);
}

#[tokio::test]
async fn test_incremental_batch_delivers_only_new_paper() {
    let harness = Harness::new(ChatMode::Ok, false);
    let day_one = vec![
        paper("2401.00001", "P1"),
        paper("2401.00002", "P2"),
        paper("2401.00003", "P3"),
    ];
    harness.pipeline().run(&day_one, "2026-08-06").await;

    let mut day_two = day_one.clone();
    day_two.push(paper("2401.00004", "P4"));
    let report = harness.pipeline().run(&day_two, "2026-08-07").await;

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.delivered, vec!["2401.00004"]);
    assert_eq!(harness.reload_ledger().len(), 4);

    // the second card mentions only the new paper
    let cards = harness.chat.sent_cards();
    let second_card = &cards[1].content;
    assert!(second_card.contains("P4"));
    assert!(!second_card.contains("P1"));
}

#[tokio::test]
async fn test_document_failure_is_partial_success() {
    // remote document and the local fallback both fail
    let harness = Harness::with_fallback(ChatMode::Ok, true, true);
    let papers = vec![paper("2401.00001", "P1")];

    let report = harness.pipeline().run(&papers, "2026-08-06").await;

    assert_eq!(report.status, RunStatus::PartialSuccess);
    let document = report.document.expect("document result present");
    assert_eq!(document.outcome, Outcome::Failed);
    // chat delivered, ledger still commits
    assert_eq!(report.delivered, vec!["2401.00001"]);
    assert!(harness.reload_ledger().contains("2401.00001"));
}

#[tokio::test]
async fn test_remote_document_failure_falls_back_to_local_file() {
    let harness = Harness::new(ChatMode::Ok, true);
    let papers = vec![paper("2401.00001", "P1")];

    let report = harness.pipeline().run(&papers, "2026-08-06").await;

    // the fallback sink absorbed the block, so the run is still a success
    // with the fallback channel reported
    assert_eq!(report.status, RunStatus::Success);
    let document = report.document.expect("document result present");
    assert_eq!(document.channel, Channel::DocumentFallback);
    assert_eq!(document.outcome, Outcome::Delivered);
    assert!(harness.fallback.body().contains("P1"));
}

#[tokio::test]
async fn test_chat_permanent_failure_aborts_without_commit() {
    let harness = Harness::new(ChatMode::PermanentFail, false);
    let papers = vec![paper("2401.00001", "P1")];

    let report = harness.pipeline().run(&papers, "2026-08-06").await;

    assert_eq!(report.status, RunStatus::Failure);
    assert!(matches!(
        report.error,
        Some(PipelineError::ChatDelivery(_))
    ));
    assert!(report.delivered.is_empty());
    assert!(harness.reload_ledger().is_empty());

    // a retried run re-attempts the same papers
    let chat_attempts = harness.chat.calls.load(Ordering::SeqCst);
    assert_eq!(chat_attempts, 1, "permanent failures are not retried");
}

#[tokio::test]
async fn test_transient_chat_failures_are_retried() {
    let harness = Harness::new(ChatMode::TransientFirst(2), false);
    let papers = vec![paper("2401.00001", "P1")];

    let report = harness.pipeline().run(&papers, "2026-08-06").await;

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(harness.chat.calls.load(Ordering::SeqCst), 3);
    assert_eq!(harness.chat.sent_cards().len(), 1);
    assert!(harness.reload_ledger().contains("2401.00001"));
}

#[tokio::test]
async fn test_empty_batch_is_no_op() {
    let harness = Harness::new(ChatMode::Ok, false);

    let report = harness.pipeline().run(&[], "2026-08-06").await;

    assert_eq!(report.status, RunStatus::NoOp);
    assert!(report.chat.is_none(), "empty input is not a duplicate skip");
    assert!(harness.chat.sent_cards().is_empty());
    assert!(harness.reload_ledger().is_empty());
}

#[tokio::test]
async fn test_document_prepend_keeps_newest_first() {
    let harness = Harness::new(ChatMode::Ok, false);

    harness
        .pipeline()
        .run(&[paper("2401.00001", "Oldest")], "2026-08-05")
        .await;
    harness
        .pipeline()
        .run(&[paper("2401.00002", "Newest")], "2026-08-06")
        .await;

    let body = harness.doc.body();
    let newest = body.find("Newest").expect("newest present");
    let oldest = body.find("Oldest").expect("oldest present");
    assert!(newest < oldest, "prepend must keep new content first");
}
