//! Local delivery ledger.
//!
//! A file-backed set of already-delivered paper identifiers, used to
//! deduplicate deliveries across daily runs. Commits are atomic: the new
//! ledger is written to a sibling temp file and renamed over the old one, so
//! a crash mid-commit never leaves a half-written file.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::paper::PaperRecord;

/// Current on-disk schema version
const LEDGER_VERSION: u32 = 1;

/// Errors raised by ledger commits
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Filesystem failure
    #[error("ledger io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization failure
    #[error("ledger serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Channel a paper was delivered to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    /// Group chat only
    Chat,
    /// Durable document only
    Document,
    /// Both channels
    Both,
}

/// One delivered paper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Paper identifier
    pub arxiv_id: String,
    /// When the delivery happened
    pub delivered_at: DateTime<Utc>,
    /// Where it was delivered
    pub channel: DeliveryChannel,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    entries: Vec<HistoryEntry>,
}

/// File-backed set of already-delivered paper identifiers.
pub struct Ledger {
    path: PathBuf,
    file: LedgerFile,
    seen: HashSet<String>,
}

impl Ledger {
    /// Load the ledger from `path`.
    ///
    /// A missing or corrupt file is treated as empty history, never as a
    /// fatal error, so the first run always proceeds.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<LedgerFile>(&raw) {
                Ok(file) => file,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt ledger file, starting with empty history");
                    LedgerFile::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no ledger file yet, starting with empty history");
                LedgerFile::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable ledger file, starting with empty history");
                LedgerFile::default()
            }
        };

        let seen = file.entries.iter().map(|e| e.arxiv_id.clone()).collect();
        Self { path, file, seen }
    }

    /// Number of delivered identifiers on record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// True when no delivery has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// True when the identifier has already been delivered.
    #[must_use]
    pub fn contains(&self, arxiv_id: &str) -> bool {
        self.seen.contains(arxiv_id)
    }

    /// Keep only records not yet delivered, preserving input order.
    #[must_use]
    pub fn filter_new(&self, records: &[PaperRecord]) -> Vec<PaperRecord> {
        records
            .iter()
            .filter(|p| !self.seen.contains(&p.arxiv_id))
            .cloned()
            .collect()
    }

    /// Append entries for exactly the given identifiers and persist.
    ///
    /// Identifiers already on record are skipped, keeping the ledger
    /// append-only with one entry per paper.
    ///
    /// # Errors
    ///
    /// Returns a `LedgerError` when the file cannot be written; in-memory
    /// state is only updated alongside a successful write.
    pub fn commit(
        &mut self,
        delivered: &[String],
        channel: DeliveryChannel,
    ) -> Result<(), LedgerError> {
        let now = Utc::now();
        let mut appended = 0usize;
        for id in delivered {
            if self.seen.contains(id) {
                continue;
            }
            self.file.entries.push(HistoryEntry {
                arxiv_id: id.clone(),
                delivered_at: now,
                channel,
            });
            appended += 1;
        }
        if appended == 0 {
            return Ok(());
        }

        match self.write_atomic() {
            Ok(()) => {
                for entry in &self.file.entries {
                    self.seen.insert(entry.arxiv_id.clone());
                }
                debug!(appended, total = self.file.entries.len(), "ledger committed");
                Ok(())
            }
            Err(e) => {
                // roll back the in-memory entries so a retried run re-attempts
                self.file
                    .entries
                    .truncate(self.file.entries.len() - appended);
                Err(e)
            }
        }
    }

    fn write_atomic(&self) -> Result<(), LedgerError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let json = serde_json::to_string_pretty(&LedgerFile {
            version: LEDGER_VERSION,
            entries: self.file.entries.clone(),
        })?;
        let tmp = tmp_path(&self.path);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
