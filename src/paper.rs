//! Paper records consumed from the upstream discovery pipeline.
//!
//! Records arrive pre-ranked; the input order is preserved through
//! composition and dispatch.

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// A single scored paper produced by the upstream discovery step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Canonical arXiv identifier, the deduplication key
    pub arxiv_id: String,
    /// Paper title
    pub title: String,
    /// Ordered author names
    #[serde(default)]
    pub authors: Vec<String>,
    /// Short summary
    #[serde(default)]
    pub tldr: String,
    /// Relevance score assigned upstream
    #[serde(default)]
    pub score: Option<f64>,
    /// Link to the PDF
    #[serde(default)]
    pub pdf_url: String,
    /// Link to released code, when known
    #[serde(default)]
    pub code_url: Option<String>,
    /// Extracted keywords
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Author affiliations, when extracted
    #[serde(default)]
    pub affiliations: Vec<String>,
}

impl PaperRecord {
    /// Link to the arXiv abstract page.
    #[must_use]
    pub fn abs_url(&self) -> String {
        format!("https://arxiv.org/abs/{}", self.arxiv_id)
    }
}

/// Read a batch of papers from a JSON file produced by the discovery step.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_batch(path: &str) -> anyhow::Result<Vec<PaperRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read paper batch from {path}"))?;
    let papers: Vec<PaperRecord> =
        serde_json::from_str(&raw).with_context(|| format!("invalid paper batch in {path}"))?;
    Ok(papers)
}
