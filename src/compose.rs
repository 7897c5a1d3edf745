//! Card and markdown composition.
//!
//! Composition is pure: the same input batch, date label, and document URL
//! always produce byte-identical output. The date label is an explicit input
//! so no clock is sampled here.

use serde::Serialize;
use serde_json::json;

use crate::config::CARD_PREVIEW_LIMIT;
use crate::paper::PaperRecord;
use crate::utils::truncate_str;

/// Longest title rendered inside a card line
const CARD_TITLE_MAX_GRAPHEMES: usize = 120;

/// A ready-to-send interactive card message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardPayload {
    /// Feishu message type, always `interactive`
    pub msg_type: String,
    /// JSON-encoded card object
    pub content: String,
}

/// Per-paper display fields shared by the card and the markdown block.
struct Summary {
    authors: String,
    keywords: String,
    stars: String,
}

fn summarize(p: &PaperRecord) -> Summary {
    let authors = if p.authors.len() <= 3 {
        p.authors.join(", ")
    } else {
        format!(
            "{}, {}, ..., {}",
            p.authors[0],
            p.authors[1],
            p.authors[p.authors.len() - 1]
        )
    };

    let keywords = if p.keywords.is_empty() {
        "N/A".to_string()
    } else {
        p.keywords
            .iter()
            .take(4)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };

    let score = p.score.unwrap_or(0.0);
    let stars = if score > 6.0 {
        let count = usize::min(5, (score / 2.0) as usize);
        "⭐".repeat(count)
    } else {
        String::new()
    };

    Summary {
        authors,
        keywords,
        stars,
    }
}

/// Render a batch into the interactive card payload and the markdown block.
///
/// The card is size-bounded: one line per paper up to [`CARD_PREVIEW_LIMIT`],
/// with a link to the full details when a document URL is configured. The
/// markdown block carries every paper in input order. Empty input produces an
/// explicit "no new papers" message instead of an empty payload.
#[must_use]
pub fn compose(
    papers: &[PaperRecord],
    date_label: &str,
    doc_url: Option<&str>,
) -> (CardPayload, String) {
    let title = format!("Daily arXiv - {date_label}");
    let card = build_card(&title, &card_summary(papers, &title, doc_url));
    let block = build_markdown(papers, date_label);
    (card, block)
}

fn card_summary(papers: &[PaperRecord], title: &str, doc_url: Option<&str>) -> String {
    if papers.is_empty() {
        return "No new papers today, enjoy the break! 😊".to_string();
    }

    let preview = usize::min(CARD_PREVIEW_LIMIT, papers.len());
    let mut lines = vec![
        format!("📚 **{title}**"),
        String::new(),
        format!(
            "{} papers recommended today; the top {preview} in brief:",
            papers.len()
        ),
        String::new(),
    ];

    for (idx, p) in papers.iter().take(CARD_PREVIEW_LIMIT).enumerate() {
        let info = summarize(p);
        let short_title = truncate_str(&p.title, CARD_TITLE_MAX_GRAPHEMES);
        lines.push(format!("{}. **{short_title}** {}", idx + 1, info.stars));
        lines.push(format!("   Keywords: {}", info.keywords));
        lines.push(format!("   [arXiv link]({})", p.abs_url()));
        lines.push(String::new());
    }

    if let Some(url) = doc_url {
        lines.push(format!("[👉 View full details (document)]({url})"));
    }

    lines.join("\n").trim().to_string()
}

fn build_card(title: &str, summary: &str) -> CardPayload {
    let card_obj = json!({
        "config": { "wide_screen_mode": true },
        "header": {
            "title": { "tag": "plain_text", "content": title },
            "template": "blue",
        },
        "elements": [
            {
                "tag": "div",
                "text": { "tag": "lark_md", "content": summary },
            }
        ],
    });

    CardPayload {
        msg_type: "interactive".to_string(),
        content: card_obj.to_string(),
    }
}

fn build_markdown(papers: &[PaperRecord], date_label: &str) -> String {
    if papers.is_empty() {
        return format!("## {date_label}\n\nNo new papers today.\n\n---\n\n");
    }

    let mut md = format!(
        "## {date_label}\n\n**{} papers recommended**\n\n",
        papers.len()
    );

    for (idx, p) in papers.iter().enumerate() {
        let info = summarize(p);
        md.push_str(&format!("### {}. {} {}\n", idx + 1, p.title, info.stars));
        md.push_str(&format!("**Authors:** {}\n\n", info.authors));

        if !p.affiliations.is_empty() {
            let mut affil = p
                .affiliations
                .iter()
                .take(3)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            if p.affiliations.len() > 3 {
                affil.push_str(", ...");
            }
            md.push_str(&format!("**Affiliations:** {affil}\n\n"));
        }

        md.push_str(&format!("**Keywords:** {}\n\n", info.keywords));
        md.push_str(&format!("**TLDR:** {}\n\n", p.tldr));
        md.push_str(&format!(
            "**Links:** [arXiv]({}) | [PDF]({})",
            p.abs_url(),
            p.pdf_url
        ));
        if let Some(code) = &p.code_url {
            md.push_str(&format!(" | [Code]({code})"));
        }
        md.push_str("\n\n---\n\n");
    }

    md
}
