//! Utility functions for text processing and markdown post-processing.
//!
//! Regex patterns are compile-time validated via the `lazy_regex!` macro.

#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;
use unicode_segmentation::UnicodeSegmentation;

/// Match markdown heading markers at the start of a line
static RE_HEADING: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"(?m)^#{1,6}\s*");

/// Match markdown links: [text](url)
static RE_LINK: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\[([^\]]+)\]\(([^)]+)\)");

/// Match horizontal rules: --- on its own line
static RE_RULE: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"(?m)^-{3,}\s*$");

/// Safely truncates a string to a maximum number of grapheme clusters.
///
/// Unicode-safe: never splits a multi-byte character or emoji cluster.
///
/// # Examples
///
/// ```
/// use arxiv_herald::utils::truncate_str;
/// assert_eq!(truncate_str("Привет, мир!", 6), "Привет");
/// ```
#[must_use]
pub fn truncate_str(s: &str, max_graphemes: usize) -> String {
    let mut it = s.grapheme_indices(true);
    match it.nth(max_graphemes) {
        Some((pos, _)) => s[..pos].to_string(),
        None => s.to_string(),
    }
}

/// Converts a markdown block into plain-text paragraphs suitable for
/// document blocks that carry no markup.
///
/// - heading markers (`#`) are stripped
/// - bold markers (`**`) are stripped
/// - `[text](url)` becomes `text (url)`
/// - horizontal rules become a plain dash line
/// - paragraphs are split on blank lines
#[must_use]
pub fn markdown_to_paragraphs(md: &str) -> Vec<String> {
    let mut text = RE_HEADING.replace_all(md, "").to_string();
    text = text.replace("**", "");
    text = RE_LINK.replace_all(&text, "$1 ($2)").to_string();
    text = RE_RULE
        .replace_all(&text, "--------------------")
        .to_string();

    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(ToString::to_string)
        .collect()
}
