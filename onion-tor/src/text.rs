//! Visible text extraction
//!
//! Turns fetched HTML into the text a reader would see, and locates a search
//! term inside it with surrounding context.

use regex::RegexBuilder;
use scraper::node::Node;
use scraper::Html;

/// Characters of context kept on each side of a term match
pub const CONTEXT_RADIUS: usize = 100;

/// Extract visible text from HTML, skipping script/style/noscript subtrees
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text_parts = Vec::new();

    for node_ref in document.root_element().descendants() {
        if let Node::Text(text_node) = node_ref.value() {
            let in_excluded = node_ref.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .map(|el| matches!(el.name(), "script" | "style" | "noscript"))
                    .unwrap_or(false)
            });

            if !in_excluded {
                let trimmed = text_node.trim();
                if !trimmed.is_empty() {
                    text_parts.push(trimmed);
                }
            }
        }
    }

    normalize_whitespace(&text_parts.join(" "))
}

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Find the first whole-word, case-insensitive occurrence of `term` and return
/// it with up to `radius` characters on each side.
pub fn term_context(text: &str, term: &str, radius: usize) -> Option<String> {
    let term = term.trim();
    if term.is_empty() {
        return None;
    }

    let pattern = RegexBuilder::new(&format!(r"\b{}\b", regex::escape(term)))
        .case_insensitive(true)
        .build()
        .ok()?;
    let m = pattern.find(text)?;

    let start = text[..m.start()]
        .char_indices()
        .rev()
        .take(radius)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(m.start());
    let end = text[m.end()..]
        .char_indices()
        .nth(radius)
        .map(|(i, _)| m.end() + i)
        .unwrap_or(text.len());

    Some(text[start..end].trim().to_string())
}

/// Truncate to at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
