//! Weighted leak-likelihood heuristic
//!
//! A finding is scored from its link, title and snippet. Signals are additive
//! and evaluated in a fixed order so the rationale reads the same every time:
//! - `.onion` link
//! - leak keywords in the title
//! - sensitive-data keywords in the snippet
//! - sensitive-data patterns in the snippet (email, CPF, CEP, card number)

use regex::Regex;
use std::sync::LazyLock;

use crate::Verdict;

pub const ONION_LINK_WEIGHT: u32 = 20;
pub const TITLE_KEYWORD_WEIGHT: u32 = 10;
pub const SNIPPET_KEYWORD_WEIGHT: u32 = 5;
pub const PATTERN_WEIGHT: u32 = 15;

/// Title keywords suggesting a leak (English and Portuguese)
pub const TITLE_KEYWORDS: &[&str] = &[
    "leak", "vazamento", "data", "dump", "hack", "breach", "database",
];

/// Snippet keywords suggesting personal or credential data
pub const SNIPPET_KEYWORDS: &[&str] = &[
    "password",
    "senha",
    "credential",
    "credencial",
    "personal",
    "pessoal",
    "private",
    "privado",
];

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b").unwrap()
});

// Brazilian taxpayer id: xxx.xxx.xxx-xx
static CPF_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{3}[-.\s]?\d{3}[-.\s]?\d{3}[-.\s]?\d{2}\b").unwrap()
});

// Brazilian postal code: xxxxx-xxx
static CEP_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{5}[-.\s]?\d{3}\b").unwrap()
});

static CARD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{4}[-.\s]?\d{4}[-.\s]?\d{4}[-.\s]?\d{4}\b").unwrap()
});

/// Sensitive-data patterns checked against the snippet, in rationale order
fn sensitive_patterns() -> [(&'static str, &'static Regex); 4] {
    [
        ("Email", &*EMAIL_REGEX),
        ("CPF", &*CPF_REGEX),
        ("CEP", &*CEP_REGEX),
        ("Credit card", &*CARD_REGEX),
    ]
}

/// Score a finding. Pure and total: empty input scores 0.
pub fn score_finding(link: &str, title: &str, snippet: &str) -> Verdict {
    let mut score = 0;
    let mut rationale = Vec::new();

    if link.contains(".onion") {
        score += ONION_LINK_WEIGHT;
        rationale.push(format!(".onion link (+{})", ONION_LINK_WEIGHT));
    }

    let title_lower = title.to_lowercase();
    for keyword in TITLE_KEYWORDS {
        if title_lower.contains(keyword) {
            score += TITLE_KEYWORD_WEIGHT;
            rationale.push(format!("Title keyword: {} (+{})", keyword, TITLE_KEYWORD_WEIGHT));
        }
    }

    let snippet_lower = snippet.to_lowercase();
    for keyword in SNIPPET_KEYWORDS {
        if snippet_lower.contains(keyword) {
            score += SNIPPET_KEYWORD_WEIGHT;
            rationale.push(format!(
                "Description keyword: {} (+{})",
                keyword, SNIPPET_KEYWORD_WEIGHT
            ));
        }
    }

    for (label, pattern) in sensitive_patterns() {
        if pattern.is_match(snippet) {
            score += PATTERN_WEIGHT;
            rationale.push(format!("{} pattern found (+{})", label, PATTERN_WEIGHT));
        }
    }

    Verdict::automatic(score, rationale)
}
