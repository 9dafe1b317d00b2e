//! Automatic validation
//!
//! Wraps the pure scoring heuristic with its audit side effect.

use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use onion_core::{score_finding, AuditEvent, AuditSink, Verdict};

pub struct Validator {
    audit: Arc<dyn AuditSink>,
}

impl Validator {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self { audit }
    }

    /// Score a candidate and audit the verdict
    pub fn validate(&self, link: &str, title: &str, snippet: &str) -> Verdict {
        let verdict = score_finding(link, title, snippet);
        debug!("{} scored {} ({})", link, verdict.score, verdict.rationale_text());

        self.audit.record_event(
            AuditEvent::new(
                "automatic_validation",
                format!(
                    "Automatic validation of {}: score {}, {}",
                    link,
                    verdict.score,
                    if verdict.is_valid { "valid" } else { "not valid" }
                ),
            )
            .with_data(json!({
                "link": link,
                "score": verdict.score,
                "is_valid": verdict.is_valid,
                "rationale": verdict.rationale,
            })),
        );

        verdict
    }
}
