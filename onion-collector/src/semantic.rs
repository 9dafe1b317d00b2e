//! Semantic context validation
//!
//! Answers whether a term literally appears on a page. A hit is enough on its
//! own to register a finding with a positive validation.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use onion_core::{
    AuditEvent, AuditSink, FindingDraft, FindingId, SourceId, Store, ValidationMethod, Verdict,
    CONFIRMED_SCORE,
};
use onion_tor::{term_context, visible_text, Fetch, CONTEXT_RADIUS};

use crate::CollectorError;

pub const CONTEXT_RATIONALE: &str = "Term found in page context";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextResult {
    pub url: String,
    pub found: bool,
    pub context_snippet: Option<String>,
    /// None when the fetch itself failed
    pub http_status: Option<u16>,
    /// Finding registered for a hit
    pub finding_id: Option<FindingId>,
}

pub struct SemanticValidator {
    fetcher: Arc<dyn Fetch>,
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditSink>,
    timeout: Duration,
}

impl SemanticValidator {
    pub fn new(
        fetcher: Arc<dyn Fetch>,
        store: Arc<dyn Store>,
        audit: Arc<dyn AuditSink>,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            store,
            audit,
            timeout,
        }
    }

    /// Look for `term` in the visible text of `url`; on a hit, record the
    /// finding and a semantic validation
    pub async fn validate_in_context(
        &self,
        term: &str,
        url: &str,
        source_id: Option<SourceId>,
    ) -> Result<ContextResult, CollectorError> {
        self.audit.record_event(
            AuditEvent::new(
                "semantic_validation_attempt",
                format!("Looking for '{}' in {}", term, url),
            )
            .with_data(json!({ "term": term, "url": url })),
        );

        let (http_status, context_snippet) = match self.fetcher.fetch(url, self.timeout).await {
            Ok(response) if response.is_ok() => {
                let text = visible_text(&response.body);
                (Some(response.status), term_context(&text, term, CONTEXT_RADIUS))
            }
            Ok(response) => {
                debug!("{} returned status {}", url, response.status);
                (Some(response.status), None)
            }
            Err(e) => {
                debug!("Could not fetch {}: {}", url, e);
                (None, None)
            }
        };

        let recorded = match &context_snippet {
            Some(context) => self.record_hit(term, url, context, source_id).map(Some),
            None => Ok(None),
        };

        let found = context_snippet.is_some();
        self.audit.record_event(
            AuditEvent::new(
                if found {
                    "semantic_validation_found"
                } else {
                    "semantic_validation_not_found"
                },
                format!(
                    "'{}' {} in {}",
                    term,
                    if found { "found" } else { "not found" },
                    url
                ),
            )
            .with_data(json!({
                "term": term,
                "url": url,
                "http_status": http_status,
                "context": context_snippet,
                "recorded": recorded.as_ref().map(|id| id.is_some()).unwrap_or(false),
            })),
        );

        let finding_id = recorded?;

        Ok(ContextResult {
            url: url.to_string(),
            found,
            context_snippet,
            http_status,
            finding_id,
        })
    }

    fn record_hit(
        &self,
        term: &str,
        url: &str,
        context: &str,
        source_id: Option<SourceId>,
    ) -> Result<FindingId, CollectorError> {
        let recorded = self.store.record_finding(&FindingDraft {
            search_term: term.to_string(),
            discovered_link: url.to_string(),
            title: format!("leak containing {}", term),
            snippet: context.to_string(),
            source_id,
        })?;

        self.store.record_validation(
            recorded.id,
            &Verdict::confirmed(ValidationMethod::Semantic, CONFIRMED_SCORE, CONTEXT_RATIONALE),
        )?;

        Ok(recorded.id)
    }

    /// Run the context check on each URL in turn. A URL whose result cannot be
    /// recorded is logged and left out.
    pub async fn validate_links_in_context(
        &self,
        term: &str,
        urls: &[String],
        source_id: Option<SourceId>,
    ) -> Vec<ContextResult> {
        let mut results = Vec::with_capacity(urls.len());

        for url in urls {
            match self.validate_in_context(term, url, source_id).await {
                Ok(result) => results.push(result),
                Err(e) => error!("Context validation of {} failed: {}", url, e),
            }
        }

        let positives = results.iter().filter(|r| r.found).count();
        info!(
            "Context validation for '{}': {} of {} links contain the term",
            term,
            positives,
            urls.len()
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{audit_actions, memory_store, StaticFetcher};
    use onion_core::FindingFilter;
    use onion_store::SqliteStore;
    use onion_tor::FetchError;

    const PAGE: &str = r#"<html><body>
        <script>var acme = "hidden";</script>
        <p>Fresh dump of ACME Corp employees with passwords.</p>
    </body></html>"#;

    fn validator(store: &Arc<SqliteStore>, fetcher: StaticFetcher) -> SemanticValidator {
        SemanticValidator::new(
            Arc::new(fetcher),
            store.clone(),
            store.clone(),
            Duration::from_secs(25),
        )
    }

    #[tokio::test]
    async fn test_found_records_finding_and_validation() {
        let store = memory_store();
        let url = "http://paste7xyz.onion/p/1";
        let result = validator(&store, StaticFetcher::new().page(url, 200, PAGE))
            .validate_in_context("acme corp", url, None)
            .await
            .unwrap();

        assert!(result.found);
        assert_eq!(result.http_status, Some(200));
        assert_eq!(
            result.context_snippet.as_deref(),
            Some("Fresh dump of ACME Corp employees with passwords.")
        );

        let finding_id = result.finding_id.unwrap();
        let finding = store.get_finding(finding_id).unwrap();
        assert_eq!(finding.title, "leak containing acme corp");
        assert_eq!(finding.discovered_link, url);

        let validation = store.latest_validation(finding_id).unwrap().unwrap();
        assert_eq!(validation.verdict.method, ValidationMethod::Semantic);
        assert_eq!(validation.verdict.score, 100);
        assert_eq!(validation.verdict.rationale, vec![CONTEXT_RATIONALE]);

        assert_eq!(
            audit_actions(&store),
            vec!["semantic_validation_attempt", "semantic_validation_found"]
        );
    }

    #[tokio::test]
    async fn test_script_text_does_not_count() {
        let store = memory_store();
        let url = "http://paste7xyz.onion/p/2";
        let page = "<html><body><script>var initech = 1;</script><p>nothing</p></body></html>";
        let result = validator(&store, StaticFetcher::new().page(url, 200, page))
            .validate_in_context("initech", url, None)
            .await
            .unwrap();

        assert!(!result.found);
        assert!(result.context_snippet.is_none());
        assert!(store.list_findings(&FindingFilter::default()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_200_and_fetch_error_not_found() {
        let store = memory_store();
        let fetcher = StaticFetcher::new()
            .page("http://a.onion/", 404, PAGE)
            .failing("http://b.onion/", FetchError::Network("refused".to_string()));
        let validator = validator(&store, fetcher);

        let missing = validator
            .validate_in_context("acme", "http://a.onion/", None)
            .await
            .unwrap();
        assert!(!missing.found);
        assert_eq!(missing.http_status, Some(404));

        let failed = validator
            .validate_in_context("acme", "http://b.onion/", None)
            .await
            .unwrap();
        assert!(!failed.found);
        assert_eq!(failed.http_status, None);

        assert_eq!(
            audit_actions(&store),
            vec![
                "semantic_validation_attempt",
                "semantic_validation_not_found",
                "semantic_validation_attempt",
                "semantic_validation_not_found",
            ]
        );
    }

    #[tokio::test]
    async fn test_validate_links_in_context() {
        let store = memory_store();
        let fetcher = StaticFetcher::new()
            .page("http://a.onion/", 200, PAGE)
            .page("http://b.onion/", 200, "<p>unrelated</p>");
        let urls = vec![
            "http://a.onion/".to_string(),
            "http://b.onion/".to_string(),
            "http://c.onion/".to_string(),
        ];

        let results = validator(&store, fetcher)
            .validate_links_in_context("acme", &urls, None)
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|r| r.found).count(), 1);
        assert_eq!(store.list_findings(&FindingFilter::default()).unwrap().len(), 1);
    }
}
