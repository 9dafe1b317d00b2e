//! Collection orchestrator
//!
//! Drives a term search across the active sources, one source at a time:
//! health check, extraction, then record and score each candidate. A failing
//! source contributes nothing and the search moves on.

use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use onion_core::{
    AuditEvent, AuditSink, FindingDraft, FindingId, FindingWithValidation, HealthStatus,
    NewSource, RawFinding, Source, SourceCategory, SourceId, Store, Validation, ValidationMethod,
    Verdict, CONFIRMED_SCORE,
};
use onion_tor::Fetch;

use crate::{
    CollectorError, ContextResult, Extractor, LinkListExtractor, MonitorConfig, SemanticValidator,
    StatusChecker, StatusReport, StatusSummary, SurfaceExtractor, Validator,
};

pub const MANUAL_RATIONALE: &str = "Confirmed manually by operator";

/// Outcome of one term in a batch search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub term: String,
    pub findings: usize,
    pub valid: usize,
    pub error: Option<String>,
}

/// Collection pipeline entry point
pub struct Collector {
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditSink>,
    status: StatusChecker,
    validator: Validator,
    semantic: SemanticValidator,
    extractors: HashMap<SourceCategory, Arc<dyn Extractor>>,
    source_delay: Duration,
}

impl Collector {
    pub fn new(
        config: &MonitorConfig,
        fetcher: Arc<dyn Fetch>,
        store: Arc<dyn Store>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let mut extractors: HashMap<SourceCategory, Arc<dyn Extractor>> = HashMap::new();
        extractors.insert(
            SourceCategory::Surface,
            Arc::new(SurfaceExtractor::new(
                fetcher.clone(),
                config.surface.clone(),
                config.timeouts.search(),
            )),
        );
        extractors.insert(
            SourceCategory::LinkList,
            Arc::new(LinkListExtractor::new(
                fetcher.clone(),
                config.link_list.clone(),
                config.timeouts.search(),
            )),
        );

        Self {
            status: StatusChecker::new(
                fetcher.clone(),
                store.clone(),
                audit.clone(),
                config.timeouts.status(),
            ),
            validator: Validator::new(audit.clone()),
            semantic: SemanticValidator::new(
                fetcher,
                store.clone(),
                audit.clone(),
                config.timeouts.context(),
            ),
            store,
            audit,
            extractors,
            source_delay: config.source_delay(),
        }
    }

    /// Replace the extractor used for a source category
    pub fn with_extractor(mut self, category: SourceCategory, extractor: Arc<dyn Extractor>) -> Self {
        self.extractors.insert(category, extractor);
        self
    }

    pub fn with_source_delay(mut self, delay: Duration) -> Self {
        self.source_delay = delay;
        self
    }

    /// Search every active source for `term`. The term is used exactly as
    /// given; only a blank term is rejected.
    pub async fn search(&self, term: &str) -> Result<Vec<FindingWithValidation>, CollectorError> {
        if term.trim().is_empty() {
            return Err(CollectorError::EmptyTerm);
        }

        let run_id = Uuid::new_v4().to_string();
        let sources = self.store.list_sources(true)?;
        info!("Searching {} active sources for '{}'", sources.len(), term);

        self.audit.record_event(
            AuditEvent::new("search_started", format!("Search started for '{}'", term)).with_data(
                json!({ "run_id": run_id, "term": term, "sources": sources.len() }),
            ),
        );

        let mut results = Vec::new();

        for source in &sources {
            let (outcome, count) = match self.search_source(source, term).await {
                Ok(Some(found)) => {
                    let count = found.len();
                    results.extend(found);
                    ("searched", count)
                }
                Ok(None) => ("skipped", 0),
                Err(e) => {
                    error!("Source {} failed for '{}': {}", source.name, term, e);
                    ("failed", 0)
                }
            };

            info!("{}: {} ({} findings)", source.name, outcome, count);
            self.audit.record_event(
                AuditEvent::new(
                    "source_searched",
                    format!("{} {} for '{}': {} findings", source.name, outcome, term, count),
                )
                .with_data(json!({
                    "run_id": run_id,
                    "source_id": source.id,
                    "outcome": outcome,
                    "results": count,
                })),
            );

            tokio::time::sleep(self.source_delay).await;
        }

        let valid = results
            .iter()
            .filter(|r| r.validation.as_ref().is_some_and(|v| v.verdict.is_valid))
            .count();
        info!("Search for '{}' found {} findings ({} valid)", term, results.len(), valid);

        self.audit.record_event(
            AuditEvent::new(
                "search_completed",
                format!("Search completed for '{}': {} findings", term, results.len()),
            )
            .with_data(json!({
                "run_id": run_id,
                "term": term,
                "sources": sources.len(),
                "results": results.len(),
                "valid": valid,
            })),
        );

        Ok(results)
    }

    /// One source of a term search; `None` when the source is not healthy
    async fn search_source(
        &self,
        source: &Source,
        term: &str,
    ) -> Result<Option<Vec<FindingWithValidation>>, CollectorError> {
        let report = self.status.check_status(source.id, &source.base_url).await?;
        if report.status != HealthStatus::Active {
            info!("Skipping {}: {}", source.name, report.details);
            return Ok(None);
        }

        let extractor = self
            .extractors
            .get(&source.category)
            .ok_or(CollectorError::UnknownCategory(source.category))?;
        let candidates = extractor.extract(source, term).await?;

        let mut found = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            match self.record_candidate(term, source, candidate) {
                Ok(finding) => found.push(finding),
                Err(e) => warn!("Dropping {} from {}: {}", candidate.link, source.name, e),
            }
        }

        Ok(Some(found))
    }

    fn record_candidate(
        &self,
        term: &str,
        source: &Source,
        candidate: &RawFinding,
    ) -> Result<FindingWithValidation, CollectorError> {
        let recorded = self
            .store
            .record_finding(&FindingDraft::from_raw(term, candidate, Some(source.id)))?;

        let (action, description) = if recorded.created {
            ("finding_recorded", "Recorded finding")
        } else {
            ("duplicate_finding", "Finding already known")
        };
        self.audit.record_event(
            AuditEvent::new(action, format!("{}: {}", description, candidate.link)).with_data(
                json!({
                    "finding_id": recorded.id,
                    "term": term,
                    "link": candidate.link,
                    "source_id": source.id,
                }),
            ),
        );

        let verdict = self
            .validator
            .validate(&candidate.link, &candidate.title, &candidate.snippet);
        let validation = self.store.record_validation(recorded.id, &verdict)?;

        Ok(FindingWithValidation {
            finding: self.store.get_finding(recorded.id)?,
            source_name: Some(source.name.clone()),
            validation: Some(validation),
        })
    }

    /// Search each distinct term in turn; a failing term does not stop the batch
    pub async fn search_batch(&self, terms: &[String]) -> Vec<BatchOutcome> {
        let terms = dedupe_terms(terms);
        info!("Batch search over {} terms", terms.len());
        let mut outcomes = Vec::with_capacity(terms.len());

        for term in terms {
            self.audit.record_event(
                AuditEvent::new("scheduled_search", format!("Scheduled search for '{}'", term))
                    .with_data(json!({ "term": term })),
            );

            let outcome = match self.search(&term).await {
                Ok(results) => {
                    let valid = results
                        .iter()
                        .filter(|r| r.validation.as_ref().is_some_and(|v| v.verdict.is_valid))
                        .count();
                    self.audit.record_event(
                        AuditEvent::new(
                            "scheduled_search_done",
                            format!("Scheduled search for '{}' found {}", term, results.len()),
                        )
                        .with_data(json!({ "term": term, "results": results.len(), "valid": valid })),
                    );
                    BatchOutcome {
                        term,
                        findings: results.len(),
                        valid,
                        error: None,
                    }
                }
                Err(e) => {
                    error!("Scheduled search for '{}' failed: {}", term, e);
                    self.audit.record_event(
                        AuditEvent::new(
                            "scheduled_search_error",
                            format!("Scheduled search for '{}' failed", term),
                        )
                        .with_data(json!({ "term": term, "error": e.to_string() })),
                    );
                    BatchOutcome {
                        term,
                        findings: 0,
                        valid: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        outcomes
    }

    /// Score a link without recording it
    pub fn validate_link(&self, link: &str, title: &str, snippet: &str) -> Verdict {
        self.validator.validate(link, title, snippet)
    }

    /// Operator confirmation of a stored finding
    pub fn confirm_finding(&self, finding_id: FindingId) -> Result<Validation, CollectorError> {
        let validation = self.store.record_validation(
            finding_id,
            &Verdict::confirmed(ValidationMethod::Manual, CONFIRMED_SCORE, MANUAL_RATIONALE),
        )?;

        self.audit.record_event(
            AuditEvent::new(
                "manual_validation",
                format!("Finding {} confirmed manually", finding_id),
            )
            .with_data(json!({ "finding_id": finding_id, "score": CONFIRMED_SCORE })),
        );

        Ok(validation)
    }

    pub async fn check_source(&self, source_id: SourceId) -> Result<StatusReport, CollectorError> {
        self.status.check_source(source_id).await
    }

    pub async fn check_all_sources(&self) -> Result<StatusSummary, CollectorError> {
        self.status.check_all().await
    }

    pub async fn validate_in_context(
        &self,
        term: &str,
        url: &str,
        source_id: Option<SourceId>,
    ) -> Result<ContextResult, CollectorError> {
        self.semantic.validate_in_context(term, url, source_id).await
    }

    pub async fn validate_links_in_context(
        &self,
        term: &str,
        urls: &[String],
        source_id: Option<SourceId>,
    ) -> Vec<ContextResult> {
        self.semantic
            .validate_links_in_context(term, urls, source_id)
            .await
    }

    pub fn add_source(&self, source: &NewSource) -> Result<SourceId, CollectorError> {
        let id = self.store.add_source(source)?;
        info!("Registered source {} ({})", source.name, id);

        self.audit.record_event(
            AuditEvent::new("source_added", format!("Source added: {}", source.name)).with_data(
                json!({
                    "source_id": id,
                    "name": source.name,
                    "base_url": source.base_url,
                    "category": source.category.as_str(),
                }),
            ),
        );
        Ok(id)
    }

    /// Sources are never deleted, only switched off
    pub fn set_source_active(&self, source_id: SourceId, active: bool) -> Result<(), CollectorError> {
        self.store.set_source_active(source_id, active)?;

        let action = if active {
            "source_activated"
        } else {
            "source_deactivated"
        };
        self.audit.record_event(
            AuditEvent::new(action, format!("Source {} {}", source_id, action))
                .with_data(json!({ "source_id": source_id })),
        );
        Ok(())
    }
}

/// Trimmed, non-blank terms in first-seen order
pub fn dedupe_terms(terms: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty() && seen.insert(t.to_string()))
        .map(String::from)
        .collect()
}
