//! Source status checks
//!
//! A source is active only when its base URL answers with an exact 200. Any
//! other response marks it inactive; a fetch failure marks it as an error.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use onion_core::{AuditEvent, AuditSink, HealthStatus, SourceId, Store};
use onion_tor::Fetch;

use crate::CollectorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub source_id: SourceId,
    pub status: HealthStatus,
    pub details: String,
}

/// Totals from checking every registered source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub active: usize,
    pub inactive: usize,
    pub error: usize,
    pub reports: Vec<StatusReport>,
}

pub struct StatusChecker {
    fetcher: Arc<dyn Fetch>,
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditSink>,
    timeout: Duration,
}

impl StatusChecker {
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

    /// Probe `url`, persist the outcome on the source and audit it.
    /// The audit event is written even when persistence fails.
    pub async fn check_status(
        &self,
        source_id: SourceId,
        url: &str,
    ) -> Result<StatusReport, CollectorError> {
        let (status, details) = match self.fetcher.fetch(url, self.timeout).await {
            Ok(response) if response.is_ok() => {
                (HealthStatus::Active, format!("Status code: {}", response.status))
            }
            Ok(response) => (
                HealthStatus::Inactive,
                format!("Status code: {}", response.status),
            ),
            Err(e) => (HealthStatus::Error, e.to_string()),
        };

        match status {
            HealthStatus::Error => warn!("Source {} ({}) failed: {}", source_id, url, details),
            _ => info!("Source {} ({}) is {}", source_id, url, status),
        }

        let persisted = self
            .store
            .update_source_health(source_id, status, &details);

        self.audit.record_event(
            AuditEvent::new(
                "source_check",
                format!("Checked source {}: {}", source_id, status),
            )
            .with_data(json!({
                "source_id": source_id,
                "url": url,
                "status": status.as_str(),
                "details": details,
            })),
        );

        persisted?;

        Ok(StatusReport {
            source_id,
            status,
            details,
        })
    }

    /// Check a registered source against its base URL
    pub async fn check_source(&self, source_id: SourceId) -> Result<StatusReport, CollectorError> {
        let source = self.store.get_source(source_id)?;
        self.check_status(source.id, &source.base_url).await
    }

    /// Check every registered source, active or not
    pub async fn check_all(&self) -> Result<StatusSummary, CollectorError> {
        let sources = self.store.list_sources(false)?;
        let mut summary = StatusSummary::default();

        for source in &sources {
            match self.check_status(source.id, &source.base_url).await {
                Ok(report) => {
                    match report.status {
                        HealthStatus::Active => summary.active += 1,
                        HealthStatus::Inactive => summary.inactive += 1,
                        _ => summary.error += 1,
                    }
                    summary.reports.push(report);
                }
                Err(e) => {
                    error!("Could not record status of {}: {}", source.name, e);
                    summary.error += 1;
                }
            }
        }

        info!(
            "Checked {} sources: {} active, {} inactive, {} error",
            sources.len(),
            summary.active,
            summary.inactive,
            summary.error
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{add_source, audit_actions, memory_store, StaticFetcher};
    use onion_core::SourceCategory;
    use onion_store::SqliteStore;
    use onion_tor::FetchError;

    fn checker(store: &Arc<SqliteStore>, fetcher: StaticFetcher) -> StatusChecker {
        StatusChecker::new(
            Arc::new(fetcher),
            store.clone(),
            store.clone(),
            Duration::from_secs(10),
        )
    }

    async fn check_once(fetcher: StaticFetcher, url: &str) -> (StatusReport, Arc<SqliteStore>) {
        let store = memory_store();
        let id = add_source(&store, "Ahmia", url, SourceCategory::Surface);
        let report = checker(&store, fetcher).check_status(id, url).await.unwrap();

        assert_eq!(audit_actions(&store), vec!["source_check"]);
        assert_eq!(store.status_history(id, 10).unwrap().len(), 1);
        assert_eq!(store.get_source(id).unwrap().health, report.status);
        (report, store)
    }

    #[tokio::test]
    async fn test_200_is_active() {
        let url = "https://ahmia.fi/";
        let (report, _) = check_once(StaticFetcher::new().page(url, 200, "ok"), url).await;
        assert_eq!(report.status, HealthStatus::Active);
        assert_eq!(report.details, "Status code: 200");
    }

    #[tokio::test]
    async fn test_non_200_is_inactive() {
        let url = "https://ahmia.fi/";
        for code in [204, 301, 404, 503] {
            let (report, _) = check_once(StaticFetcher::new().page(url, code, ""), url).await;
            assert_eq!(report.status, HealthStatus::Inactive);
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_is_error() {
        let url = "http://gone.onion/";
        let fetcher =
            StaticFetcher::new().failing(url, FetchError::Timeout("deadline elapsed".to_string()));
        let (report, store) = check_once(fetcher, url).await;

        assert_eq!(report.status, HealthStatus::Error);
        assert!(report.details.contains("deadline elapsed"));

        let history = store.status_history(report.source_id, 10).unwrap();
        assert!(history[0].details.contains("deadline elapsed"));
    }

    #[tokio::test]
    async fn test_unknown_source_still_audited() {
        let store = memory_store();
        let url = "https://ahmia.fi/";
        let err = checker(&store, StaticFetcher::new().page(url, 200, ""))
            .check_status(77, url)
            .await
            .unwrap_err();

        assert!(matches!(err, CollectorError::Persistence(_)));
        assert_eq!(audit_actions(&store), vec!["source_check"]);
    }

    #[tokio::test]
    async fn test_check_all() {
        let store = memory_store();
        add_source(&store, "A", "https://a.test/", SourceCategory::Surface);
        add_source(&store, "B", "https://b.test/", SourceCategory::LinkList);
        add_source(&store, "C", "https://c.test/", SourceCategory::LinkList);
        let fetcher = StaticFetcher::new()
            .page("https://a.test/", 200, "")
            .page("https://b.test/", 500, "");

        let summary = checker(&store, fetcher).check_all().await.unwrap();
        assert_eq!((summary.active, summary.inactive, summary.error), (1, 1, 1));
        assert_eq!(summary.reports.len(), 3);
    }
}
