//! Persistence and audit interfaces
//!
//! The collection pipeline never talks to a database directly; it is handed
//! implementations of these traits at construction.

use thiserror::Error;

use crate::{
    AuditEvent, Finding, FindingDraft, FindingFilter, FindingId, FindingWithValidation,
    HealthStatus, NewSource, RecordedFinding, Source, SourceId, StatusRecord, Validation,
    ValidationStats, Verdict,
};

/// Errors surfaced by a persistence backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Source {0} not found")]
    SourceNotFound(SourceId),

    #[error("Finding {0} not found")]
    FindingNotFound(FindingId),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Persistence of sources, findings and validations
pub trait Store: Send + Sync {
    /// Record a finding; idempotent on (search_term, discovered_link)
    fn record_finding(&self, draft: &FindingDraft) -> Result<RecordedFinding, StoreError>;

    /// Append a validation for a finding
    fn record_validation(&self, finding_id: FindingId, verdict: &Verdict)
        -> Result<Validation, StoreError>;

    fn get_finding(&self, id: FindingId) -> Result<Finding, StoreError>;

    /// Most recent validation of a finding, if any
    fn latest_validation(&self, finding_id: FindingId) -> Result<Option<Validation>, StoreError>;

    fn list_findings(&self, filter: &FindingFilter)
        -> Result<Vec<FindingWithValidation>, StoreError>;

    fn validation_stats(&self) -> Result<ValidationStats, StoreError>;

    fn add_source(&self, source: &NewSource) -> Result<SourceId, StoreError>;

    fn get_source(&self, id: SourceId) -> Result<Source, StoreError>;

    /// Sources in the registry's natural order (by name)
    fn list_sources(&self, active_only: bool) -> Result<Vec<Source>, StoreError>;

    fn set_source_active(&self, id: SourceId, active: bool) -> Result<(), StoreError>;

    /// Set the source's health and check time, and append a history row
    fn update_source_health(
        &self,
        id: SourceId,
        status: HealthStatus,
        details: &str,
    ) -> Result<(), StoreError>;

    /// History rows for a source, newest first
    fn status_history(&self, id: SourceId, limit: usize) -> Result<Vec<StatusRecord>, StoreError>;
}

/// Append-only audit trail. Fire-and-forget: implementations swallow their own failures.
pub trait AuditSink: Send + Sync {
    fn record_event(&self, event: AuditEvent);
}
