//! Onion Monitor Store - SQLite persistence
//!
//! Implements the `Store` and `AuditSink` interfaces from `onion-core` on a
//! single SQLite connection. Writes are serialized by a mutex around the
//! connection; dedup of findings is enforced by a unique index so concurrent
//! searches for the same term cannot create duplicates.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use tracing::{debug, error, info};

use onion_core::{
    default_sources, AuditEvent, AuditReport, AuditSink, Finding, FindingDraft, FindingFilter, FindingId,
    FindingWithValidation, HealthStatus, NewSource, RecordedFinding, Source, SourceCategory,
    SourceId, StatusRecord, Store, StoreError, Validation, ValidationMethod, ValidationStats,
    Verdict,
};

pub const SCHEMA_VERSION: i64 = 1;

/// Join that picks the latest validation of each finding
const LATEST_VALIDATION_JOIN: &str =
    "LEFT JOIN validations v ON v.id = (SELECT MAX(id) FROM validations WHERE finding_id = f.id)";

fn db_err(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Fixed-width UTC text so stored timestamps order lexically
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp {}: {}", value, e)))
}

fn parse_enum<T: std::str::FromStr<Err = String>>(value: &str) -> Result<T, StoreError> {
    value.parse().map_err(StoreError::Serialization)
}

/// SQLite-backed store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;
        info!("Opened database at {}", path.as_ref().display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(db_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<i64, StoreError> {
        self.conn
            .lock()
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(db_err)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let current = self.schema_version()?;
        if current > SCHEMA_VERSION {
            return Err(StoreError::Backend(format!(
                "unsupported schema version {}, max supported {}",
                current, SCHEMA_VERSION
            )));
        }

        if current < 1 {
            let conn = self.conn.lock();
            conn.execute_batch(include_str!("../migrations/0001_schema.sql"))
                .map_err(db_err)?;
            conn.execute_batch("PRAGMA user_version = 1;")
                .map_err(db_err)?;
            debug!("Applied schema migration 1");
        }

        Ok(())
    }

    /// Register the built-in sources when the registry is empty.
    /// Returns how many were inserted.
    pub fn seed_default_sources(&self) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock();
        // count and inserts under one write lock, even across processes
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let count: i64 = tx
            .query_row("SELECT COUNT(*) FROM sources", [], |row| row.get(0))
            .map_err(db_err)?;
        if count > 0 {
            return Ok(0);
        }

        let defaults = default_sources();
        for source in &defaults {
            Self::insert_source(&tx, source)?;
        }
        tx.commit().map_err(db_err)?;

        info!("Seeded {} default sources", defaults.len());
        Ok(defaults.len())
    }

    fn insert_source(conn: &Connection, source: &NewSource) -> Result<SourceId, StoreError> {
        conn.execute(
            "INSERT INTO sources (name, base_url, search_url, category, active, health, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                source.name,
                source.base_url,
                source.search_url,
                source.category.as_str(),
                source.active,
                HealthStatus::Unknown.as_str(),
                format_timestamp(&Utc::now()),
            ],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    /// Audit events recorded within `[since, until]`, newest first.
    /// Either bound may be left open.
    pub fn audit_events(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT action, description, data_json, recorded_at
                 FROM audit_events
                 WHERE (?1 IS NULL OR recorded_at >= ?1)
                   AND (?2 IS NULL OR recorded_at <= ?2)
                 ORDER BY id DESC LIMIT ?3",
            )
            .map_err(db_err)?;
        let since = since.as_ref().map(format_timestamp);
        let until = until.as_ref().map(format_timestamp);
        let rows = stmt
            .query_map(params![since, until, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        rows.into_iter()
            .map(|(action, description, data_json, recorded_at)| {
                let data = data_json
                    .map(|json| serde_json::from_str(&json))
                    .transpose()
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(AuditEvent {
                    action,
                    description,
                    data,
                    timestamp: parse_timestamp(&recorded_at)?,
                })
            })
            .collect()
    }

    /// Event totals since `since` (the whole trail when None), grouped by
    /// action with the most frequent first
    pub fn audit_report(&self, since: Option<DateTime<Utc>>) -> Result<AuditReport, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT action, COUNT(*) AS n FROM audit_events
                 WHERE (?1 IS NULL OR recorded_at >= ?1)
                 GROUP BY action ORDER BY n DESC, action",
            )
            .map_err(db_err)?;
        let by_action = stmt
            .query_map(params![since.as_ref().map(format_timestamp)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        Ok(AuditReport {
            total: by_action.iter().map(|(_, n)| n).sum(),
            by_action,
        })
    }

    fn source_exists(conn: &Connection, id: SourceId) -> Result<bool, StoreError> {
        conn.query_row("SELECT 1 FROM sources WHERE id = ?1", params![id], |_| Ok(()))
            .optional()
            .map(|found| found.is_some())
            .map_err(db_err)
    }

    fn finding_exists(conn: &Connection, id: FindingId) -> Result<bool, StoreError> {
        conn.query_row("SELECT 1 FROM findings WHERE id = ?1", params![id], |_| Ok(()))
            .optional()
            .map(|found| found.is_some())
            .map_err(db_err)
    }

    fn query_sources(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Source>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(args, SourceRow::from_row)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(SourceRow::into_source).collect()
    }
}

const SOURCE_COLUMNS: &str =
    "id, name, base_url, search_url, category, active, health, last_checked";

struct SourceRow {
    id: SourceId,
    name: String,
    base_url: String,
    search_url: Option<String>,
    category: String,
    active: bool,
    health: String,
    last_checked: Option<String>,
}

impl SourceRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            base_url: row.get(2)?,
            search_url: row.get(3)?,
            category: row.get(4)?,
            active: row.get(5)?,
            health: row.get(6)?,
            last_checked: row.get(7)?,
        })
    }

    fn into_source(self) -> Result<Source, StoreError> {
        Ok(Source {
            id: self.id,
            name: self.name,
            base_url: self.base_url,
            search_url: self.search_url,
            category: parse_enum::<SourceCategory>(&self.category)?,
            active: self.active,
            health: parse_enum::<HealthStatus>(&self.health)?,
            last_checked: self.last_checked.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

const FINDING_COLUMNS: &str =
    "f.id, f.search_term, f.source_id, f.discovered_link, f.title, f.snippet, f.discovered_at";

struct FindingRow {
    id: FindingId,
    search_term: String,
    source_id: Option<SourceId>,
    discovered_link: String,
    title: String,
    snippet: String,
    discovered_at: String,
}

impl FindingRow {
    /// Reads the seven finding columns starting at `offset`
    fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            search_term: row.get(offset + 1)?,
            source_id: row.get(offset + 2)?,
            discovered_link: row.get(offset + 3)?,
            title: row.get(offset + 4)?,
            snippet: row.get(offset + 5)?,
            discovered_at: row.get(offset + 6)?,
        })
    }

    fn into_finding(self) -> Result<Finding, StoreError> {
        Ok(Finding {
            id: self.id,
            search_term: self.search_term,
            source_id: self.source_id,
            discovered_link: self.discovered_link,
            title: self.title,
            snippet: self.snippet,
            discovered_at: parse_timestamp(&self.discovered_at)?,
        })
    }
}

const VALIDATION_COLUMNS: &str =
    "v.id, v.finding_id, v.is_valid, v.score, v.method, v.rationale_json, v.validated_at";

struct ValidationRow {
    id: i64,
    finding_id: FindingId,
    is_valid: bool,
    score: u32,
    method: String,
    rationale_json: String,
    validated_at: String,
}

impl ValidationRow {
    /// Reads the seven validation columns starting at `offset`; None when the
    /// LEFT JOIN found no validation
    fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Option<Self>> {
        let id: Option<i64> = row.get(offset)?;
        let Some(id) = id else {
            return Ok(None);
        };
        Ok(Some(Self {
            id,
            finding_id: row.get(offset + 1)?,
            is_valid: row.get(offset + 2)?,
            score: row.get(offset + 3)?,
            method: row.get(offset + 4)?,
            rationale_json: row.get(offset + 5)?,
            validated_at: row.get(offset + 6)?,
        }))
    }

    fn into_validation(self) -> Result<Validation, StoreError> {
        let rationale: Vec<String> = serde_json::from_str(&self.rationale_json)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Validation {
            id: self.id,
            finding_id: self.finding_id,
            verdict: Verdict {
                is_valid: self.is_valid,
                score: self.score,
                method: parse_enum::<ValidationMethod>(&self.method)?,
                rationale,
            },
            validated_at: parse_timestamp(&self.validated_at)?,
        })
    }
}

impl Store for SqliteStore {
    fn record_finding(&self, draft: &FindingDraft) -> Result<RecordedFinding, StoreError> {
        let conn = self.conn.lock();

        if let Some(source_id) = draft.source_id {
            if !Self::source_exists(&conn, source_id)? {
                return Err(StoreError::SourceNotFound(source_id));
            }
        }

        let inserted = conn
            .execute(
                "INSERT INTO findings (search_term, discovered_link, title, snippet, source_id, discovered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (search_term, discovered_link) DO NOTHING",
                params![
                    draft.search_term,
                    draft.discovered_link,
                    draft.title,
                    draft.snippet,
                    draft.source_id,
                    format_timestamp(&Utc::now()),
                ],
            )
            .map_err(db_err)?;

        let id: FindingId = conn
            .query_row(
                "SELECT id FROM findings WHERE search_term = ?1 AND discovered_link = ?2",
                params![draft.search_term, draft.discovered_link],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        debug!(
            "Finding {} for '{}' -> {} ({})",
            id,
            draft.search_term,
            draft.discovered_link,
            if inserted > 0 { "new" } else { "existing" }
        );

        Ok(RecordedFinding {
            id,
            created: inserted > 0,
        })
    }

    fn record_validation(
        &self,
        finding_id: FindingId,
        verdict: &Verdict,
    ) -> Result<Validation, StoreError> {
        let conn = self.conn.lock();

        if !Self::finding_exists(&conn, finding_id)? {
            return Err(StoreError::FindingNotFound(finding_id));
        }

        let rationale_json = serde_json::to_string(&verdict.rationale)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let validated_at = Utc::now();

        conn.execute(
            "INSERT INTO validations (finding_id, is_valid, score, method, rationale_json, validated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                finding_id,
                verdict.is_valid,
                verdict.score,
                verdict.method.as_str(),
                rationale_json,
                format_timestamp(&validated_at),
            ],
        )
        .map_err(db_err)?;

        Ok(Validation {
            id: conn.last_insert_rowid(),
            finding_id,
            verdict: verdict.clone(),
            validated_at,
        })
    }

    fn get_finding(&self, id: FindingId) -> Result<Finding, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT {} FROM findings f WHERE f.id = ?1", FINDING_COLUMNS),
                params![id],
                |row| FindingRow::from_row(row, 0),
            )
            .optional()
            .map_err(db_err)?;

        row.ok_or(StoreError::FindingNotFound(id))?.into_finding()
    }

    fn latest_validation(&self, finding_id: FindingId) -> Result<Option<Validation>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM validations v WHERE v.finding_id = ?1 ORDER BY v.id DESC LIMIT 1",
                    VALIDATION_COLUMNS
                ),
                params![finding_id],
                |row| ValidationRow::from_row(row, 0),
            )
            .optional()
            .map_err(db_err)?
            .flatten();

        row.map(ValidationRow::into_validation).transpose()
    }

    fn list_findings(
        &self,
        filter: &FindingFilter,
    ) -> Result<Vec<FindingWithValidation>, StoreError> {
        let sql = format!(
            "SELECT {}, s.name, {}
             FROM findings f
             LEFT JOIN sources s ON s.id = f.source_id
             {}
             WHERE (?1 IS NULL OR instr(lower(f.search_term), lower(?1)) > 0)
               AND (?2 = 0 OR v.is_valid = 1)
               AND (?3 IS NULL OR f.discovered_at >= ?3)
               AND (?4 IS NULL OR f.discovered_at <= ?4)
               AND (?5 IS NULL OR f.source_id = ?5)
             ORDER BY f.id DESC
             LIMIT ?6",
            FINDING_COLUMNS, VALIDATION_COLUMNS, LATEST_VALIDATION_JOIN
        );
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let since = filter.since.as_ref().map(format_timestamp);
        let until = filter.until.as_ref().map(format_timestamp);

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![filter.term, filter.only_valid, since, until, filter.source_id, limit],
                |row| {
                    Ok((
                        FindingRow::from_row(row, 0)?,
                        row.get::<_, Option<String>>(7)?,
                        ValidationRow::from_row(row, 8)?,
                    ))
                },
            )
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        rows.into_iter()
            .map(|(finding, source_name, validation)| {
                Ok(FindingWithValidation {
                    finding: finding.into_finding()?,
                    source_name,
                    validation: validation.map(ValidationRow::into_validation).transpose()?,
                })
            })
            .collect()
    }

    fn validation_stats(&self) -> Result<ValidationStats, StoreError> {
        let conn = self.conn.lock();

        let count_where = |condition: &str| -> Result<u64, StoreError> {
            conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM findings f {} WHERE {}",
                    LATEST_VALIDATION_JOIN, condition
                ),
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
            .map_err(db_err)
        };

        let valid = count_where("v.is_valid = 1")?;
        let not_valid = count_where("v.is_valid = 0")?;
        let unvalidated = count_where("v.id IS NULL")?;

        let average: Option<f64> = conn
            .query_row(
                &format!(
                    "SELECT AVG(v.score) FROM findings f {} WHERE v.is_valid = 1",
                    LATEST_VALIDATION_JOIN
                ),
                [],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT v.method, COUNT(*) AS n FROM findings f {}
                 WHERE v.is_valid = 1 GROUP BY v.method ORDER BY n DESC, v.method",
                LATEST_VALIDATION_JOIN
            ))
            .map_err(db_err)?;
        let methods = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        let by_method = methods
            .into_iter()
            .map(|(method, n)| Ok((parse_enum::<ValidationMethod>(&method)?, n as u64)))
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(ValidationStats {
            valid,
            not_valid,
            unvalidated,
            average_valid_score: average.map(|avg| avg.round() as u32).unwrap_or(0),
            by_method,
        })
    }

    fn add_source(&self, source: &NewSource) -> Result<SourceId, StoreError> {
        Self::insert_source(&self.conn.lock(), source)
    }

    fn get_source(&self, id: SourceId) -> Result<Source, StoreError> {
        self.query_sources(
            &format!("SELECT {} FROM sources WHERE id = ?1", SOURCE_COLUMNS),
            params![id],
        )?
        .into_iter()
        .next()
        .ok_or(StoreError::SourceNotFound(id))
    }

    fn list_sources(&self, active_only: bool) -> Result<Vec<Source>, StoreError> {
        self.query_sources(
            &format!(
                "SELECT {} FROM sources WHERE (?1 = 0 OR active = 1) ORDER BY name, id",
                SOURCE_COLUMNS
            ),
            params![active_only],
        )
    }

    fn set_source_active(&self, id: SourceId, active: bool) -> Result<(), StoreError> {
        let changed = self
            .conn
            .lock()
            .execute(
                "UPDATE sources SET active = ?1 WHERE id = ?2",
                params![active, id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(StoreError::SourceNotFound(id));
        }
        Ok(())
    }

    fn update_source_health(
        &self,
        id: SourceId,
        status: HealthStatus,
        details: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let now = format_timestamp(&Utc::now());

        let changed = tx
            .execute(
                "UPDATE sources SET health = ?1, last_checked = ?2 WHERE id = ?3",
                params![status.as_str(), now, id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(StoreError::SourceNotFound(id));
        }

        tx.execute(
            "INSERT INTO source_status_history (source_id, status, details, checked_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, status.as_str(), details, now],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)
    }

    fn status_history(&self, id: SourceId, limit: usize) -> Result<Vec<StatusRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT source_id, status, details, checked_at FROM source_status_history
                 WHERE source_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![id, limit as i64], |row| {
                Ok((
                    row.get::<_, SourceId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        rows.into_iter()
            .map(|(source_id, status, details, checked_at)| {
                Ok(StatusRecord {
                    source_id,
                    status: parse_enum::<HealthStatus>(&status)?,
                    details,
                    checked_at: parse_timestamp(&checked_at)?,
                })
            })
            .collect()
    }
}

impl AuditSink for SqliteStore {
    fn record_event(&self, event: AuditEvent) {
        debug!("Audit: {} - {}", event.action, event.description);

        let data_json = event.data.as_ref().map(|data| data.to_string());
        let result = self.conn.lock().execute(
            "INSERT INTO audit_events (action, description, data_json, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                event.action,
                event.description,
                data_json,
                format_timestamp(&event.timestamp),
            ],
        );

        if let Err(e) = result {
            error!("Failed to record audit event {}: {}", event.action, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use onion_core::AuditPeriod;

    fn store_with_source() -> (SqliteStore, SourceId) {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .add_source(&NewSource::new("Ahmia", "https://ahmia.fi/", SourceCategory::Surface))
            .unwrap();
        (store, id)
    }

    fn draft(term: &str, link: &str, source_id: Option<SourceId>) -> FindingDraft {
        FindingDraft {
            search_term: term.to_string(),
            discovered_link: link.to_string(),
            title: "Leaked database".to_string(),
            snippet: "users and passwords".to_string(),
            source_id,
        }
    }

    #[test]
    fn test_schema_version() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_record_finding_dedup() {
        let (store, source_id) = store_with_source();
        let first = store
            .record_finding(&draft("acme", "http://acme.onion/", Some(source_id)))
            .unwrap();
        let second = store
            .record_finding(&draft("acme", "http://acme.onion/", Some(source_id)))
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        assert_eq!(store.list_findings(&FindingFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_dedup_key_is_case_sensitive() {
        let (store, source_id) = store_with_source();
        let a = store
            .record_finding(&draft("acme", "http://acme.onion/", Some(source_id)))
            .unwrap();
        let b = store
            .record_finding(&draft("ACME", "http://acme.onion/", Some(source_id)))
            .unwrap();
        let c = store
            .record_finding(&draft("acme", "http://ACME.onion/", Some(source_id)))
            .unwrap();

        assert!(b.created && c.created);
        assert_ne!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_record_finding_unknown_source() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .record_finding(&draft("acme", "http://acme.onion/", Some(42)))
            .unwrap_err();
        assert!(matches!(err, StoreError::SourceNotFound(42)));

        // findings without a source are allowed
        assert!(store
            .record_finding(&draft("acme", "http://acme.onion/", None))
            .is_ok());
    }

    #[test]
    fn test_latest_validation_wins() {
        let (store, source_id) = store_with_source();
        let finding = store
            .record_finding(&draft("acme", "http://acme.onion/", Some(source_id)))
            .unwrap();

        store
            .record_validation(finding.id, &Verdict::automatic(20, vec![".onion link (+20)".into()]))
            .unwrap();
        store
            .record_validation(
                finding.id,
                &Verdict::confirmed(ValidationMethod::Manual, 100, "Confirmed manually by operator"),
            )
            .unwrap();

        let latest = store.latest_validation(finding.id).unwrap().unwrap();
        assert_eq!(latest.verdict.method, ValidationMethod::Manual);
        assert_eq!(latest.verdict.score, 100);

        let listed = store.list_findings(&FindingFilter::default()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].source_name.as_deref(), Some("Ahmia"));
        assert_eq!(
            listed[0].validation.as_ref().map(|v| v.verdict.method),
            Some(ValidationMethod::Manual)
        );
    }

    #[test]
    fn test_record_validation_unknown_finding() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .record_validation(7, &Verdict::automatic(0, vec![]))
            .unwrap_err();
        assert!(matches!(err, StoreError::FindingNotFound(7)));
    }

    #[test]
    fn test_list_findings_filters() {
        let (store, source_id) = store_with_source();
        let valid = store
            .record_finding(&draft("acme corp", "http://a.onion/", Some(source_id)))
            .unwrap();
        let invalid = store
            .record_finding(&draft("acme corp", "http://b.onion/", Some(source_id)))
            .unwrap();
        store
            .record_finding(&draft("other", "http://c.onion/", Some(source_id)))
            .unwrap();

        store
            .record_validation(valid.id, &Verdict::automatic(55, vec![]))
            .unwrap();
        store
            .record_validation(invalid.id, &Verdict::automatic(10, vec![]))
            .unwrap();

        let by_term = store
            .list_findings(&FindingFilter {
                term: Some("acme".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_term.len(), 2);

        let only_valid = store
            .list_findings(&FindingFilter {
                only_valid: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(only_valid.len(), 1);
        assert_eq!(only_valid[0].finding.id, valid.id);

        let limited = store
            .list_findings(&FindingFilter {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_term_filter_wildcards_are_literal() {
        let (store, source_id) = store_with_source();
        let stored = [
            ("acme", "http://a.onion/"),
            ("initech", "http://b.onion/"),
            ("globex", "http://c.onion/"),
            ("50% off_sale", "http://d.onion/"),
        ];
        for (term, link) in stored {
            store.record_finding(&draft(term, link, Some(source_id))).unwrap();
        }

        let count = |term: &str| {
            store
                .list_findings(&FindingFilter {
                    term: Some(term.to_string()),
                    ..Default::default()
                })
                .unwrap()
                .len()
        };
        assert_eq!(count("%"), 1);
        assert_eq!(count("_"), 1);
        assert_eq!(count("a_e"), 0);
        assert_eq!(count("ACME"), 1);
    }

    #[test]
    fn test_list_findings_by_date_and_source() {
        let (store, ahmia) = store_with_source();
        let torch = store
            .add_source(&NewSource::new("Torch", "http://torch.onion/", SourceCategory::Surface))
            .unwrap();
        store
            .record_finding(&draft("acme", "http://a.onion/", Some(ahmia)))
            .unwrap();
        let from_torch = store
            .record_finding(&draft("acme", "http://b.onion/", Some(torch)))
            .unwrap();

        let now = Utc::now();
        let hour = Duration::hours(1);
        let list = |filter: FindingFilter| store.list_findings(&filter).unwrap();

        let recent = list(FindingFilter {
            since: Some(now - hour),
            until: Some(now + hour),
            ..Default::default()
        });
        assert_eq!(recent.len(), 2);

        assert!(list(FindingFilter {
            since: Some(now + hour),
            ..Default::default()
        })
        .is_empty());
        assert!(list(FindingFilter {
            until: Some(now - hour),
            ..Default::default()
        })
        .is_empty());

        let by_source = list(FindingFilter {
            source_id: Some(torch),
            ..Default::default()
        });
        assert_eq!(by_source.len(), 1);
        assert_eq!(by_source[0].finding.id, from_torch.id);
        assert_eq!(by_source[0].source_name.as_deref(), Some("Torch"));
    }

    #[test]
    fn test_validation_stats() {
        let (store, source_id) = store_with_source();
        let ids: Vec<_> = ["http://a.onion/", "http://b.onion/", "http://c.onion/", "http://d.onion/"]
            .iter()
            .map(|link| store.record_finding(&draft("acme", link, Some(source_id))).unwrap().id)
            .collect();

        store.record_validation(ids[0], &Verdict::automatic(45, vec![])).unwrap();
        store
            .record_validation(
                ids[1],
                &Verdict::confirmed(ValidationMethod::Semantic, 100, "Term found in page context"),
            )
            .unwrap();
        store.record_validation(ids[2], &Verdict::automatic(10, vec![])).unwrap();

        let stats = store.validation_stats().unwrap();
        assert_eq!(stats.valid, 2);
        assert_eq!(stats.not_valid, 1);
        assert_eq!(stats.unvalidated, 1);
        assert_eq!(stats.average_valid_score, 73);
        assert_eq!(stats.by_method.len(), 2);
    }

    #[test]
    fn test_source_health_and_history() {
        let (store, source_id) = store_with_source();
        store
            .update_source_health(source_id, HealthStatus::Inactive, "Status code: 503")
            .unwrap();
        store
            .update_source_health(source_id, HealthStatus::Active, "Status code: 200")
            .unwrap();

        let source = store.get_source(source_id).unwrap();
        assert_eq!(source.health, HealthStatus::Active);
        assert!(source.last_checked.is_some());

        let history = store.status_history(source_id, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, HealthStatus::Active);
        assert_eq!(history[1].details, "Status code: 503");

        assert!(matches!(
            store.update_source_health(99, HealthStatus::Error, "x"),
            Err(StoreError::SourceNotFound(99))
        ));
    }

    #[test]
    fn test_sources_ordering_and_activation() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.seed_default_sources().unwrap(), 6);
        assert_eq!(store.seed_default_sources().unwrap(), 0);

        let names: Vec<_> = store
            .list_sources(false)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);

        let first = store.list_sources(true).unwrap()[0].id;
        store.set_source_active(first, false).unwrap();
        assert_eq!(store.list_sources(true).unwrap().len(), 5);
        assert_eq!(store.list_sources(false).unwrap().len(), 6);
    }

    #[test]
    fn test_audit_events_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.record_event(AuditEvent::new("search_started", "Search started for acme"));
        store.record_event(
            AuditEvent::new("search_completed", "Search completed for acme")
                .with_data(serde_json::json!({ "results": 3 })),
        );

        let events = store.audit_events(None, None, 10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, "search_completed");
        assert_eq!(events[0].data, Some(serde_json::json!({ "results": 3 })));
        assert_eq!(events[1].data, None);
    }

    fn event_at(action: &str, timestamp: DateTime<Utc>) -> AuditEvent {
        AuditEvent {
            timestamp,
            ..AuditEvent::new(action, format!("{} event", action))
        }
    }

    #[test]
    fn test_audit_events_time_window() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        store.record_event(event_at("search_started", now - Duration::days(10)));
        store.record_event(event_at("search_completed", now - Duration::days(2)));
        store.record_event(event_at("source_check", now));

        let recent = store
            .audit_events(Some(now - Duration::days(3)), None, 10)
            .unwrap();
        let actions: Vec<_> = recent.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["source_check", "search_completed"]);

        let older = store
            .audit_events(None, Some(now - Duration::days(1)), 10)
            .unwrap();
        assert_eq!(older.len(), 2);
        assert_eq!(older[1].action, "search_started");
    }

    #[test]
    fn test_audit_report_by_period() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        store.record_event(event_at("search_started", now - Duration::days(10)));
        store.record_event(event_at("search_started", now));
        for _ in 0..3 {
            store.record_event(event_at("source_searched", now));
        }
        store.record_event(event_at("search_completed", now));

        let total = store.audit_report(AuditPeriod::Total.since(now)).unwrap();
        assert_eq!(total.total, 6);
        assert_eq!(
            total.by_action,
            vec![
                ("source_searched".to_string(), 3),
                ("search_started".to_string(), 2),
                ("search_completed".to_string(), 1),
            ]
        );

        let week = store.audit_report(AuditPeriod::Week.since(now)).unwrap();
        assert_eq!(week.total, 5);
        assert_eq!(
            week.by_action,
            vec![
                ("source_searched".to_string(), 3),
                ("search_completed".to_string(), 1),
                ("search_started".to_string(), 1),
            ]
        );

        let empty = store.audit_report(Some(now + Duration::days(1))).unwrap();
        assert_eq!(empty, AuditReport::default());
    }

    #[test]
    fn test_concurrent_seeding_inserts_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.db");
        SqliteStore::open(&path).unwrap();

        let inserted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let path = path.clone();
                    scope.spawn(move || {
                        SqliteStore::open(&path)
                            .unwrap()
                            .seed_default_sources()
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(inserted, 6);
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list_sources(false).unwrap().len(), 6);
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.seed_default_sources().unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.list_sources(false).unwrap().len(), 6);
        assert_eq!(reopened.seed_default_sources().unwrap(), 0);
    }
}
