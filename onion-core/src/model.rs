//! Records exchanged between the collection pipeline and its collaborators

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::VALIDITY_THRESHOLD;

pub type SourceId = i64;
pub type FindingId = i64;

/// How a source is searched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    /// Search engine returning structured result blocks
    Surface,
    /// Directory page listing .onion links
    LinkList,
}

impl SourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Surface => "surface",
            Self::LinkList => "link_list",
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "surface" => Ok(Self::Surface),
            "link_list" | "link-list" | "lista" => Ok(Self::LinkList),
            other => Err(format!("unknown source category: {}", other)),
        }
    }
}

/// Reachability of a source as of its last status check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Active,
    Inactive,
    Error,
    #[default]
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "error" => Ok(Self::Error),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown health status: {}", other)),
        }
    }
}

/// A monitored origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub base_url: String,
    /// Search URL template with a {query} placeholder
    pub search_url: Option<String>,
    pub category: SourceCategory,
    pub active: bool,
    pub health: HealthStatus,
    pub last_checked: Option<DateTime<Utc>>,
}

impl Source {
    /// Build the URL to fetch when searching this source for `term`
    pub fn build_search_url(&self, term: &str) -> String {
        let encoded = urlencoding::encode(term);
        match &self.search_url {
            Some(template) => template.replace("{query}", &encoded),
            None => match self.category {
                SourceCategory::Surface => {
                    format!("{}/search/?q={}", self.base_url.trim_end_matches('/'), encoded)
                }
                SourceCategory::LinkList => self.base_url.clone(),
            },
        }
    }
}

/// Registration request for a new source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSource {
    pub name: String,
    pub base_url: String,
    pub search_url: Option<String>,
    pub category: SourceCategory,
    pub active: bool,
}

impl NewSource {
    pub fn new(name: &str, base_url: &str, category: SourceCategory) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            search_url: None,
            category,
            active: true,
        }
    }

    pub fn with_search_url(mut self, template: &str) -> Self {
        self.search_url = Some(template.to_string());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// A candidate produced by an extractor, before persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFinding {
    pub link: String,
    pub title: String,
    pub snippet: String,
}

/// Everything needed to record a finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindingDraft {
    pub search_term: String,
    pub discovered_link: String,
    pub title: String,
    pub snippet: String,
    pub source_id: Option<SourceId>,
}

impl FindingDraft {
    pub fn from_raw(term: &str, raw: &RawFinding, source_id: Option<SourceId>) -> Self {
        Self {
            search_term: term.to_string(),
            discovered_link: raw.link.clone(),
            title: raw.title.clone(),
            snippet: raw.snippet.clone(),
            source_id,
        }
    }
}

/// Outcome of recording a finding: (search_term, discovered_link) is unique
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedFinding {
    pub id: FindingId,
    /// False when the pair was already known and the existing id was returned
    pub created: bool,
}

/// A discovered candidate link matching a search term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: FindingId,
    pub search_term: String,
    pub source_id: Option<SourceId>,
    pub discovered_link: String,
    pub title: String,
    pub snippet: String,
    pub discovered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMethod {
    Automatic,
    Manual,
    Semantic,
}

impl ValidationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::Manual => "manual",
            Self::Semantic => "semantic",
        }
    }
}

impl fmt::Display for ValidationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automatic" => Ok(Self::Automatic),
            "manual" => Ok(Self::Manual),
            "semantic" => Ok(Self::Semantic),
            other => Err(format!("unknown validation method: {}", other)),
        }
    }
}

/// Result of validating a finding, not yet attached to a stored record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_valid: bool,
    pub score: u32,
    pub method: ValidationMethod,
    /// Fired signals in evaluation order, each annotated with its points
    pub rationale: Vec<String>,
}

impl Verdict {
    /// Verdict from an automatic score; validity follows the fixed threshold
    pub fn automatic(score: u32, rationale: Vec<String>) -> Self {
        Self {
            is_valid: score >= VALIDITY_THRESHOLD,
            score,
            method: ValidationMethod::Automatic,
            rationale,
        }
    }

    /// Positive verdict that bypasses scoring
    pub fn confirmed(method: ValidationMethod, score: u32, reason: &str) -> Self {
        Self {
            is_valid: true,
            score,
            method,
            rationale: vec![reason.to_string()],
        }
    }

    /// Rationale as a single human-readable line
    pub fn rationale_text(&self) -> String {
        self.rationale.join(", ")
    }
}

/// A stored validation; a finding may have several, the latest wins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub id: i64,
    pub finding_id: FindingId,
    pub verdict: Verdict,
    pub validated_at: DateTime<Utc>,
}

/// A finding joined with its current validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingWithValidation {
    pub finding: Finding,
    pub source_name: Option<String>,
    pub validation: Option<Validation>,
}

/// One row of a source's status history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub source_id: SourceId,
    pub status: HealthStatus,
    pub details: String,
    pub checked_at: DateTime<Utc>,
}

/// Filters for listing stored findings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindingFilter {
    /// Substring of the search term
    pub term: Option<String>,
    pub only_valid: bool,
    /// Discovered at or after
    pub since: Option<DateTime<Utc>>,
    /// Discovered at or before
    pub until: Option<DateTime<Utc>>,
    pub source_id: Option<SourceId>,
    pub limit: Option<usize>,
}

/// Aggregate validation counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub valid: u64,
    pub not_valid: u64,
    pub unvalidated: u64,
    /// Rounded average score over currently valid findings
    pub average_valid_score: u32,
    /// (method, count) over currently valid findings, most frequent first
    pub by_method: Vec<(ValidationMethod, u64)>,
}

/// Append-only record of an action taken by the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: String,
    pub description: String,
    pub data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: &str, description: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            description: description.into(),
            data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Reporting window over the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditPeriod {
    Today,
    Week,
    Month,
    #[default]
    Total,
}

impl AuditPeriod {
    /// Start of the window relative to `now`: midnight UTC of the first day
    /// covered, or None for the whole trail
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let days = match self {
            Self::Today => 0,
            Self::Week => 7,
            Self::Month => 30,
            Self::Total => return None,
        };
        (now - Duration::days(days))
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|start| start.and_utc())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Week => "week",
            Self::Month => "month",
            Self::Total => "total",
        }
    }
}

impl fmt::Display for AuditPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "today" | "hoje" => Ok(Self::Today),
            "week" | "semana" => Ok(Self::Week),
            "month" | "mes" => Ok(Self::Month),
            "total" | "all" => Ok(Self::Total),
            other => Err(format!("unknown audit period: {}", other)),
        }
    }
}

/// Event counts over an audit window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub total: u64,
    /// (action, count), most frequent first
    pub by_action: Vec<(String, u64)>,
}
