//! Monitor configuration
//!
//! Loaded from an optional TOML file; every section has defaults so a partial
//! file (or none at all) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use onion_tor::{FetchConfig, Transport};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub database: DatabaseConfig,
    pub transport: Transport,
    pub timeouts: Timeouts,
    /// Pause after each source during a search
    pub source_delay_ms: u64,
    pub surface: SelectorScheme,
    pub link_list: LinkListConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            transport: Transport::Direct,
            timeouts: Timeouts::default(),
            source_delay_ms: 1000,
            surface: SelectorScheme::default(),
            link_list: LinkListConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig::default().with_transport(self.transport.clone())
    }

    pub fn source_delay(&self) -> Duration {
        Duration::from_millis(self.source_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("onion_monitor.db"),
        }
    }
}

/// Per-caller request timeouts, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub status_secs: u64,
    pub search_secs: u64,
    pub context_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            status_secs: 10,
            search_secs: 10,
            context_secs: 25,
        }
    }
}

impl Timeouts {
    pub fn status(&self) -> Duration {
        Duration::from_secs(self.status_secs)
    }

    pub fn search(&self) -> Duration {
        Duration::from_secs(self.search_secs)
    }

    pub fn context(&self) -> Duration {
        Duration::from_secs(self.context_secs)
    }
}

/// CSS selectors for surface search result pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorScheme {
    pub result: String,
    pub title: String,
    pub link: String,
    pub description: String,
}

impl Default for SelectorScheme {
    fn default() -> Self {
        Self {
            result: ".result".to_string(),
            title: "h4".to_string(),
            link: "a".to_string(),
            description: ".description".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkListConfig {
    pub max_results: usize,
    pub snippet_chars: usize,
}

impl Default for LinkListConfig {
    fn default() -> Self {
        Self {
            max_results: 20,
            snippet_chars: 300,
        }
    }
}
