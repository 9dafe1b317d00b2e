//! Test doubles shared by the pipeline tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use onion_core::{NewSource, SourceCategory, SourceId, Store};
use onion_store::SqliteStore;
use onion_tor::{Fetch, FetchError, FetchResponse};

/// Fetcher answering from a fixed URL -> response map; unknown URLs fail
#[derive(Default)]
pub struct StaticFetcher {
    routes: HashMap<String, Result<FetchResponse, FetchError>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, status: u16, body: &str) -> Self {
        self.routes
            .insert(url.to_string(), Ok(FetchResponse::new(status, body)));
        self
    }

    pub fn failing(mut self, url: &str, error: FetchError) -> Self {
        self.routes.insert(url.to_string(), Err(error));
        self
    }
}

#[async_trait]
impl Fetch for StaticFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<FetchResponse, FetchError> {
        self.routes
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::Network(format!("no route to {}", url))))
    }
}

pub fn memory_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().unwrap())
}

pub fn add_source(
    store: &SqliteStore,
    name: &str,
    base_url: &str,
    category: SourceCategory,
) -> SourceId {
    store
        .add_source(&NewSource::new(name, base_url, category))
        .unwrap()
}

pub fn audit_actions(store: &SqliteStore) -> Vec<String> {
    let mut actions: Vec<_> = store
        .audit_events(None, None, 1000)
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    actions.reverse();
    actions
}
