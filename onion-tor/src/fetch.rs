//! Page fetching
//!
//! `Fetch` is the only way the pipeline touches the network. Failures come back
//! as `FetchError` values; nothing past this boundary sees a transport error.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::{create_client, random_user_agent, FetchConfig, Transport, TransportError};

/// Status code and body of a completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Only an exact 200 counts as success
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Network,
    Timeout,
}

/// A request that never produced a response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Network(_) => FetchErrorKind::Network,
            Self::Timeout(_) => FetchErrorKind::Timeout,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::Network(detail) | Self::Timeout(detail) => detail,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Fetch capability handed to every component that needs the network
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError>;
}

/// reqwest-backed fetcher over the configured transport
pub struct HttpFetcher {
    client: Client,
    transport: Transport,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, TransportError> {
        Ok(Self {
            client: create_client(config)?,
            transport: config.transport.clone(),
        })
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError> {
        debug!("Fetching {} ({})", url, self.transport.describe());

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .header(USER_AGENT, random_user_agent())
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.7,pt-BR;q=0.5")
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        debug!("{} returned {} ({} bytes)", url, status, body.len());
        Ok(FetchResponse { status, body })
    }
}

/// Page that reports whether the caller arrived through Tor
pub const TOR_CHECK_URL: &str = "https://check.torproject.org/";

const TOR_CHECK_MARKER: &str = "Congratulations. This browser is configured to use Tor";

/// Result of probing the Tor check page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorStatus {
    /// Reached the check page through Tor
    Routed,
    /// Reached the check page, but not through Tor
    NotRouted,
    Unreachable(String),
}

/// Check whether requests made by `fetcher` leave through Tor
pub async fn check_tor_connection(fetcher: &dyn Fetch) -> TorStatus {
    match fetcher.fetch(TOR_CHECK_URL, Duration::from_secs(10)).await {
        Ok(response) if response.body.contains(TOR_CHECK_MARKER) => TorStatus::Routed,
        Ok(_) => TorStatus::NotRouted,
        Err(e) => TorStatus::Unreachable(e.to_string()),
    }
}
