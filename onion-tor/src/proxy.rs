//! Transport configuration and HTTP client construction
//!
//! Requests either go out directly or through a SOCKS5h proxy (Tor), in which
//! case DNS resolution also happens on the proxy side so .onion names resolve.

use reqwest::{Client, Proxy};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default Tor SOCKS endpoint
pub const DEFAULT_TOR_PROXY: &str = "socks5h://127.0.0.1:9050";

/// How outbound requests reach the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transport {
    #[default]
    Direct,
    /// Route through a SOCKS proxy such as a local Tor daemon
    Socks { proxy: String },
}

impl Transport {
    pub fn tor() -> Self {
        Self::Socks {
            proxy: DEFAULT_TOR_PROXY.to_string(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Direct => "direct".to_string(),
            Self::Socks { proxy } => format!("socks via {}", proxy),
        }
    }
}

/// Fetcher configuration
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub transport: Transport,
    /// Connect timeout; per-request timeouts are chosen by callers
    pub connect_timeout: Duration,
    /// Accept self-signed certificates (common on .onion services)
    pub accept_invalid_certs: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            transport: Transport::Direct,
            connect_timeout: Duration::from_secs(10),
            accept_invalid_certs: true,
        }
    }
}

impl FetchConfig {
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }
}

/// Errors building the HTTP client
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Invalid proxy address {0}: {1}")]
    InvalidProxy(String, String),
}

/// User agents for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0",
];

/// Get a random user agent
pub fn random_user_agent() -> &'static str {
    use rand::Rng;
    let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[idx]
}

/// Create an HTTP client for the configured transport
pub fn create_client(config: &FetchConfig) -> Result<Client, TransportError> {
    let mut builder = Client::builder()
        .connect_timeout(config.connect_timeout)
        .danger_accept_invalid_certs(config.accept_invalid_certs);

    if let Transport::Socks { proxy } = &config.transport {
        let proxy = Proxy::all(proxy)
            .map_err(|e| TransportError::InvalidProxy(proxy.clone(), e.to_string()))?;
        builder = builder.proxy(proxy);
    } else {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|e| TransportError::ClientBuild(e.to_string()))
}
