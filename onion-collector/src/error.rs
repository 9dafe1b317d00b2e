//! Collection pipeline errors

use onion_core::{SourceCategory, StoreError};
use onion_tor::FetchError;
use thiserror::Error;

/// Errors from collection operations
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Search term must not be empty")]
    EmptyTerm,

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("No extractor registered for category {0}")]
    UnknownCategory(SourceCategory),
}
