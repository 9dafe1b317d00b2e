//! Per-category extraction of candidate findings
//!
//! An extractor fetches whatever page its source category needs and turns it
//! into raw candidates. It never persists anything.

mod link_list;
mod surface;

pub use link_list::*;
pub use surface::*;

use async_trait::async_trait;
use onion_core::{RawFinding, Source};

use crate::CollectorError;

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Candidates for `term` from `source`, in page order
    async fn extract(&self, source: &Source, term: &str) -> Result<Vec<RawFinding>, CollectorError>;
}
