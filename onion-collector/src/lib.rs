//! Onion Monitor Collector
//!
//! The collection-and-validation pipeline:
//! - **Extractors**: turn a source's search page into candidate findings
//! - **Validator**: weighted leak scoring with an audit trail
//! - **Status checker**: source health probes and history
//! - **Semantic validator**: literal term-in-page checks
//! - **Collector**: per-term, per-source orchestration and batch search

pub mod collector;
pub mod config;
pub mod error;
pub mod extract;
pub mod semantic;
pub mod status;
pub mod validator;

#[cfg(test)]
mod testing;

pub use collector::*;
pub use config::*;
pub use error::*;
pub use extract::*;
pub use semantic::*;
pub use status::*;
pub use validator::*;
