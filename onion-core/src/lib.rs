//! Onion Monitor Core - domain model for leak monitoring
//!
//! This crate provides the foundational pieces:
//! - Sources, findings, validations and audit events
//! - The weighted leak-scoring heuristic
//! - Default source registry
//! - Persistence and audit interfaces

pub mod model;
pub mod scoring;
pub mod sources;
pub mod store;

pub use model::*;
pub use scoring::*;
pub use sources::*;
pub use store::*;

/// Minimum score for an automatic verdict to count as a genuine leak
pub const VALIDITY_THRESHOLD: u32 = 40;

/// Score assigned to manual confirmations and semantic-context hits
pub const CONFIRMED_SCORE: u32 = 100;
