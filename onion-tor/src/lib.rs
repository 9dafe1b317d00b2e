//! Onion Monitor fetching layer
//!
//! Provides the networking used by the collection pipeline:
//! - Transport selection (direct or SOCKS5h through Tor)
//! - A `Fetch` capability with bounded timeouts and rotating client identity
//! - Visible-text extraction and term context windows

pub mod proxy;
pub mod fetch;
pub mod text;

pub use proxy::*;
pub use fetch::*;
pub use text::*;
