//! Default source registry
//!
//! Seeded into an empty store so a fresh installation has something to search.

use crate::{NewSource, SourceCategory};

/// A built-in source definition
#[derive(Debug, Clone, Copy)]
pub struct DefaultSource {
    pub name: &'static str,
    pub base_url: &'static str,
    /// Search URL template with {query} placeholder
    pub search_url: Option<&'static str>,
    pub category: SourceCategory,
}

impl DefaultSource {
    pub fn to_new_source(&self) -> NewSource {
        let source = NewSource::new(self.name, self.base_url, self.category);
        match self.search_url {
            Some(template) => source.with_search_url(template),
            None => source,
        }
    }
}

pub static DEFAULT_SOURCES: &[DefaultSource] = &[
    DefaultSource {
        name: "Ahmia",
        base_url: "https://ahmia.fi/",
        search_url: Some("https://ahmia.fi/search/?q={query}"),
        category: SourceCategory::Surface,
    },
    DefaultSource {
        name: "Dark.fail",
        base_url: "https://dark.fail/",
        search_url: None,
        category: SourceCategory::LinkList,
    },
    DefaultSource {
        name: "Onion.live",
        base_url: "https://onion.live/",
        search_url: None,
        category: SourceCategory::LinkList,
    },
    DefaultSource {
        name: "Tor.taxi",
        base_url: "https://tor.taxi/",
        search_url: None,
        category: SourceCategory::LinkList,
    },
    DefaultSource {
        name: "Onion.land",
        base_url: "https://onion.land/",
        search_url: Some("https://onionland.io/search?q={query}"),
        category: SourceCategory::LinkList,
    },
    DefaultSource {
        name: "DarkSearch",
        base_url: "https://darksearch.io/",
        search_url: Some("https://darksearch.io/search?query={query}"),
        category: SourceCategory::Surface,
    },
];

/// Default sources as registration requests
pub fn default_sources() -> Vec<NewSource> {
    DEFAULT_SOURCES.iter().map(DefaultSource::to_new_source).collect()
}
