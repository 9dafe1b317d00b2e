//! Link directory extraction
//!
//! Directory pages list .onion services as anchors with a short blurb around
//! them. An anchor is a candidate when the term shows up in its text, its
//! href or the text of its parent element.

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, warn};

use onion_core::{RawFinding, Source};
use onion_tor::{normalize_whitespace, truncate_chars, Fetch};

use crate::{CollectorError, Extractor, LinkListConfig};

static ONION_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://[a-z0-9.-]+\.onion(?:[:/?#]|$)").unwrap()
});

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Extractor for directory pages listing .onion links
pub struct LinkListExtractor {
    fetcher: Arc<dyn Fetch>,
    config: LinkListConfig,
    timeout: Duration,
}

impl LinkListExtractor {
    pub fn new(fetcher: Arc<dyn Fetch>, config: LinkListConfig, timeout: Duration) -> Self {
        Self {
            fetcher,
            config,
            timeout,
        }
    }
}

#[async_trait]
impl Extractor for LinkListExtractor {
    async fn extract(&self, source: &Source, term: &str) -> Result<Vec<RawFinding>, CollectorError> {
        let url = source.build_search_url(term);
        debug!("Scanning {} at {}", source.name, url);

        let response = match self.fetcher.fetch(&url, self.timeout).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Directory {} unreachable: {}", source.name, e);
                return Ok(Vec::new());
            }
        };

        if !response.is_ok() {
            warn!("Directory {} returned status: {}", source.name, response.status);
            return Ok(Vec::new());
        }

        let results = parse_link_list(&response.body, term, &self.config);
        debug!("{} listed {} matching links", source.name, results.len());
        Ok(results)
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

/// Matching .onion anchors in page order, deduplicated by href
pub fn parse_link_list(html: &str, term: &str, config: &LinkListConfig) -> Vec<RawFinding> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut results = Vec::new();

    for anchor in document.select(&ANCHOR_SELECTOR) {
        if results.len() >= config.max_results {
            break;
        }

        let href = anchor.value().attr("href").unwrap_or_default().trim();
        if !ONION_HREF.is_match(href) || seen.contains(href) {
            continue;
        }

        let text = element_text(anchor);
        let context = anchor
            .parent()
            .and_then(ElementRef::wrap)
            .map(element_text)
            .unwrap_or_default();

        let matches = [text.as_str(), href, context.as_str()]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle));
        if !matches {
            continue;
        }

        seen.insert(href.to_string());
        results.push(RawFinding {
            link: href.to_string(),
            title: if text.is_empty() { href.to_string() } else { text },
            snippet: truncate_chars(&context, config.snippet_chars),
        });
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticFetcher;
    use onion_core::{HealthStatus, SourceCategory};

    const DIRECTORY: &str = r#"
        <html><body>
          <ul>
            <li><a href="http://acmeleaks7q.onion/">Mirror</a> ACME customer data</li>
            <li><a href="http://market5xz.onion/">Market</a> general goods</li>
            <li><a href="http://dumps4abc.onion/acme/">Dumps</a> misc</li>
            <li><a href="https://example.com/acme">ACME clearnet</a></li>
            <li><a href="/about">About ACME</a></li>
            <li><a href="http://acmeleaks7q.onion/">ACME again</a></li>
            <li><a href="http://fresh9def.onion">ACME Portal</a></li>
          </ul>
        </body></html>
    "#;

    #[test]
    fn test_parse_link_list() {
        let results = parse_link_list(DIRECTORY, "acme", &LinkListConfig::default());
        let links: Vec<_> = results.iter().map(|r| r.link.as_str()).collect();

        assert_eq!(
            links,
            vec![
                "http://acmeleaks7q.onion/",
                "http://dumps4abc.onion/acme/",
                "http://fresh9def.onion",
            ]
        );
        assert_eq!(results[0].title, "Mirror");
        assert_eq!(results[0].snippet, "Mirror ACME customer data");
        assert_eq!(results[2].title, "ACME Portal");
    }

    #[test]
    fn test_link_list_bounds() {
        let config = LinkListConfig {
            max_results: 1,
            snippet_chars: 6,
        };
        let results = parse_link_list(DIRECTORY, "ACME", &config);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].snippet, "Mirror...");
    }

    #[test]
    fn test_link_list_never_fabricates() {
        assert!(parse_link_list(DIRECTORY, "initech", &LinkListConfig::default()).is_empty());
        assert!(parse_link_list("<html></html>", "acme", &LinkListConfig::default()).is_empty());
        assert!(parse_link_list(DIRECTORY, " ", &LinkListConfig::default()).is_empty());
    }

    #[tokio::test]
    async fn test_extract_uses_base_url_without_template() {
        let source = Source {
            id: 3,
            name: "Dark.fail".to_string(),
            base_url: "https://dark.fail/".to_string(),
            search_url: None,
            category: SourceCategory::LinkList,
            active: true,
            health: HealthStatus::Active,
            last_checked: None,
        };
        let fetcher = StaticFetcher::new().page("https://dark.fail/", 200, DIRECTORY);
        let extractor = LinkListExtractor::new(
            Arc::new(fetcher),
            LinkListConfig::default(),
            Duration::from_secs(10),
        );

        assert_eq!(extractor.extract(&source, "acme").await.unwrap().len(), 3);
    }
}
