//! Surface search engine extraction
//!
//! Result pages are split into blocks by the configured selector scheme. Each
//! block yields a link, a title and a description.

use async_trait::async_trait;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use onion_core::{RawFinding, Source};
use onion_tor::{normalize_whitespace, Fetch};

use crate::{CollectorError, Extractor, SelectorScheme};

/// Extractor for search engines returning structured result blocks
pub struct SurfaceExtractor {
    fetcher: Arc<dyn Fetch>,
    selectors: SelectorScheme,
    timeout: Duration,
}

impl SurfaceExtractor {
    pub fn new(fetcher: Arc<dyn Fetch>, selectors: SelectorScheme, timeout: Duration) -> Self {
        Self {
            fetcher,
            selectors,
            timeout,
        }
    }
}

#[async_trait]
impl Extractor for SurfaceExtractor {
    async fn extract(&self, source: &Source, term: &str) -> Result<Vec<RawFinding>, CollectorError> {
        let url = source.build_search_url(term);
        debug!("Searching {} at {}", source.name, url);

        let response = match self.fetcher.fetch(&url, self.timeout).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Search on {} failed: {}", source.name, e);
                return Ok(Vec::new());
            }
        };

        if !response.is_ok() {
            warn!("Search on {} returned status: {}", source.name, response.status);
            return Ok(Vec::new());
        }

        let results = parse_surface_results(&response.body, &url, &self.selectors)?;
        debug!("{} returned {} results", source.name, results.len());
        Ok(results)
    }
}

fn selector(css: &str) -> Result<Selector, CollectorError> {
    Selector::parse(css).map_err(|e| CollectorError::Parse(format!("bad selector {}: {}", css, e)))
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

/// Parse result blocks from a search page. Blocks without a link are skipped,
/// as are blocks whose link cannot be resolved.
pub fn parse_surface_results(
    html: &str,
    page_url: &str,
    scheme: &SelectorScheme,
) -> Result<Vec<RawFinding>, CollectorError> {
    let base = Url::parse(page_url)
        .map_err(|e| CollectorError::Parse(format!("bad page url {}: {}", page_url, e)))?;
    let block_selector = selector(&scheme.result)?;
    let title_selector = selector(&scheme.title)?;
    let link_selector = selector(&scheme.link)?;
    let description_selector = selector(&scheme.description)?;

    let document = Html::parse_document(html);
    let mut results = Vec::new();

    for block in document.select(&block_selector) {
        let title = block.select(&title_selector).next().map(element_text);
        let anchor = block
            .select(&link_selector)
            .find(|a| a.value().attr("href").is_some());

        let Some(anchor) = anchor else {
            debug!("Skipping result block without link");
            continue;
        };

        let href = anchor.value().attr("href").unwrap_or_default();
        let link = match resolve_link(&base, href) {
            Ok(link) => link,
            Err(e) => {
                warn!("Skipping result block: {}", e);
                continue;
            }
        };

        let title = title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| element_text(anchor));
        let snippet = block
            .select(&description_selector)
            .next()
            .map(element_text)
            .unwrap_or_default();

        results.push(RawFinding {
            link,
            title,
            snippet,
        });
    }

    Ok(results)
}

/// Resolve an href against the page, unwrapping engine redirect links
fn resolve_link(base: &Url, href: &str) -> Result<String, CollectorError> {
    let url = base
        .join(href.trim())
        .map_err(|e| CollectorError::Parse(format!("bad link {}: {}", href, e)))?;

    let target = url
        .query_pairs()
        .find(|(key, _)| key == "redirect_url")
        .map(|(_, value)| value.into_owned());

    Ok(target.unwrap_or_else(|| url.to_string()))
}
