//! # Scrape pipeline
//!
//! The cold path: when no cached answer clears the similarity threshold,
//! this module runs a live search, pulls the top result pages, and extracts
//! their primary text.
//!
//! ## Shape of a run
//! 1. One HTML search request against the configured provider endpoint.
//! 2. Result anchors are parsed out; up to `max_results` distinct absolute
//!    `http(s)` URLs are kept, excluding the provider's own domain.
//! 3. Pages are fetched with bounded concurrency, each fetch wrapped in an
//!    explicit timeout. Within one page, fetch-then-extract is strictly
//!    ordered; across pages, everything runs in parallel.
//! 4. Extraction drops non-content subtrees (`script`, `style`, `nav`,
//!    `footer`, `iframe`, `noscript`), prefers `<main>` then `<article>`
//!    over whole-page text, and caps output at [`PAGE_CHAR_BUDGET`] to bound
//!    memory and downstream model cost.
//!
//! Per-URL failures are isolated: a timeout, a non-success status, or an
//! empty extraction logs a warning and skips that URL, never aborting the
//! batch. The pipeline returns a possibly-empty, possibly-partial sequence;
//! the caller decides what emptiness means.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{FetchError, QueryError};

/// Character cap on a single page's extracted text.
pub const PAGE_CHAR_BUDGET: usize = 20_000;

/// Pages fetched in flight at once for one query.
const FETCH_CONCURRENCY: usize = 4;

/// Subtrees never contributing visible content.
const SKIPPED_TAGS: &[&str] = &["script", "style", "nav", "footer", "iframe", "noscript"];

/// Anchor selectors tried against the search results page, most specific
/// first. The first selector yielding any URL wins.
const RESULT_LINK_SELECTORS: &[&str] = &["a.result__a", "a[href^='http']"];

/// One fetched-and-extracted result page. Transient: consumed by the
/// summarization step and the cache writer, then discarded.
#[derive(Debug, Clone)]
pub struct ScrapedPage {
    pub url: String,
    pub extracted_text: String,
    pub fetched_at: DateTime<Utc>,
}

/// The live search-and-scrape contract.
#[async_trait]
pub trait SearchPipeline: Send + Sync {
    /// Search for `query` and return up to `max_results` scraped pages.
    ///
    /// The returned sequence may be partial or empty; emptiness means "no
    /// usable results" and is the caller's decision to surface.
    async fn run(&self, query: &str, max_results: usize)
    -> Result<Vec<ScrapedPage>, QueryError>;
}

/// HTTP implementation of [`SearchPipeline`] over an HTML search endpoint.
pub struct WebScraper {
    http: reqwest::Client,
    search_base: Url,
    search_timeout: Duration,
    fetch_timeout: Duration,
}

impl WebScraper {
    /// Build a scraper against `search_base` (an HTML search endpoint that
    /// accepts a `q` query parameter).
    ///
    /// # Errors
    /// - `search_base` does not parse as a URL.
    /// - The HTTP client cannot be constructed.
    pub fn new(
        search_base: &str,
        user_agent: &str,
        search_timeout: Duration,
        fetch_timeout: Duration,
    ) -> Result<Self, QueryError> {
        let search_base = Url::parse(search_base)
            .map_err(|e| QueryError::SearchFailed(format!("invalid search base: {e}")))?;
        let http = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .build()
            .map_err(|e| QueryError::SearchFailed(e.to_string()))?;

        Ok(Self {
            http,
            search_base,
            search_timeout,
            fetch_timeout,
        })
    }

    /// Fetch one result page and extract its text. Strictly ordered within
    /// the page: the body must be fully received before extraction starts.
    async fn fetch_page(&self, url: &str) -> Result<ScrapedPage, FetchError> {
        let response = tokio::time::timeout(self.fetch_timeout, self.http.get(url).send())
            .await
            .map_err(|_| FetchError::Timeout(self.fetch_timeout.as_secs()))??;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let html = tokio::time::timeout(self.fetch_timeout, response.text())
            .await
            .map_err(|_| FetchError::Timeout(self.fetch_timeout.as_secs()))??;

        let extracted_text = extract_page_text(&html).ok_or(FetchError::NoContent)?;

        Ok(ScrapedPage {
            url: url.to_string(),
            extracted_text,
            fetched_at: Utc::now(),
        })
    }
}

#[async_trait]
impl SearchPipeline for WebScraper {
    async fn run(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<ScrapedPage>, QueryError> {
        let mut search_url = self.search_base.clone();
        search_url.query_pairs_mut().append_pair("q", query);

        debug!(%search_url, "issuing search request");
        let response = tokio::time::timeout(self.search_timeout, self.http.get(search_url).send())
            .await
            .map_err(|_| QueryError::SearchFailed("search request timed out".to_string()))?
            .map_err(|e| QueryError::SearchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueryError::SearchFailed(format!(
                "search returned status {status}"
            )));
        }
        let html = response
            .text()
            .await
            .map_err(|e| QueryError::SearchFailed(e.to_string()))?;

        let urls = collect_result_urls(&html, &self.search_base, max_results);
        info!(count = urls.len(), "search produced candidate urls");
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let pages: Vec<ScrapedPage> = stream::iter(urls)
            .map(|url| async move {
                match self.fetch_page(&url).await {
                    Ok(page) => {
                        debug!(%url, chars = page.extracted_text.len(), "scraped page");
                        Some(page)
                    }
                    Err(e) => {
                        warn!(%url, error = %e, "skipping url");
                        None
                    }
                }
            })
            .buffer_unordered(FETCH_CONCURRENCY)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect();

        Ok(pages)
    }
}

/// Pull up to `max_results` distinct result URLs out of a search page,
/// excluding the provider's own domain.
pub(crate) fn collect_result_urls(html: &str, provider: &Url, max_results: usize) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for selector_str in RESULT_LINK_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        for element in document.select(&selector) {
            if urls.len() >= max_results {
                break;
            }
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if !href.starts_with("http") {
                continue;
            }
            let Ok(candidate) = Url::parse(href) else {
                continue;
            };
            if same_provider(&candidate, provider) {
                continue;
            }
            if seen.insert(candidate.to_string()) {
                urls.push(candidate.to_string());
            }
        }
        if !urls.is_empty() {
            break;
        }
    }
    urls
}

/// Does `candidate` point back at the search provider's own domain?
///
/// Domain hosts compare on their last two labels (so `duckduckgo.com`
/// matches `html.duckduckgo.com`); IP hosts compare exactly, including the
/// port.
fn same_provider(candidate: &Url, provider: &Url) -> bool {
    let (Some(c), Some(p)) = (candidate.host_str(), provider.host_str()) else {
        return false;
    };
    let ip_host =
        c.parse::<std::net::IpAddr>().is_ok() || p.parse::<std::net::IpAddr>().is_ok();
    if ip_host {
        return c == p && candidate.port() == provider.port();
    }
    let tail = |host: &str| {
        host.rsplit('.')
            .take(2)
            .collect::<Vec<_>>()
            .join(".")
    };
    tail(c) == tail(p)
}

/// Extract a page's primary text, preferring `<main>` and `<article>`
/// regions over whole-page text.
///
/// Absence of any extractable text is a normal, typed outcome (`None`), not
/// an error — the caller counts the page as unusable and moves on.
pub(crate) fn extract_page_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    for region in ["main", "article", "body"] {
        let Ok(selector) = Selector::parse(region) else {
            continue;
        };
        if let Some(root) = document.select(&selector).next() {
            let mut parts = Vec::new();
            collect_visible_text(root, &mut parts);
            let text = parts.join(" ");
            if !text.is_empty() {
                return Some(cap_chars(text, PAGE_CHAR_BUDGET));
            }
        }
    }
    None
}

fn collect_visible_text(element: ElementRef, parts: &mut Vec<String>) {
    if SKIPPED_TAGS.contains(&element.value().name()) {
        return;
    }
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.split_whitespace().collect::<Vec<_>>().join(" "));
            }
        } else if let Some(child_element) = ElementRef::wrap(child) {
            collect_visible_text(child_element, parts);
        }
    }
}

fn cap_chars(text: String, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn scraper_for(search_server: &MockServer) -> WebScraper {
        WebScraper::new(
            &format!("{}/search", search_server.base_url()),
            "memoseek-test",
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn extraction_prefers_main_over_body() {
        let html = r#"<html><body>
            <nav>site menu</nav>
            <main><p>The real content.</p></main>
            <footer>legal boilerplate</footer>
        </body></html>"#;
        assert_eq!(extract_page_text(html).unwrap(), "The real content.");
    }

    #[test]
    fn extraction_falls_back_to_article_then_body() {
        let with_article =
            "<html><body><article><p>From the article.</p></article></body></html>";
        assert_eq!(extract_page_text(with_article).unwrap(), "From the article.");

        let body_only = "<html><body><p>Plain body text.</p></body></html>";
        assert_eq!(extract_page_text(body_only).unwrap(), "Plain body text.");
    }

    #[test]
    fn extraction_strips_non_content_subtrees() {
        let html = r#"<html><body>
            <script>var tracking = true;</script>
            <style>.x { color: red }</style>
            <p>Visible text.</p>
            <noscript>enable js</noscript>
        </body></html>"#;
        assert_eq!(extract_page_text(html).unwrap(), "Visible text.");
    }

    #[test]
    fn extraction_of_empty_page_is_none() {
        assert_eq!(extract_page_text("<html><body></body></html>"), None);
        assert_eq!(
            extract_page_text("<html><body><script>only();</script></body></html>"),
            None
        );
    }

    #[test]
    fn extraction_caps_at_char_budget() {
        let body = "word ".repeat(10_000);
        let html = format!("<html><body><p>{body}</p></body></html>");
        let text = extract_page_text(&html).unwrap();
        assert_eq!(text.chars().count(), PAGE_CHAR_BUDGET);
    }

    #[test]
    fn url_collection_dedupes_and_excludes_provider() {
        let provider = Url::parse("https://html.duckduckgo.com/html/").unwrap();
        let html = r#"<html><body>
            <a class="result__a" href="https://one.example/page">One</a>
            <a class="result__a" href="https://one.example/page">One again</a>
            <a class="result__a" href="https://duckduckgo.com/internal">Provider</a>
            <a class="result__a" href="/relative">Relative</a>
            <a class="result__a" href="https://two.example/page">Two</a>
            <a class="result__a" href="https://three.example/page">Three</a>
        </body></html>"#;

        let urls = collect_result_urls(html, &provider, 2);
        assert_eq!(
            urls,
            vec!["https://one.example/page", "https://two.example/page"]
        );
    }

    #[test]
    fn url_collection_falls_back_to_generic_anchors() {
        let provider = Url::parse("https://html.duckduckgo.com/html/").unwrap();
        let html = r#"<html><body>
            <a href="https://plain.example/result">Plain anchor</a>
        </body></html>"#;

        let urls = collect_result_urls(html, &provider, 5);
        assert_eq!(urls, vec!["https://plain.example/result"]);
    }

    #[tokio::test]
    async fn run_returns_empty_for_linkless_results_page() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/search");
                then.status(200)
                    .body("<html><body><p>No results found.</p></body></html>");
            })
            .await;

        let pages = scraper_for(&server).run("anything", 6).await.unwrap();
        assert!(pages.is_empty());
    }

    #[tokio::test]
    async fn one_bad_url_never_aborts_the_batch() {
        let search_server = MockServer::start_async().await;
        let content_server = MockServer::start_async().await;

        for i in 0..4 {
            let path = format!("/page{i}");
            content_server
                .mock_async(move |when, then| {
                    when.method(GET).path(path.clone());
                    then.status(200).body(format!(
                        "<html><body><main>Content of page {i}.</main></body></html>"
                    ));
                })
                .await;
        }
        content_server
            .mock_async(|when, then| {
                when.method(GET).path("/broken");
                then.status(500).body("server error");
            })
            .await;

        let links: String = (0..4)
            .map(|i| {
                format!(
                    r#"<a class="result__a" href="{}/page{i}">Page {i}</a>"#,
                    content_server.base_url()
                )
            })
            .chain(std::iter::once(format!(
                r#"<a class="result__a" href="{}/broken">Broken</a>"#,
                content_server.base_url()
            )))
            .collect();
        let serp = format!("<html><body>{links}</body></html>");

        search_server
            .mock_async(move |when, then| {
                when.method(GET).path("/search");
                then.status(200).body(serp.clone());
            })
            .await;

        let pages = scraper_for(&search_server).run("anything", 6).await.unwrap();
        assert_eq!(pages.len(), 4, "the broken url must be skipped, not fatal");
        for page in &pages {
            assert!(page.extracted_text.starts_with("Content of page"));
        }
    }

    #[tokio::test]
    async fn search_failure_is_request_level() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/search");
                then.status(503).body("unavailable");
            })
            .await;

        let result = scraper_for(&server).run("anything", 6).await;
        assert!(matches!(result, Err(QueryError::SearchFailed(_))));
    }
}
