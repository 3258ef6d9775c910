//! Enrichment page fetcher
//!
//! Fetches candidate URLs with a bounded concurrency limit and extracts
//! loosely structured signals from each page: title, normalized visible
//! text, embedded JSON-LD, microdata items and meta tags. Partial-failure
//! model: a failing URL is logged and dropped, never blocking the others.

use crate::config::IngestConfig;
use futures::stream::{FuturesUnordered, StreamExt};
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};
use url::Url;

/// Page fetch errors (per-URL; logged, not surfaced)
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Body read error: {0}")]
    Body(String),
}

/// Signals scraped from one fetched page
#[derive(Debug, Clone, Default)]
pub struct PageSignal {
    /// The fetched URL
    pub url: String,
    /// Page title
    pub title: Option<String>,
    /// Normalized visible text (script/style removed, single-spaced)
    pub text: String,
    /// First embedded JSON-LD object, if any
    pub json_ld: Option<serde_json::Value>,
    /// Microdata items resolved to property maps
    pub microdata: Vec<HashMap<String, String>>,
    /// Meta tags keyed by name/property
    pub meta: HashMap<String, String>,
}

/// Scrapes event information from detected URLs
pub struct PageFetcher {
    timeout: Duration,
    max_concurrent: usize,
    user_agent: String,
}

impl PageFetcher {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            timeout: config.fetch_timeout,
            max_concurrent: config.max_concurrent_fetches,
            user_agent: config.user_agent.clone(),
        }
    }

    /// Fetch all well-formed URLs concurrently and return a signal for
    /// each page that responded with a success status.
    ///
    /// The HTTP client (and its connection pool) lives for exactly one
    /// call. No ordering guarantee relative to the input.
    pub async fn fetch_all(&self, urls: &[String]) -> Vec<PageSignal> {
        let valid_urls: Vec<String> = urls
            .iter()
            .filter(|url| Url::parse(url).is_ok())
            .cloned()
            .collect();

        if valid_urls.is_empty() {
            return Vec::new();
        }

        let client = match reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "Could not build HTTP client for enrichment");
                return Vec::new();
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = FuturesUnordered::new();

        for url in valid_urls {
            let client = client.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.push(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                match fetch_single(&client, &url).await {
                    Ok(signal) => {
                        debug!(url = %url, "Successfully scraped page");
                        Some(signal)
                    }
                    Err(e) => {
                        warn!(url = %url, error = %e, "Page fetch failed");
                        None
                    }
                }
            });
        }

        let mut signals = Vec::new();
        while let Some(result) = tasks.next().await {
            if let Some(signal) = result {
                signals.push(signal);
            }
        }

        signals
    }
}

/// Fetch one URL and parse its body into a page signal
async fn fetch_single(client: &reqwest::Client, url: &str) -> Result<PageSignal, FetchError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    let body = response
        .text()
        .await
        .map_err(|e| FetchError::Body(e.to_string()))?;

    Ok(parse_page(url, &body))
}

/// Parse an HTML body into its signal components
fn parse_page(url: &str, body: &str) -> PageSignal {
    let document = Html::parse_document(body);

    PageSignal {
        url: url.to_string(),
        title: extract_title(&document),
        text: extract_text(&document),
        json_ld: extract_json_ld(&document),
        microdata: extract_microdata(&document),
        meta: extract_meta(&document),
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Collect visible text, skipping script/style subtrees, collapsed to
/// single-spaced chunks.
fn extract_text(document: &Html) -> String {
    let mut chunks: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        if let scraper::Node::Text(text) = node.value() {
            let excluded = node.ancestors().any(|ancestor| {
                matches!(
                    ancestor.value(),
                    scraper::Node::Element(el) if el.name() == "script" || el.name() == "style"
                )
            });
            if excluded {
                continue;
            }
            chunks.extend(text.split_whitespace());
        }
    }

    chunks.join(" ")
}

/// First `<script type="application/ld+json">` whose body parses as a
/// JSON object.
fn extract_json_ld(document: &Html) -> Option<serde_json::Value> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;

    for script in document.select(&selector) {
        let raw: String = script.text().collect();
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) {
            if value.is_object() {
                return Some(value);
            }
        }
    }

    None
}

/// Resolve every `[itemtype]` element to a key/value map over its
/// `[itemprop]` descendants (content attribute, else trimmed text).
fn extract_microdata(document: &Html) -> Vec<HashMap<String, String>> {
    let Ok(item_selector) = Selector::parse("[itemtype]") else {
        return Vec::new();
    };
    let Ok(prop_selector) = Selector::parse("[itemprop]") else {
        return Vec::new();
    };

    document
        .select(&item_selector)
        .map(|item| {
            let mut properties = HashMap::new();
            properties.insert(
                "type".to_string(),
                item.value().attr("itemtype").unwrap_or_default().to_string(),
            );

            for prop in item.select(&prop_selector) {
                if let Some(name) = prop.value().attr("itemprop") {
                    let value = prop
                        .value()
                        .attr("content")
                        .map(str::to_string)
                        .unwrap_or_else(|| prop.text().collect::<String>().trim().to_string());
                    properties.insert(name.to_string(), value);
                }
            }

            properties
        })
        .collect()
}

fn extract_meta(document: &Html) -> HashMap<String, String> {
    let Ok(selector) = Selector::parse("meta") else {
        return HashMap::new();
    };

    let mut meta = HashMap::new();
    for tag in document.select(&selector) {
        let name = tag
            .value()
            .attr("name")
            .or_else(|| tag.value().attr("property"));
        if let (Some(name), Some(content)) = (name, tag.value().attr("content")) {
            meta.insert(name.to_string(), content.to_string());
        }
    }
    meta
}
