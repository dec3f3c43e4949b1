//! Marketplace API client
//!
//! Thin adapter over [`Transport`] that knows the upstream URL layout and the
//! two JSON shapes the pipeline reads: search pages and item details.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::infrastructure::config::MarketplaceConfig;
use crate::infrastructure::http_client::{FetchResponse, Transport, TransportError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Upstream returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Malformed upstream response from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

/// One page of search results
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub results: Vec<Value>,
    /// `paging.total`, the upstream's own count of matches
    pub total: u64,
}

#[derive(Clone)]
pub struct MarketplaceClient {
    transport: Arc<dyn Transport>,
    api_base_url: String,
    site_id: String,
    timeout: Duration,
}

impl std::fmt::Debug for MarketplaceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketplaceClient")
            .field("api_base_url", &self.api_base_url)
            .field("site_id", &self.site_id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl MarketplaceClient {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: &MarketplaceConfig, timeout: Duration) -> Self {
        Self {
            transport,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            site_id: config.site_id.clone(),
            timeout,
        }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `{base}/sites/{site}/search?q=..&offset=..&limit=..`
    #[must_use]
    pub fn search_url(&self, term: &str, offset: u64, limit: u64) -> String {
        let raw = format!("{}/sites/{}/search", self.api_base_url, self.site_id);
        match Url::parse(&raw) {
            Ok(mut url) => {
                url.query_pairs_mut()
                    .append_pair("q", term)
                    .append_pair("offset", &offset.to_string())
                    .append_pair("limit", &limit.to_string());
                url.into()
            }
            Err(_) => format!("{raw}?q={term}&offset={offset}&limit={limit}"),
        }
    }

    /// `{base}/items/{id}`, the id percent-encoded as a single path segment
    #[must_use]
    pub fn item_url(&self, item_id: &str) -> String {
        let fallback = || format!("{}/items/{}", self.api_base_url, item_id);
        let Ok(mut url) = Url::parse(&self.api_base_url) else {
            return fallback();
        };
        match url.path_segments_mut() {
            Ok(mut segments) => {
                segments.pop_if_empty().push("items").push(item_id);
            }
            Err(()) => return fallback(),
        }
        url.into()
    }

    /// Fetches one search page
    pub async fn search(&self, term: &str, offset: u64, limit: u64) -> Result<SearchPage, UpstreamError> {
        let url = self.search_url(term, offset, limit);
        let body = self.get_json(&url).await?;
        parse_search_page(&url, &body)
    }

    /// `sold_quantity` from the item detail endpoint, `None` when absent
    pub async fn item_sold_quantity(&self, item_id: &str) -> Result<Option<u64>, UpstreamError> {
        let url = self.item_url(item_id);
        let body = self.get_json(&url).await?;
        let value: Value = serde_json::from_str(&body).map_err(|e| UpstreamError::Malformed {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        Ok(value.get("sold_quantity").and_then(count_from_json))
    }

    /// Raw HTML of a product page
    pub async fn fetch_page(&self, url: &str) -> Result<String, UpstreamError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );
        let response = self.get(url, &headers).await?;
        Ok(response.body)
    }

    async fn get_json(&self, url: &str) -> Result<String, UpstreamError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let response = self.get(url, &headers).await?;
        Ok(response.body)
    }

    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<FetchResponse, UpstreamError> {
        let response = tokio::time::timeout(
            self.timeout,
            self.transport.fetch_url(url, headers, self.timeout),
        )
        .await
        .map_err(|_| TransportError::Timeout(self.timeout))??;

        if !response.is_success() {
            return Err(UpstreamError::Status {
                status: response.status,
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

fn parse_search_page(url: &str, body: &str) -> Result<SearchPage, UpstreamError> {
    let malformed = |reason: String| UpstreamError::Malformed {
        url: url.to_string(),
        reason,
    };

    let mut value: Value = serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;

    let total = value
        .pointer("/paging/total")
        .and_then(count_from_json)
        .unwrap_or(0);

    let results = match value.get_mut("results").map(Value::take) {
        Some(Value::Array(results)) => results,
        Some(_) => return Err(malformed("`results` is not an array".to_string())),
        None => return Err(malformed("missing `results`".to_string())),
    };

    Ok(SearchPage { results, total })
}

/// Non-negative integer from a JSON number or numeric string
fn count_from_json(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}
