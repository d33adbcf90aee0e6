// src/providers/web_search.rs
// External web search providers

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchProviderError {
    #[error("search request failed: {0}")]
    Request(String),
    #[error("search provider returned status {0}")]
    Status(u16),
    #[error("invalid search response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    /// Ranked hits, best first.
    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<WebSearchHit>, SearchProviderError>;

    fn name(&self) -> &str;
}

/// Brave Search API client.
pub struct BraveSearchProvider {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Deserialize, Default)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Deserialize, Default)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

impl BraveSearchProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_endpoint(api_key, BRAVE_ENDPOINT.to_string())
    }

    pub fn with_endpoint(api_key: String, endpoint: String) -> Self {
        Self {
            api_key,
            endpoint,
            client: reqwest::Client::new(),
        }
    }
}

fn parse_brave(body: BraveResponse, max_results: usize) -> Vec<WebSearchHit> {
    body.web
        .map(|w| w.results)
        .unwrap_or_default()
        .into_iter()
        .filter(|r| !r.description.trim().is_empty() || !r.title.trim().is_empty())
        .take(max_results)
        .map(|r| WebSearchHit {
            title: r.title,
            snippet: r.description,
            url: r.url,
        })
        .collect()
}

#[async_trait]
impl WebSearchProvider for BraveSearchProvider {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<WebSearchHit>, SearchProviderError> {
        let start = Instant::now();
        debug!(query_len = query.len(), max_results, "Brave search");

        let count = max_results.clamp(1, 20).to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .await
            .map_err(|e| SearchProviderError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchProviderError::Status(response.status().as_u16()));
        }

        let body: BraveResponse = response
            .json()
            .await
            .map_err(|e| SearchProviderError::InvalidResponse(e.to_string()))?;

        let hits = parse_brave(body, max_results);
        info!(
            results = hits.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Brave search complete"
        );
        Ok(hits)
    }

    fn name(&self) -> &str {
        "brave"
    }
}

/// Provider used when no API key is configured. Always returns no hits.
#[derive(Debug, Clone, Default)]
pub struct DisabledWebSearch;

#[async_trait]
impl WebSearchProvider for DisabledWebSearch {
    async fn search(&self, _query: &str, _max_results: usize)
        -> Result<Vec<WebSearchHit>, SearchProviderError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "disabled"
    }
}
