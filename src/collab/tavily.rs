//! Tavily-backed web search
//!
//! [`TavilySearch`] implements [`WebSearchTool`] against the Tavily Search
//! API with a request timeout and bounded retry on transient failures.
//! Auth failures and bad requests surface immediately; timeouts, rate
//! limits, and 5xx responses are retried with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::{CollaboratorError, SearchHit, WebSearchTool};

/// Production API endpoint
const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

/// Default timeout for one API request
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum retry attempts for transient failures
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Search depth requested from the API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    /// Fast search with basic results
    #[default]
    Basic,
    /// Slower, more thorough search
    Advanced,
}

/// Typed errors for the Tavily API
#[derive(Debug, Error)]
pub enum TavilyError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("unauthorized, check the API key")]
    Unauthorized,

    #[error("rate limited")]
    RateLimited,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("http error ({0}): {1}")]
    HttpError(u16, String),

    #[error("failed to parse response: {0}")]
    ParseError(String),

    #[error("api key is missing or blank")]
    MissingApiKey,
}

impl TavilyError {
    /// Transient failures worth another attempt
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            TavilyError::Timeout
                | TavilyError::Connection(_)
                | TavilyError::RateLimited
                | TavilyError::ServerError(_, _)
        )
    }
}

/// Request body for the search endpoint
#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: SearchDepth,
}

/// Response body from the search endpoint
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// One search result; only the snippet matters here
#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    content: String,
}

/// Web search collaborator backed by the Tavily Search API
///
/// # Usage
///
/// ```ignore
/// let search = TavilySearch::from_env()?;
/// let hits = search.search("numerology life path", 3).await?;
/// ```
pub struct TavilySearch {
    api_key: String,
    client: Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    depth: SearchDepth,
}

impl TavilySearch {
    /// Create a client for the production endpoint
    pub fn new(api_key: impl Into<String>) -> Result<Self, TavilyError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(TavilyError::MissingApiKey);
        }
        Ok(Self {
            api_key,
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: MAX_RETRIES,
            depth: SearchDepth::Basic,
        })
    }

    /// Read the key from the `TAVILY_API_KEY` environment variable
    pub fn from_env() -> Result<Self, TavilyError> {
        Self::new(std::env::var("TAVILY_API_KEY").unwrap_or_default())
    }

    /// Point the client at a different endpoint (tests use this)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry budget for transient failures
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the search depth
    pub fn with_depth(mut self, depth: SearchDepth) -> Self {
        self.depth = depth;
        self
    }

    /// Run one search with retry and backoff
    async fn search_with_retry(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, TavilyError> {
        let request = SearchRequest {
            query,
            max_results: top_k.max(1),
            search_depth: self.depth,
        };

        let mut last_error = TavilyError::Network("no attempts made".to_string());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * 2u64.pow(attempt - 1));
                debug!(attempt, delay_ms = delay.as_millis(), "retrying tavily search");
                tokio::time::sleep(delay).await;
            }

            match self.search_once(&request).await {
                Ok(hits) => return Ok(hits),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    warn!(attempt, error = %e, "tavily search failed, will retry");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    /// Execute a single HTTP request
    async fn search_once(&self, request: &SearchRequest<'_>) -> Result<Vec<SearchHit>, TavilyError> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TavilyError::Timeout
                } else if e.is_connect() {
                    TavilyError::Connection(e.to_string())
                } else {
                    TavilyError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status.is_success() {
            let parsed: SearchResponse = response
                .json()
                .await
                .map_err(|e| TavilyError::ParseError(e.to_string()))?;
            return Ok(parsed
                .results
                .into_iter()
                .map(|r| SearchHit::new(r.content))
                .collect());
        }

        let error_text = response.text().await.unwrap_or_default();
        match status.as_u16() {
            401 => Err(TavilyError::Unauthorized),
            429 => Err(TavilyError::RateLimited),
            400 => Err(TavilyError::BadRequest(error_text)),
            500..=599 => Err(TavilyError::ServerError(status.as_u16(), error_text)),
            _ => Err(TavilyError::HttpError(status.as_u16(), error_text)),
        }
    }
}

#[async_trait]
impl WebSearchTool for TavilySearch {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, CollaboratorError> {
        self.search_with_retry(query, top_k)
            .await
            .map_err(|e| CollaboratorError::SearchUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_blank_api_key() {
        assert!(matches!(TavilySearch::new(""), Err(TavilyError::MissingApiKey)));
        assert!(matches!(TavilySearch::new("   "), Err(TavilyError::MissingApiKey)));
        assert!(TavilySearch::new("tvly-key").is_ok());
    }

    #[test]
    fn test_search_depth_serialization() {
        assert_eq!(serde_json::to_string(&SearchDepth::Basic).unwrap(), r#""basic""#);
        assert_eq!(
            serde_json::to_string(&SearchDepth::Advanced).unwrap(),
            r#""advanced""#
        );
    }

    #[test]
    fn test_request_body_shape() {
        let request = SearchRequest {
            query: "rust workflows",
            max_results: 3,
            search_depth: SearchDepth::Basic,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["query"], "rust workflows");
        assert_eq!(json["max_results"], 3);
        assert_eq!(json["search_depth"], "basic");
    }

    #[test]
    fn test_response_tolerates_missing_fields() {
        let parsed: SearchResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(parsed.results.is_empty());

        let parsed: SearchResponse =
            serde_json::from_str(r#"{"results": [{"title": "t", "url": "u"}]}"#).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].content, "");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(TavilyError::Timeout.is_retryable());
        assert!(TavilyError::RateLimited.is_retryable());
        assert!(TavilyError::ServerError(503, String::new()).is_retryable());
        assert!(TavilyError::Connection("refused".to_string()).is_retryable());

        assert!(!TavilyError::Unauthorized.is_retryable());
        assert!(!TavilyError::BadRequest("empty query".to_string()).is_retryable());
        assert!(!TavilyError::ParseError("bad json".to_string()).is_retryable());
    }

    #[test]
    fn test_builder_overrides() {
        let search = TavilySearch::new("key")
            .unwrap()
            .with_timeout(Duration::from_secs(5))
            .with_max_retries(1)
            .with_depth(SearchDepth::Advanced);

        assert_eq!(search.timeout, Duration::from_secs(5));
        assert_eq!(search.max_retries, 1);
        assert_eq!(search.depth, SearchDepth::Advanced);
    }
}
