//! Page fetch abstraction used by the platform detector.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// A fetched page: status plus body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Error type for page fetches.
#[derive(Debug, Clone)]
pub enum FetchError {
    /// Network error (DNS failure, refused connection, timeout).
    Network(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Network(msg) => write!(f, "Network error: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

/// Single best-effort GET of a page. No retries: callers treat failure as a
/// classification outcome, not an exception.
#[async_trait]
pub trait PageFetcher: Send + Sync + fmt::Debug {
    async fn get(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// Production fetcher over reqwest with a per-call timeout.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn get(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(FetchedPage { status, body })
    }
}

/// Mock fetcher that returns canned pages per URL.
#[derive(Debug, Clone, Default)]
pub struct MockPageFetcher {
    pages: HashMap<String, FetchedPage>,
    unreachable: bool,
}

impl MockPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `page` for an exact URL.
    pub fn with_page(mut self, url: &str, page: FetchedPage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    /// Every fetch fails as if the network timed out.
    pub fn unreachable() -> Self {
        Self {
            pages: HashMap::new(),
            unreachable: true,
        }
    }
}

#[async_trait]
impl PageFetcher for MockPageFetcher {
    async fn get(&self, url: &str) -> Result<FetchedPage, FetchError> {
        if self.unreachable {
            return Err(FetchError::Network("operation timed out".to_string()));
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Network(format!("no route to {}", url)))
    }
}
