//! Domain primitives: UserId, OpportunityId, ContentId, TimeMs, TargetUrl.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// User row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl UserId {
    pub fn new(id: i64) -> Self {
        UserId(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opportunity row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpportunityId(pub i64);

impl OpportunityId {
    pub fn new(id: i64) -> Self {
        OpportunityId(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for OpportunityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a piece of content (source or target side of an exchange).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentId(pub i64);

impl ContentId {
    pub fn new(id: i64) -> Self {
        ContentId(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    pub fn as_ms(&self) -> i64 {
        self.0
    }
}

/// Error returned when a link target URL fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlParseError {
    #[error("URL must use http or https: {0}")]
    BadScheme(String),
    #[error("URL contains forbidden characters: {0}")]
    ForbiddenChars(String),
    #[error("URL is empty")]
    Empty,
}

/// An absolute http(s) URL that is safe to embed as an href attribute.
///
/// Validation happens once at construction; everything downstream (the
/// sentence generator, the instruction store, verification) works with the
/// already-checked value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetUrl(String);

impl TargetUrl {
    /// Validate and wrap a raw URL string.
    ///
    /// # Errors
    /// Rejects empty strings, non-http(s) schemes, and URLs containing
    /// whitespace, quotes, or angle brackets.
    pub fn parse(raw: &str) -> Result<Self, UrlParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(UrlParseError::Empty);
        }
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(UrlParseError::BadScheme(trimmed.to_string()));
        }
        if trimmed
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '\''))
        {
            return Err(UrlParseError::ForbiddenChars(trimmed.to_string()));
        }
        Ok(TargetUrl(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The scheme+host portion of the URL, used as the probe origin.
    pub fn origin(&self) -> String {
        let scheme_end = self.0.find("://").map(|i| i + 3).unwrap_or(0);
        match self.0[scheme_end..].find('/') {
            Some(path_start) => self.0[..scheme_end + path_start].to_string(),
            None => self.0.clone(),
        }
    }

    /// The bare host, used as the attempt's target_domain field.
    pub fn domain(&self) -> String {
        let origin = self.origin();
        origin
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .to_string()
    }
}

impl std::fmt::Display for TargetUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
