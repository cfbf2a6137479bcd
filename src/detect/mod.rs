//! Platform detection for target sites.
//!
//! Classification is black-box: a probe against the WordPress REST surface
//! first, then homepage marker matching for the other known builders.
//! Detection failure is a classification outcome, never an error — script
//! injection needs no platform cooperation, so an unreachable or unknown
//! site still reports `js_injection_possible = true`.

pub mod fetcher;

pub use fetcher::{FetchError, FetchedPage, HttpPageFetcher, MockPageFetcher, PageFetcher};

use crate::domain::TargetUrl;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Closed set of platforms the detector can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    WordPress,
    Shopify,
    Wix,
    Squarespace,
    Webflow,
    Unknown,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::WordPress => "wordpress",
            Platform::Shopify => "shopify",
            Platform::Wix => "wix",
            Platform::Squarespace => "squarespace",
            Platform::Webflow => "webflow",
            Platform::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the detector learned about a target site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteProfile {
    pub platform: Platform,
    pub has_content_api: bool,
    pub js_injection_possible: bool,
}

impl SiteProfile {
    /// The degraded result: nothing confirmed, injection still available.
    pub fn degraded() -> Self {
        SiteProfile {
            platform: Platform::Unknown,
            has_content_api: false,
            js_injection_possible: true,
        }
    }
}

/// Classifies target sites with one probe and one homepage fetch.
#[derive(Debug, Clone)]
pub struct PlatformDetector {
    fetcher: Arc<dyn PageFetcher>,
}

impl PlatformDetector {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Classify a site. Malformed URLs and unreachable hosts degrade to the
    /// unknown-but-injectable profile instead of raising.
    pub async fn detect(&self, site_url: &str) -> SiteProfile {
        let url = match TargetUrl::parse(site_url) {
            Ok(url) => url,
            Err(e) => {
                debug!(site_url, error = %e, "malformed site URL, degrading to injection");
                return SiteProfile::degraded();
            }
        };
        let origin = url.origin();

        let probe_url = format!("{}/wp-json/wp/v2/posts?per_page=1", origin);
        match self.fetcher.get(&probe_url).await {
            Ok(page) if page.is_success() => {
                debug!(%origin, "content API probe succeeded");
                return SiteProfile {
                    platform: Platform::WordPress,
                    has_content_api: true,
                    js_injection_possible: true,
                };
            }
            Ok(page) => debug!(%origin, status = page.status, "content API probe rejected"),
            Err(e) => debug!(%origin, error = %e, "content API probe failed"),
        }

        match self.fetcher.get(&origin).await {
            Ok(page) if page.is_success() => SiteProfile {
                platform: classify_markers(&page.body),
                has_content_api: false,
                js_injection_possible: true,
            },
            _ => {
                debug!(%origin, "homepage fetch failed, degrading to injection");
                SiteProfile::degraded()
            }
        }
    }
}

/// Match homepage markup against fixed markers for the known platforms.
pub fn classify_markers(html: &str) -> Platform {
    let html_lower = html.to_lowercase();
    if html_lower.contains("wp-content") || html_lower.contains("wp-includes") {
        Platform::WordPress
    } else if html_lower.contains("cdn.shopify.com") || html_lower.contains("shopify") {
        Platform::Shopify
    } else if html_lower.contains("static.wixstatic.com") || html_lower.contains("wix.com") {
        Platform::Wix
    } else if html_lower.contains("squarespace") {
        Platform::Squarespace
    } else if html_lower.contains("webflow") {
        Platform::Webflow
    } else {
        Platform::Unknown
    }
}
