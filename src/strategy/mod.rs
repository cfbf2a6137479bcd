//! Placement strategies and the pure strategy selector.

pub mod injection;
pub mod wordpress;

pub use injection::JsInjectionStrategy;
pub use wordpress::{ContentApi, ContentApiError, MockContentApi, WordPressStrategy, WpRestClient, WpPost};

use crate::detect::{Platform, SiteProfile};
use crate::domain::{DomainMetrics, PlacementMethod};

/// Outcome of one strategy execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementResult {
    pub success: bool,
    pub method: PlacementMethod,
    pub placement_url: Option<String>,
    pub verification_success: bool,
    pub response_time_ms: i64,
    pub error: Option<String>,
}

impl PlacementResult {
    pub fn succeeded(
        method: PlacementMethod,
        placement_url: String,
        verification_success: bool,
        response_time_ms: i64,
    ) -> Self {
        PlacementResult {
            success: true,
            method,
            placement_url: Some(placement_url),
            verification_success,
            response_time_ms,
            error: None,
        }
    }

    pub fn failed(method: PlacementMethod, response_time_ms: i64, error: String) -> Self {
        PlacementResult {
            success: false,
            method,
            placement_url: None,
            verification_success: false,
            response_time_ms,
            error: Some(error),
        }
    }
}

/// Pick the placement method for a classified site.
///
/// The content API is chosen only when everything lines up: platform
/// confirmed, API reachable, and the target user has API access enabled
/// with credentials on file. Injection is the universal fallback. `None`
/// means not-yet-placeable; callers skip without failing the opportunity.
pub fn select_method(
    profile: &SiteProfile,
    metrics: Option<&DomainMetrics>,
) -> Option<PlacementMethod> {
    if profile.platform == Platform::WordPress && profile.has_content_api {
        if let Some(metrics) = metrics {
            if metrics.wp_credentials().is_some() {
                return Some(PlacementMethod::ContentApi);
            }
        }
    }
    if profile.js_injection_possible {
        return Some(PlacementMethod::JsInjection);
    }
    None
}
