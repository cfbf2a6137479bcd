//! Placement attempt: append-only audit record of one strategy execution.

use crate::domain::{OpportunityId, TimeMs};
use serde::{Deserialize, Serialize};

/// How a placement was (or would have been) carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementMethod {
    /// Direct authenticated edit through the target site's REST surface.
    ContentApi,
    /// Asynchronous instruction executed later by the target page itself.
    JsInjection,
}

impl PlacementMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementMethod::ContentApi => "content_api",
            PlacementMethod::JsInjection => "js_injection",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "content_api" => Some(PlacementMethod::ContentApi),
            "js_injection" => Some(PlacementMethod::JsInjection),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlacementMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit log entry for a single strategy execution, success or failure.
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementAttempt {
    pub opportunity_id: OpportunityId,
    /// Scheduler run this attempt belongs to, if batch-driven.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub target_domain: String,
    pub method: PlacementMethod,
    pub success: bool,
    pub verification_success: bool,
    pub response_time_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: TimeMs,
}

impl PlacementAttempt {
    pub fn succeeded(
        opportunity_id: OpportunityId,
        target_domain: String,
        method: PlacementMethod,
        verification_success: bool,
        response_time_ms: i64,
    ) -> Self {
        PlacementAttempt {
            opportunity_id,
            run_id: None,
            target_domain,
            method,
            success: true,
            verification_success,
            response_time_ms,
            error: None,
            created_at: TimeMs::now(),
        }
    }

    pub fn failed(
        opportunity_id: OpportunityId,
        target_domain: String,
        method: PlacementMethod,
        response_time_ms: i64,
        error: String,
    ) -> Self {
        PlacementAttempt {
            opportunity_id,
            run_id: None,
            target_domain,
            method,
            success: false,
            verification_success: false,
            response_time_ms,
            error: Some(error),
            created_at: TimeMs::now(),
        }
    }

    pub fn with_run_id(mut self, run_id: String) -> Self {
        self.run_id = Some(run_id);
        self
    }
}
