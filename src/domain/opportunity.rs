//! Opportunity type representing a proposed link exchange.

use crate::domain::{ContentId, Credits, OpportunityId, TimeMs, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of an opportunity.
///
/// Transitions are monotonic: `Pending`/`Approved` move to `Placed` or
/// `Failed` exactly once; a placed opportunity is never re-attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityStatus {
    Pending,
    Approved,
    Placed,
    Failed,
}

impl OpportunityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityStatus::Pending => "pending",
            OpportunityStatus::Approved => "approved",
            OpportunityStatus::Placed => "placed",
            OpportunityStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OpportunityStatus::Pending),
            "approved" => Some(OpportunityStatus::Approved),
            "placed" => Some(OpportunityStatus::Placed),
            "failed" => Some(OpportunityStatus::Failed),
            _ => None,
        }
    }

    /// Whether the engine may still attempt this opportunity.
    pub fn is_attemptable(&self) -> bool {
        matches!(
            self,
            OpportunityStatus::Pending | OpportunityStatus::Approved
        )
    }
}

impl std::fmt::Display for OpportunityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A proposed backlink exchange between a source and a target user.
///
/// Created by the external matching process; this engine only mutates
/// status and placement metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: OpportunityId,
    pub source_user_id: UserId,
    pub target_user_id: UserId,
    pub source_content_id: ContentId,
    pub target_content_id: ContentId,
    pub suggested_target_url: String,
    pub suggested_anchor_text: String,
    pub suggested_placement_context: Option<String>,
    pub match_score: f64,
    pub estimated_value: Credits,
    pub status: OpportunityStatus,
    pub placement_url: Option<String>,
    pub placement_method: Option<String>,
    pub placed_at: Option<TimeMs>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpportunityValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("estimated_value must be positive, got {0}")]
    NonPositiveValue(String),
}

impl Opportunity {
    /// Build a validated opportunity from raw row fields.
    ///
    /// # Errors
    /// Rejects blank URLs/anchors and non-positive estimated values rather
    /// than defaulting them.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: OpportunityId,
        source_user_id: UserId,
        target_user_id: UserId,
        source_content_id: ContentId,
        target_content_id: ContentId,
        suggested_target_url: String,
        suggested_anchor_text: String,
        suggested_placement_context: Option<String>,
        match_score: f64,
        estimated_value: Credits,
        status: OpportunityStatus,
    ) -> Result<Self, OpportunityValidationError> {
        if suggested_target_url.trim().is_empty() {
            return Err(OpportunityValidationError::MissingField(
                "suggested_target_url",
            ));
        }
        if suggested_anchor_text.trim().is_empty() {
            return Err(OpportunityValidationError::MissingField(
                "suggested_anchor_text",
            ));
        }
        if !estimated_value.is_positive() {
            return Err(OpportunityValidationError::NonPositiveValue(
                estimated_value.to_canonical_string(),
            ));
        }
        Ok(Opportunity {
            id,
            source_user_id,
            target_user_id,
            source_content_id,
            target_content_id,
            suggested_target_url,
            suggested_anchor_text,
            suggested_placement_context,
            match_score,
            estimated_value,
            status,
            placement_url: None,
            placement_method: None,
            placed_at: None,
        })
    }

    /// Keywords for content scoring, split out of the placement context.
    pub fn keywords(&self) -> Vec<String> {
        self.suggested_placement_context
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    }
}
