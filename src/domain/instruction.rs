//! Placement instruction: a durable directive consumed by the client-side
//! executor script running on the target site.

use crate::domain::{ContentId, OpportunityId, TimeMs};
use serde::{Deserialize, Serialize};

/// Execution status reported back by the consumer script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionStatus {
    Pending,
    Completed,
}

impl InstructionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstructionStatus::Pending => "pending",
            InstructionStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InstructionStatus::Pending),
            "completed" => Some(InstructionStatus::Completed),
            _ => None,
        }
    }
}

/// A pending link-injection directive, at most one per opportunity.
///
/// The engine writes these with upsert semantics; the consumer script polls
/// by token and flips status to completed out-of-band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementInstruction {
    pub opportunity_id: OpportunityId,
    /// Stable public handle for the consumer script. Deterministic so that
    /// re-running the strategy never invalidates a handle already handed out.
    pub token: String,
    pub target_url: String,
    pub anchor_text: String,
    pub sentence_html: String,
    pub target_content_id: ContentId,
    pub status: InstructionStatus,
    pub created_at: TimeMs,
}

impl PlacementInstruction {
    pub fn new(
        opportunity_id: OpportunityId,
        target_url: String,
        anchor_text: String,
        sentence_html: String,
        target_content_id: ContentId,
    ) -> Self {
        let token = Self::compute_token(opportunity_id, &target_url);
        PlacementInstruction {
            opportunity_id,
            token,
            target_url,
            anchor_text,
            sentence_html,
            target_content_id,
            status: InstructionStatus::Pending,
            created_at: TimeMs::now(),
        }
    }

    /// Derive the stable instruction token from identifying fields.
    pub fn compute_token(opportunity_id: OpportunityId, target_url: &str) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(opportunity_id.as_i64().to_le_bytes());
        hasher.update(target_url.as_bytes());
        let hash = hasher.finalize();
        hex::encode(&hash[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_deterministic() {
        let t1 = PlacementInstruction::compute_token(OpportunityId::new(7), "https://a.com/x");
        let t2 = PlacementInstruction::compute_token(OpportunityId::new(7), "https://a.com/x");
        assert_eq!(t1, t2);
        assert_eq!(t1.len(), 32);
    }

    #[test]
    fn test_token_varies_by_opportunity() {
        let t1 = PlacementInstruction::compute_token(OpportunityId::new(7), "https://a.com/x");
        let t2 = PlacementInstruction::compute_token(OpportunityId::new(8), "https://a.com/x");
        assert_ne!(t1, t2);
    }

    #[test]
    fn test_new_instruction_is_pending() {
        let instr = PlacementInstruction::new(
            OpportunityId::new(1),
            "https://a.com/x".to_string(),
            "anchor".to_string(),
            "<a href=\"https://a.com/x\">anchor</a>".to_string(),
            ContentId::new(5),
        );
        assert_eq!(instr.status, InstructionStatus::Pending);
        assert_eq!(
            instr.token,
            PlacementInstruction::compute_token(OpportunityId::new(1), "https://a.com/x")
        );
    }

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(
            InstructionStatus::parse("pending"),
            Some(InstructionStatus::Pending)
        );
        assert_eq!(
            InstructionStatus::parse("completed"),
            Some(InstructionStatus::Completed)
        );
        assert_eq!(InstructionStatus::parse("done"), None);
    }
}
