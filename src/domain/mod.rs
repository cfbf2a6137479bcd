//! Domain types for the placement engine.
//!
//! This module provides:
//! - Lossless credit amounts via the Credits wrapper
//! - Domain primitives: UserId, OpportunityId, ContentId, TimeMs, TargetUrl
//! - Entity types with validating constructors: Opportunity,
//!   PlacementInstruction, PlacementAttempt, CreditTransaction, DomainMetrics

pub mod attempt;
pub mod credits;
pub mod instruction;
pub mod metrics;
pub mod opportunity;
pub mod primitives;
pub mod transaction;

pub use attempt::{PlacementAttempt, PlacementMethod};
pub use credits::Credits;
pub use instruction::{InstructionStatus, PlacementInstruction};
pub use metrics::{DomainMetrics, WpCredentials};
pub use opportunity::{Opportunity, OpportunityStatus};
pub use primitives::{ContentId, OpportunityId, TargetUrl, TimeMs, UrlParseError, UserId};
pub use transaction::{CreditTransaction, TransactionKind};
