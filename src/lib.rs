pub mod api;
pub mod config;
pub mod db;
pub mod detect;
pub mod domain;
pub mod error;
pub mod generate;
pub mod ledger;
pub mod scheduler;
pub mod strategy;

pub use config::Config;
pub use db::{init_db, Repository};
pub use detect::{PlatformDetector, SiteProfile};
pub use domain::{
    Credits, CreditTransaction, DomainMetrics, Opportunity, OpportunityId, OpportunityStatus,
    PlacementAttempt, PlacementInstruction, PlacementMethod, TimeMs, UserId,
};
pub use error::AppError;
pub use generate::SentenceGenerator;
pub use ledger::CreditLedger;
pub use scheduler::PlacementEngine;
