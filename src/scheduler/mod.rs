//! Placement engine and per-user batch scheduler.
//!
//! One logical worker drives a user's opportunities sequentially: classify
//! the target site, select a strategy, take a credit hold, execute, record
//! the attempt, settle the ledger. The batch driver skips what it cannot
//! attempt (no method, no credits, saturated target) without failing those
//! opportunities, and stops at the first success for the user.

use crate::config::Config;
use crate::db::Repository;
use crate::detect::{PlatformDetector, SiteProfile};
use crate::domain::{
    Credits, DomainMetrics, Opportunity, OpportunityId, OpportunityStatus, PlacementAttempt,
    PlacementMethod, UserId,
};
use crate::ledger::{CreditLedger, LedgerError};
use crate::strategy::{select_method, JsInjectionStrategy, PlacementResult, WordPressStrategy};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("opportunity {0} not found")]
    NotFound(OpportunityId),
    #[error("opportunity {0} is already {1}")]
    NotAttemptable(OpportunityId, OpportunityStatus),
    #[error("no placement method available for opportunity {0}")]
    NoMethod(OpportunityId),
    #[error("insufficient credits for opportunity {0}")]
    InsufficientCredits(OpportunityId),
    #[error("placement of opportunity {opportunity_id} failed: {error}")]
    AttemptFailed {
        opportunity_id: OpportunityId,
        error: String,
        response_time_ms: i64,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Successful placement, as reported to callers.
#[derive(Debug, Clone)]
pub struct PlacementReport {
    pub opportunity_id: OpportunityId,
    pub method: PlacementMethod,
    pub placement_url: Option<String>,
    pub verification_success: bool,
    pub response_time_ms: i64,
    pub credits_charged: Credits,
}

/// Per-opportunity outcome of a batch run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub opportunity_id: OpportunityId,
    pub success: bool,
    pub placement_url: Option<String>,
    pub error: Option<String>,
    pub skipped: bool,
}

/// Result of one batch run for one user.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub outcomes: Vec<RunOutcome>,
}

pub struct PlacementEngine {
    repo: Arc<Repository>,
    detector: PlatformDetector,
    wordpress: WordPressStrategy,
    injection: JsInjectionStrategy,
    ledger: CreditLedger,
    config: Config,
}

impl PlacementEngine {
    pub fn new(
        repo: Arc<Repository>,
        detector: PlatformDetector,
        wordpress: WordPressStrategy,
        injection: JsInjectionStrategy,
        ledger: CreditLedger,
        config: Config,
    ) -> Self {
        Self {
            repo,
            detector,
            wordpress,
            injection,
            ledger,
            config,
        }
    }

    /// Drive a single opportunity through the full pipeline.
    pub async fn place_opportunity(
        &self,
        opportunity_id: OpportunityId,
    ) -> Result<PlacementReport, PlacementError> {
        let opportunity = self
            .repo
            .get_opportunity(opportunity_id)
            .await?
            .ok_or(PlacementError::NotFound(opportunity_id))?;
        if !opportunity.status.is_attemptable() {
            return Err(PlacementError::NotAttemptable(
                opportunity_id,
                opportunity.status,
            ));
        }
        self.attempt(&opportunity, None).await
    }

    /// Load the opportunity without attempting it (endpoint validation).
    pub async fn load_opportunity(
        &self,
        opportunity_id: OpportunityId,
    ) -> Result<Opportunity, PlacementError> {
        self.repo
            .get_opportunity(opportunity_id)
            .await?
            .ok_or(PlacementError::NotFound(opportunity_id))
    }

    /// Run the batch scheduler for one user: iterate attemptable
    /// opportunities best-match first, skip what is not placeable right
    /// now, stop at the first success.
    pub async fn run_for_user(&self, user_id: UserId) -> Result<RunReport, PlacementError> {
        let run_id = Uuid::new_v4().to_string();
        let opportunities = self.repo.list_attemptable_for_user(user_id).await?;
        info!(%user_id, %run_id, count = opportunities.len(), "scheduler run started");

        let mut outcomes = Vec::new();
        for (i, opportunity) in opportunities.iter().enumerate() {
            if i > 0 {
                // Courtesy delay between consecutive third-party targets.
                tokio::time::sleep(Duration::from_millis(self.config.domain_fetch_delay_ms)).await;
            }

            let live = self
                .repo
                .count_live_instructions_for_target(opportunity.target_content_id)
                .await?;
            if live >= self.config.max_live_instructions_per_target {
                outcomes.push(RunOutcome {
                    opportunity_id: opportunity.id,
                    success: false,
                    placement_url: None,
                    error: Some("target content at live instruction capacity".to_string()),
                    skipped: true,
                });
                continue;
            }

            match self.attempt(opportunity, Some(&run_id)).await {
                Ok(report) => {
                    outcomes.push(RunOutcome {
                        opportunity_id: opportunity.id,
                        success: true,
                        placement_url: report.placement_url.clone(),
                        error: None,
                        skipped: false,
                    });
                    // One successful placement per user per run.
                    break;
                }
                Err(PlacementError::NoMethod(_)) => {
                    outcomes.push(RunOutcome {
                        opportunity_id: opportunity.id,
                        success: false,
                        placement_url: None,
                        error: Some("no placement method available".to_string()),
                        skipped: true,
                    });
                }
                Err(PlacementError::InsufficientCredits(_)) => {
                    outcomes.push(RunOutcome {
                        opportunity_id: opportunity.id,
                        success: false,
                        placement_url: None,
                        error: Some("insufficient credits".to_string()),
                        skipped: true,
                    });
                }
                Err(PlacementError::AttemptFailed { error, .. }) => {
                    outcomes.push(RunOutcome {
                        opportunity_id: opportunity.id,
                        success: false,
                        placement_url: None,
                        error: Some(error),
                        skipped: false,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(%user_id, %run_id, outcomes = outcomes.len(), "scheduler run finished");
        Ok(RunReport { run_id, outcomes })
    }

    /// One attempt: detect, select, hold, execute, record, settle.
    async fn attempt(
        &self,
        opportunity: &Opportunity,
        run_id: Option<&str>,
    ) -> Result<PlacementReport, PlacementError> {
        let metrics = self
            .repo
            .get_domain_metrics(opportunity.target_user_id)
            .await?;

        let profile = match metrics.as_ref() {
            Some(m) => self.detector.detect(&m.site_url).await,
            None => SiteProfile::degraded(),
        };
        let method = select_method(&profile, metrics.as_ref())
            .ok_or(PlacementError::NoMethod(opportunity.id))?;
        info!(
            opportunity_id = opportunity.id.as_i64(),
            platform = %profile.platform,
            method = %method,
            "strategy selected"
        );

        let amount = opportunity.estimated_value;
        let held = self
            .ledger
            .hold(opportunity.source_user_id, amount, opportunity.id)
            .await?;
        if !held {
            return Err(PlacementError::InsufficientCredits(opportunity.id));
        }

        let result = self.execute(opportunity, method, metrics.as_ref()).await;
        let target_domain = metrics
            .as_ref()
            .map(|m| m.domain.clone())
            .unwrap_or_else(|| "unknown".to_string());

        if result.success {
            self.finalize_success(opportunity, &result, &target_domain, run_id, amount)
                .await
        } else {
            self.finalize_failure(opportunity, &result, &target_domain, run_id, amount)
                .await
        }
    }

    async fn execute(
        &self,
        opportunity: &Opportunity,
        method: PlacementMethod,
        metrics: Option<&DomainMetrics>,
    ) -> PlacementResult {
        match method {
            PlacementMethod::ContentApi => {
                // The selector only picks the content API when credentials
                // are on file; fall through to injection otherwise.
                match metrics.and_then(|m| m.wp_credentials().map(|c| (m, c))) {
                    Some((m, creds)) => self.wordpress.place(opportunity, &m.site_url, &creds).await,
                    None => {
                        self.injection
                            .place(opportunity, metrics.map(|m| m.site_url.as_str()))
                            .await
                    }
                }
            }
            PlacementMethod::JsInjection => {
                self.injection
                    .place(opportunity, metrics.map(|m| m.site_url.as_str()))
                    .await
            }
        }
    }

    async fn finalize_success(
        &self,
        opportunity: &Opportunity,
        result: &PlacementResult,
        target_domain: &str,
        run_id: Option<&str>,
        amount: Credits,
    ) -> Result<PlacementReport, PlacementError> {
        let mut attempt = PlacementAttempt::succeeded(
            opportunity.id,
            target_domain.to_string(),
            result.method,
            result.verification_success,
            result.response_time_ms,
        );
        if let Some(run_id) = run_id {
            attempt = attempt.with_run_id(run_id.to_string());
        }

        let recorded = async {
            self.repo.insert_attempt(&attempt).await?;
            self.repo
                .mark_opportunity_placed(
                    opportunity.id,
                    result.placement_url.as_deref(),
                    result.method,
                )
                .await
        }
        .await;
        if let Err(e) = recorded {
            // The hold must not stand if the attempt could not be recorded.
            self.release_hold(opportunity, amount, "persistence failure")
                .await;
            return Err(e.into());
        }

        info!(
            opportunity_id = opportunity.id.as_i64(),
            method = %result.method,
            verified = result.verification_success,
            "placement succeeded"
        );
        Ok(PlacementReport {
            opportunity_id: opportunity.id,
            method: result.method,
            placement_url: result.placement_url.clone(),
            verification_success: result.verification_success,
            response_time_ms: result.response_time_ms,
            credits_charged: amount,
        })
    }

    async fn finalize_failure(
        &self,
        opportunity: &Opportunity,
        result: &PlacementResult,
        target_domain: &str,
        run_id: Option<&str>,
        amount: Credits,
    ) -> Result<PlacementReport, PlacementError> {
        let error = result
            .error
            .clone()
            .unwrap_or_else(|| "placement failed".to_string());

        let mut attempt = PlacementAttempt::failed(
            opportunity.id,
            target_domain.to_string(),
            result.method,
            result.response_time_ms,
            error.clone(),
        );
        if let Some(run_id) = run_id {
            attempt = attempt.with_run_id(run_id.to_string());
        }

        let recorded = async {
            self.repo.insert_attempt(&attempt).await?;
            self.repo.mark_opportunity_failed(opportunity.id).await
        }
        .await;

        // Refund symmetrically to the hold whether or not recording worked.
        self.release_hold(opportunity, amount, &error).await;
        recorded?;

        warn!(
            opportunity_id = opportunity.id.as_i64(),
            method = %result.method,
            error = %error,
            "placement failed"
        );
        Err(PlacementError::AttemptFailed {
            opportunity_id: opportunity.id,
            error,
            response_time_ms: result.response_time_ms,
        })
    }

    async fn release_hold(&self, opportunity: &Opportunity, amount: Credits, reason: &str) {
        if let Err(e) = self
            .ledger
            .refund_hold(opportunity.source_user_id, amount, opportunity.id, reason)
            .await
        {
            // The refund itself failing leaves the ledger inconsistent;
            // surface loudly for operational triage.
            warn!(
                opportunity_id = opportunity.id.as_i64(),
                user_id = opportunity.source_user_id.as_i64(),
                error = %e,
                "failed to refund placement hold"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::migrations::init_db;
    use crate::detect::MockPageFetcher;
    use crate::domain::{ContentId, TimeMs};
    use crate::generate::SentenceGenerator;
    use crate::strategy::{MockContentApi, WpPost};
    use tempfile::TempDir;

    const MID: &str = "This middle paragraph talks about seo strategy at length, \
        covering search rankings, content quality, internal structure and the \
        patience required to see any of it pay off across a real site.";

    struct Harness {
        engine: PlacementEngine,
        repo: Arc<Repository>,
        _temp: TempDir,
    }

    fn test_config() -> Config {
        Config {
            port: 0,
            database_path: ":memory:".to_string(),
            admin_token: "secret".to_string(),
            allowed_origins: vec![],
            ai_api_url: None,
            ai_api_key: None,
            ai_model: "gpt-4o-mini".to_string(),
            detect_timeout_ms: 100,
            external_timeout_ms: 100,
            verification_delay_ms: 0,
            domain_fetch_delay_ms: 0,
            recent_posts_count: 10,
            max_live_instructions_per_target: 3,
            max_sentence_chars: 300,
        }
    }

    async fn harness(fetcher: MockPageFetcher, api: MockContentApi) -> Harness {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("test.db").to_string_lossy().to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        let repo = Arc::new(Repository::new(pool));
        let config = test_config();

        let detector = PlatformDetector::new(Arc::new(fetcher));
        let generator = SentenceGenerator::disabled();
        let wordpress = WordPressStrategy::new(
            Arc::new(api),
            generator.clone(),
            config.recent_posts_count,
            Duration::from_millis(config.verification_delay_ms),
            config.max_sentence_chars,
        );
        let injection =
            JsInjectionStrategy::new(repo.clone(), generator, config.max_sentence_chars);
        let ledger = CreditLedger::new(repo.clone());

        let engine = PlacementEngine::new(repo.clone(), detector, wordpress, injection, ledger, config);
        Harness {
            engine,
            repo,
            _temp: temp,
        }
    }

    async fn seed(repo: &Repository, balance: &str, wp_enabled: bool) {
        repo.insert_user(
            UserId::new(1),
            "source@example.com",
            Credits::from_str_canonical(balance).unwrap(),
        )
        .await
        .unwrap();
        repo.insert_user(UserId::new(2), "target@example.com", Credits::zero())
            .await
            .unwrap();
        repo.upsert_domain_metrics(&DomainMetrics {
            user_id: UserId::new(2),
            site_url: "https://target.example.com".to_string(),
            domain: "target.example.com".to_string(),
            wp_api_enabled: wp_enabled,
            wp_username: wp_enabled.then(|| "admin".to_string()),
            wp_app_password: wp_enabled.then(|| "abcd efgh".to_string()),
            authority_score: 40.0,
            refreshed_at: TimeMs::new(0),
        })
        .await
        .unwrap();
    }

    fn opportunity(id: i64, value: &str) -> Opportunity {
        Opportunity::new(
            OpportunityId::new(id),
            UserId::new(1),
            UserId::new(2),
            ContentId::new(100),
            ContentId::new(200),
            "https://source.example.com/guide".to_string(),
            "SEO guide".to_string(),
            Some("seo".to_string()),
            0.9,
            Credits::from_str_canonical(value).unwrap(),
            OpportunityStatus::Approved,
        )
        .unwrap()
    }

    fn wp_confirmed_fetcher() -> MockPageFetcher {
        MockPageFetcher::new().with_page(
            "https://target.example.com/wp-json/wp/v2/posts?per_page=1",
            crate::detect::FetchedPage {
                status: 200,
                body: "[]".to_string(),
            },
        )
    }

    fn wp_posts() -> Vec<WpPost> {
        vec![WpPost {
            id: 7,
            link: "https://target.example.com/a".to_string(),
            title: "Post 7".to_string(),
            content_html: format!("<p>intro</p><p>{}</p><p>outro</p>", MID),
        }]
    }

    #[tokio::test]
    async fn test_content_api_placement_charges_and_places() {
        let h = harness(
            wp_confirmed_fetcher(),
            MockContentApi::new().with_posts(wp_posts()).serving_updates(),
        )
        .await;
        seed(&h.repo, "10", true).await;
        h.repo.insert_opportunity(&opportunity(1, "3")).await.unwrap();

        let report = h
            .engine
            .place_opportunity(OpportunityId::new(1))
            .await
            .unwrap();

        assert_eq!(report.method, PlacementMethod::ContentApi);
        assert!(report.verification_success);
        assert_eq!(report.credits_charged.to_canonical_string(), "3");

        let opp = h
            .repo
            .get_opportunity(OpportunityId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(opp.status, OpportunityStatus::Placed);

        // The hold stands as the charge.
        let balance = h.repo.get_balance(UserId::new(1)).await.unwrap().unwrap();
        assert_eq!(balance.to_canonical_string(), "7");

        let attempts = h
            .repo
            .list_attempts_for_opportunity(OpportunityId::new(1))
            .await
            .unwrap();
        assert_eq!(attempts.len(), 1);
        assert!(attempts[0].success);
    }

    #[tokio::test]
    async fn test_unverified_update_still_places() {
        // Update lands, verification fetch 500s: attempt recorded as
        // success without verification, opportunity placed.
        let h = harness(
            wp_confirmed_fetcher(),
            MockContentApi::new()
                .with_posts(wp_posts())
                .failing_render("server error"),
        )
        .await;
        seed(&h.repo, "10", true).await;
        h.repo.insert_opportunity(&opportunity(1, "3")).await.unwrap();

        let report = h
            .engine
            .place_opportunity(OpportunityId::new(1))
            .await
            .unwrap();
        assert!(!report.verification_success);

        let attempts = h
            .repo
            .list_attempts_for_opportunity(OpportunityId::new(1))
            .await
            .unwrap();
        assert!(attempts[0].success);
        assert!(!attempts[0].verification_success);

        let opp = h
            .repo
            .get_opportunity(OpportunityId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(opp.status, OpportunityStatus::Placed);
    }

    #[tokio::test]
    async fn test_unreachable_site_falls_back_to_injection() {
        // Probe times out entirely: detector degrades, selector picks
        // injection, placement proceeds without error.
        let h = harness(MockPageFetcher::unreachable(), MockContentApi::new()).await;
        seed(&h.repo, "10", true).await;
        h.repo.insert_opportunity(&opportunity(1, "3")).await.unwrap();

        let report = h
            .engine
            .place_opportunity(OpportunityId::new(1))
            .await
            .unwrap();
        assert_eq!(report.method, PlacementMethod::JsInjection);
        assert!(!report.verification_success);

        let instruction = h
            .repo
            .get_instruction_by_opportunity(OpportunityId::new(1))
            .await
            .unwrap();
        assert!(instruction.is_some());
    }

    #[tokio::test]
    async fn test_insufficient_credits_skips_without_side_effects() {
        // Balance 2, value 3: hold refused, nothing written, status kept.
        let h = harness(wp_confirmed_fetcher(), MockContentApi::new().with_posts(wp_posts())).await;
        seed(&h.repo, "2", true).await;
        h.repo.insert_opportunity(&opportunity(1, "3")).await.unwrap();

        let err = h
            .engine
            .place_opportunity(OpportunityId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PlacementError::InsufficientCredits(_)));

        let attempts = h
            .repo
            .list_attempts_for_opportunity(OpportunityId::new(1))
            .await
            .unwrap();
        assert!(attempts.is_empty());
        let txs = h
            .repo
            .list_transactions_for_user(UserId::new(1))
            .await
            .unwrap();
        assert!(txs.is_empty());

        let opp = h
            .repo
            .get_opportunity(OpportunityId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(opp.status, OpportunityStatus::Approved);
    }

    #[tokio::test]
    async fn test_failed_attempt_refunds_hold_exactly() {
        let h = harness(
            wp_confirmed_fetcher(),
            MockContentApi::new()
                .with_posts(wp_posts())
                .failing_update("auth rejected"),
        )
        .await;
        seed(&h.repo, "10", true).await;
        h.repo.insert_opportunity(&opportunity(1, "3")).await.unwrap();

        let err = h
            .engine
            .place_opportunity(OpportunityId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PlacementError::AttemptFailed { .. }));

        // Ledger symmetry: hold and refund cancel out.
        let balance = h.repo.get_balance(UserId::new(1)).await.unwrap().unwrap();
        assert_eq!(balance.to_canonical_string(), "10");
        let sum = h.repo.sum_transactions(UserId::new(1)).await.unwrap();
        assert!(sum.is_zero());

        let txs = h
            .repo
            .list_transactions_for_user(UserId::new(1))
            .await
            .unwrap();
        assert_eq!(txs.len(), 2);

        let opp = h
            .repo
            .get_opportunity(OpportunityId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(opp.status, OpportunityStatus::Failed);

        let attempts = h
            .repo
            .list_attempts_for_opportunity(OpportunityId::new(1))
            .await
            .unwrap();
        assert_eq!(attempts.len(), 1);
        assert!(!attempts[0].success);
    }

    #[tokio::test]
    async fn test_placed_opportunity_never_reattempted() {
        let h = harness(MockPageFetcher::unreachable(), MockContentApi::new()).await;
        seed(&h.repo, "10", false).await;
        h.repo.insert_opportunity(&opportunity(1, "3")).await.unwrap();

        h.engine
            .place_opportunity(OpportunityId::new(1))
            .await
            .unwrap();

        let err = h
            .engine
            .place_opportunity(OpportunityId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PlacementError::NotAttemptable(_, OpportunityStatus::Placed)));

        // And the batch driver no longer sees it.
        let report = h.engine.run_for_user(UserId::new(1)).await.unwrap();
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_at_first_success() {
        let h = harness(MockPageFetcher::unreachable(), MockContentApi::new()).await;
        seed(&h.repo, "10", false).await;
        let mut first = opportunity(1, "3");
        first.match_score = 0.9;
        let mut second = opportunity(2, "3");
        second.match_score = 0.5;
        h.repo.insert_opportunity(&first).await.unwrap();
        h.repo.insert_opportunity(&second).await.unwrap();

        let report = h.engine.run_for_user(UserId::new(1)).await.unwrap();

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].opportunity_id, OpportunityId::new(1));
        assert!(report.outcomes[0].success);

        let second_after = h
            .repo
            .get_opportunity(OpportunityId::new(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second_after.status, OpportunityStatus::Approved);
    }

    #[tokio::test]
    async fn test_run_skips_saturated_target() {
        let h = harness(MockPageFetcher::unreachable(), MockContentApi::new()).await;
        seed(&h.repo, "100", false).await;

        // Fill the live-instruction ceiling for target content 200.
        for id in 1..=3 {
            h.repo.insert_opportunity(&opportunity(id, "3")).await.unwrap();
            h.engine
                .place_opportunity(OpportunityId::new(id))
                .await
                .unwrap();
        }

        h.repo.insert_opportunity(&opportunity(4, "3")).await.unwrap();
        let report = h.engine.run_for_user(UserId::new(1)).await.unwrap();

        assert_eq!(report.outcomes.len(), 1);
        assert!(report.outcomes[0].skipped);
        assert!(report.outcomes[0]
            .error
            .as_deref()
            .unwrap()
            .contains("capacity"));

        // Skipped, not failed.
        let opp = h
            .repo
            .get_opportunity(OpportunityId::new(4))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(opp.status, OpportunityStatus::Approved);
    }

    #[tokio::test]
    async fn test_run_reports_insufficient_credits_as_skip() {
        let h = harness(MockPageFetcher::unreachable(), MockContentApi::new()).await;
        seed(&h.repo, "2", false).await;
        h.repo.insert_opportunity(&opportunity(1, "3")).await.unwrap();

        let report = h.engine.run_for_user(UserId::new(1)).await.unwrap();

        assert_eq!(report.outcomes.len(), 1);
        assert!(report.outcomes[0].skipped);
        assert_eq!(
            report.outcomes[0].error.as_deref(),
            Some("insufficient credits")
        );
    }

    #[tokio::test]
    async fn test_run_continues_past_failures() {
        // First opportunity fails on the content API; the second, against a
        // different target user, succeeds via injection.
        let h = harness(
            wp_confirmed_fetcher(),
            MockContentApi::new()
                .with_posts(wp_posts())
                .failing_update("auth rejected"),
        )
        .await;
        seed(&h.repo, "10", true).await;
        h.repo
            .insert_user(UserId::new(3), "other@example.com", Credits::zero())
            .await
            .unwrap();

        let mut first = opportunity(1, "3");
        first.match_score = 0.9;
        h.repo.insert_opportunity(&first).await.unwrap();

        let mut second = opportunity(2, "3");
        second.match_score = 0.5;
        second.target_user_id = UserId::new(3);
        second.target_content_id = ContentId::new(300);
        h.repo.insert_opportunity(&second).await.unwrap();

        let report = h.engine.run_for_user(UserId::new(1)).await.unwrap();

        assert_eq!(report.outcomes.len(), 2);
        assert!(!report.outcomes[0].success);
        assert!(!report.outcomes[0].skipped);
        assert!(report.outcomes[1].success);

        // Failed hold refunded, successful hold kept.
        let balance = h.repo.get_balance(UserId::new(1)).await.unwrap().unwrap();
        assert_eq!(balance.to_canonical_string(), "7");
    }
}
