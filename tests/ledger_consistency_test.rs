//! End-to-end checks that the credit ledger stays consistent across
//! placement success and failure paths.

use axum::http::StatusCode;
use linkloom::api::{self, AppState};
use linkloom::config::Config;
use linkloom::db::init_db;
use linkloom::detect::{FetchedPage, MockPageFetcher, PlatformDetector};
use linkloom::domain::{
    ContentId, Credits, DomainMetrics, Opportunity, OpportunityId, OpportunityStatus, TimeMs,
    TransactionKind, UserId,
};
use linkloom::generate::SentenceGenerator;
use linkloom::ledger::CreditLedger;
use linkloom::scheduler::PlacementEngine;
use linkloom::strategy::{JsInjectionStrategy, MockContentApi, WordPressStrategy, WpPost};
use linkloom::Repository;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

const MID: &str = "This middle paragraph talks about seo strategy at length, \
    covering search rankings, content quality, internal structure and the \
    patience required to see any of it pay off across a real site.";

fn test_config() -> Config {
    Config {
        port: 0,
        database_path: ":memory:".to_string(),
        admin_token: "super-secret".to_string(),
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

async fn setup_test_app(
    content_api: MockContentApi,
) -> (axum::Router, Arc<MockContentApi>, Arc<Repository>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();

    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let config = test_config();

    let fetcher = MockPageFetcher::new().with_page(
        "https://target.example.com/wp-json/wp/v2/posts?per_page=1",
        FetchedPage {
            status: 200,
            body: "[]".to_string(),
        },
    );
    let content_api = Arc::new(content_api);

    let detector = PlatformDetector::new(Arc::new(fetcher));
    let generator = SentenceGenerator::disabled();
    let wordpress = WordPressStrategy::new(
        content_api.clone(),
        generator.clone(),
        config.recent_posts_count,
        Duration::from_millis(config.verification_delay_ms),
        config.max_sentence_chars,
    );
    let injection = JsInjectionStrategy::new(repo.clone(), generator, config.max_sentence_chars);
    let ledger = CreditLedger::new(repo.clone());
    let engine = Arc::new(PlacementEngine::new(
        repo.clone(),
        detector,
        wordpress,
        injection,
        ledger,
        config.clone(),
    ));

    let app = api::create_router(AppState::new(repo.clone(), engine, config));
    (app, content_api, repo, temp_dir)
}

async fn seed(repo: &Repository) {
    repo.insert_user(
        UserId::new(1),
        "source@example.com",
        Credits::from_str_canonical("10").unwrap(),
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
        wp_api_enabled: true,
        wp_username: Some("admin".to_string()),
        wp_app_password: Some("abcd efgh".to_string()),
        authority_score: 30.0,
        refreshed_at: TimeMs::new(0),
    })
    .await
    .unwrap();
}

fn opportunity() -> Opportunity {
    Opportunity::new(
        OpportunityId::new(1),
        UserId::new(1),
        UserId::new(2),
        ContentId::new(100),
        ContentId::new(200),
        "https://source.example.com/guide".to_string(),
        "SEO guide".to_string(),
        Some("seo".to_string()),
        0.9,
        Credits::from_str_canonical("3").unwrap(),
        OpportunityStatus::Approved,
    )
    .unwrap()
}

fn wp_posts() -> Vec<WpPost> {
    vec![WpPost {
        id: 7,
        link: "https://target.example.com/a".to_string(),
        title: "Post 7".to_string(),
        content_html: format!("<p>intro</p><p>{}</p><p>outro</p>", MID),
    }]
}

async fn place(app: axum::Router) -> (StatusCode, serde_json::Value) {
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/place")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(
            serde_json::json!({"opportunityId": 1, "userId": 1}).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_successful_placement_keeps_hold_as_charge() {
    let (app, content_api, repo, _temp) =
        setup_test_app(MockContentApi::new().with_posts(wp_posts()).serving_updates()).await;
    seed(&repo).await;
    repo.insert_opportunity(&opportunity()).await.unwrap();

    let (status, body) = place(app).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["placement_method"], "content_api");
    assert_eq!(body["verification_success"], true);

    // The inserted sentence carries the anchor, mid-paragraph.
    let updates = content_api.updates();
    assert_eq!(updates.len(), 1);
    assert!(updates[0]
        .1
        .contains(r#"href="https://source.example.com/guide""#));
    assert!(updates[0].1.starts_with("<p>intro</p>"));

    // Exactly one ledger row: the hold stands as the charge.
    let balance = repo.get_balance(UserId::new(1)).await.unwrap().unwrap();
    assert_eq!(balance.to_canonical_string(), "7");
    let txs = repo
        .list_transactions_for_user(UserId::new(1))
        .await
        .unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].kind, TransactionKind::Hold);
    assert_eq!(txs[0].balance_before.to_canonical_string(), "10");
    assert_eq!(txs[0].balance_after.to_canonical_string(), "7");
}

#[tokio::test]
async fn test_failed_placement_refunds_symmetrically() {
    let (app, _content_api, repo, _temp) = setup_test_app(
        MockContentApi::new()
            .with_posts(wp_posts())
            .failing_update("auth rejected"),
    )
    .await;
    seed(&repo).await;
    repo.insert_opportunity(&opportunity()).await.unwrap();

    let (status, body) = place(app).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("auth rejected"));

    // Hold and refund cancel: balance back where it started, transaction
    // sum over the run is zero.
    let balance = repo.get_balance(UserId::new(1)).await.unwrap().unwrap();
    assert_eq!(balance.to_canonical_string(), "10");
    let sum = repo.sum_transactions(UserId::new(1)).await.unwrap();
    assert!(sum.is_zero());

    let txs = repo
        .list_transactions_for_user(UserId::new(1))
        .await
        .unwrap();
    assert_eq!(txs.len(), 2);
    assert_eq!(txs[0].kind, TransactionKind::Hold);
    assert_eq!(txs[1].kind, TransactionKind::Credit);
    assert_eq!(txs[0].amount, -txs[1].amount);
    assert!(txs[1].refund_reason.is_some());
    assert_eq!(txs[1].balance_after.to_canonical_string(), "10");
}

#[tokio::test]
async fn test_failed_attempt_is_terminal_for_the_run() {
    let (app, _content_api, repo, _temp) = setup_test_app(
        MockContentApi::new()
            .with_posts(wp_posts())
            .failing_update("auth rejected"),
    )
    .await;
    seed(&repo).await;
    repo.insert_opportunity(&opportunity()).await.unwrap();

    place(app.clone()).await;

    // No internal retry: the opportunity is failed and a second call is a
    // validation error, not a new attempt.
    let opp = repo
        .get_opportunity(OpportunityId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(opp.status, OpportunityStatus::Failed);

    let (status, _body) = place(app).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let attempts = repo
        .list_attempts_for_opportunity(OpportunityId::new(1))
        .await
        .unwrap();
    assert_eq!(attempts.len(), 1);
}
