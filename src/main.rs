use linkloom::api::{self, AppState};
use linkloom::config::Config;
use linkloom::db::init_db;
use linkloom::detect::{HttpPageFetcher, PlatformDetector};
use linkloom::generate::{ChatCompletionClient, SentenceGenerator, SentenceModel};
use linkloom::ledger::CreditLedger;
use linkloom::scheduler::PlacementEngine;
use linkloom::strategy::{JsInjectionStrategy, WordPressStrategy, WpRestClient};
use linkloom::Repository;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    // Initialize database and dependencies
    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));

    let detector = PlatformDetector::new(Arc::new(HttpPageFetcher::new(Duration::from_millis(
        config.detect_timeout_ms,
    ))));

    let model: Option<Arc<dyn SentenceModel>> = config.ai_api_url.as_ref().map(|url| {
        Arc::new(ChatCompletionClient::new(
            url.clone(),
            config.ai_model.clone(),
            config.ai_api_key.clone(),
            Duration::from_millis(config.external_timeout_ms),
        )) as Arc<dyn SentenceModel>
    });
    let generator = SentenceGenerator::new(model);

    let wordpress = WordPressStrategy::new(
        Arc::new(WpRestClient::new(Duration::from_millis(
            config.external_timeout_ms,
        ))),
        generator.clone(),
        config.recent_posts_count,
        Duration::from_millis(config.verification_delay_ms),
        config.max_sentence_chars,
    );
    let injection =
        JsInjectionStrategy::new(repo.clone(), generator, config.max_sentence_chars);
    let ledger = CreditLedger::new(repo.clone());

    let engine = Arc::new(PlacementEngine::new(
        repo.clone(),
        detector,
        wordpress,
        injection,
        ledger,
        config.clone(),
    ));

    // Create router
    let app = api::create_router(AppState::new(repo, engine, config));

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    // Run server
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
