pub mod health;
pub mod place;
pub mod schedule;

use crate::config::Config;
use crate::db::Repository;
use crate::scheduler::PlacementEngine;
use axum::http::{HeaderValue, Method};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub engine: Arc<PlacementEngine>,
    pub config: Config,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, engine: Arc<PlacementEngine>, config: Config) -> Self {
        Self {
            repo,
            engine,
            config,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    // Browser callers come from the configured allow-list only.
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/place", post(place::place))
        .route("/schedule", post(schedule::schedule))
        .layer(cors)
        .with_state(state)
}
