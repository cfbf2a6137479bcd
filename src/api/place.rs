use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{Credits, OpportunityId, UserId};
use crate::error::AppError;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceRequest {
    pub opportunity_id: i64,
    pub user_id: Option<i64>,
    #[serde(default)]
    pub manual_override: bool,
}

#[derive(Debug, Serialize)]
pub struct PlaceResponse {
    pub success: bool,
    pub placement_url: Option<String>,
    pub placement_method: String,
    pub response_time_ms: i64,
    pub verification_success: bool,
    pub credits_charged: Credits,
}

/// Length-independent token comparison: hash both sides before comparing.
fn token_matches(provided: &str, expected: &str) -> bool {
    use sha2::{Digest, Sha256};
    Sha256::digest(provided.as_bytes()) == Sha256::digest(expected.as_bytes())
}

pub async fn place(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PlaceRequest>,
) -> Result<Json<PlaceResponse>, AppError> {
    let opportunity_id = OpportunityId::new(request.opportunity_id);
    let opportunity = state.engine.load_opportunity(opportunity_id).await?;

    if request.manual_override {
        let provided = headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !token_matches(provided, &state.config.admin_token) {
            return Err(AppError::Unauthorized(
                "manualOverride requires a valid admin token".to_string(),
            ));
        }
    } else {
        let user_id = request
            .user_id
            .ok_or_else(|| AppError::BadRequest("userId is required".to_string()))?;
        if UserId::new(user_id) != opportunity.source_user_id {
            return Err(AppError::Unauthorized(
                "userId does not own this opportunity".to_string(),
            ));
        }
    }

    let report = state.engine.place_opportunity(opportunity_id).await?;

    Ok(Json(PlaceResponse {
        success: true,
        placement_url: report.placement_url,
        placement_method: report.method.as_str().to_string(),
        response_time_ms: report.response_time_ms,
        verification_success: report.verification_success,
        credits_charged: report.credits_charged,
    }))
}
