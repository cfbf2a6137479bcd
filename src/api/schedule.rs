use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::UserId;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub user_id: Option<i64>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResponse {
    pub success: bool,
    pub run_id: String,
    pub results: Vec<ScheduleResultDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResultDto {
    pub opportunity_id: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub skipped: bool,
}

pub async fn schedule(
    State(state): State<AppState>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<ScheduleResponse>, AppError> {
    let user_id = match (request.user_id, request.email.as_deref()) {
        (Some(id), _) => UserId::new(id),
        (None, Some(email)) => state
            .repo
            .get_user_id_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no user with email {}", email)))?,
        (None, None) => {
            return Err(AppError::BadRequest(
                "userId or email is required".to_string(),
            ))
        }
    };

    let report = state.engine.run_for_user(user_id).await?;

    Ok(Json(ScheduleResponse {
        success: true,
        run_id: report.run_id,
        results: report
            .outcomes
            .into_iter()
            .map(|o| ScheduleResultDto {
                opportunity_id: o.opportunity_id.as_i64(),
                success: o.success,
                placement_url: o.placement_url,
                error: o.error,
                skipped: o.skipped,
            })
            .collect(),
    }))
}
