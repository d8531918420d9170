//! Campaign endpoints

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use crate::services::CampaignReport;
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct OnboardingRequest {
    pub plan_id: i64,
}

/// POST /api/campaigns/onboarding
///
/// **Request:** `{"plan_id": 1}`
/// **Response:** `{"sent": n, "blocked": n, "failed": n}`
///
/// Invites every member of the plan who has not yet opted in or out.
pub async fn send_onboarding(
    State(state): State<AppState>,
    Json(payload): Json<OnboardingRequest>,
) -> ApiResult<Json<CampaignReport>> {
    Ok(Json(state.campaign.send_onboarding(payload.plan_id).await?))
}

pub fn campaign_routes() -> Router<AppState> {
    Router::new().route("/api/campaigns/onboarding", post(send_onboarding))
}
