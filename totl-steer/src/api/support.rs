//! Human-support queue endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::models::SupportMessage;
use crate::services::SendOutcome;
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct SupportReplyRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SupportReplyResponse {
    pub id: i64,
    pub delivery: SendOutcome,
}

/// GET /api/support
pub async fn list_pending(State(state): State<AppState>) -> ApiResult<Json<Vec<SupportMessage>>> {
    Ok(Json(state.support.list_pending().await?))
}

/// POST /api/support/:id/reply
pub async fn reply(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<SupportReplyRequest>,
) -> ApiResult<Json<SupportReplyResponse>> {
    let delivery = state.support.reply(id, &payload.text).await?;
    Ok(Json(SupportReplyResponse { id, delivery }))
}

/// POST /api/support/:id/resolve
pub async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    state.support.resolve(id).await?;
    Ok(Json(serde_json::json!({ "id": id, "status": "resolved" })))
}

pub fn support_routes() -> Router<AppState> {
    Router::new()
        .route("/api/support", get(list_pending))
        .route("/api/support/:id/reply", post(reply))
        .route("/api/support/:id/resolve", post(resolve))
}
