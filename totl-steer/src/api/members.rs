//! Member audit views

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::db;
use crate::models::{Member, MemberInteraction, ReferralEvent};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct MemberHistoryResponse {
    pub member: Member,
    pub referrals: Vec<ReferralEvent>,
    pub interactions: Vec<MemberInteraction>,
}

/// GET /api/members/:id/interactions
///
/// `id` is the internal row id.
pub async fn member_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<MemberHistoryResponse>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Internal(format!("Database unavailable: {}", e)))?;

    let member = db::members::find_by_id(&mut conn, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Member {}", id)))?;
    let referrals = db::referrals::list_for_member(&mut conn, id).await?;
    let interactions = db::interactions::list_for_member(&mut conn, id).await?;

    Ok(Json(MemberHistoryResponse {
        member,
        referrals,
        interactions,
    }))
}

pub fn member_routes() -> Router<AppState> {
    Router::new().route("/api/members/:id/interactions", get(member_history))
}
