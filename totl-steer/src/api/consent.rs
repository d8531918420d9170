//! Consent ledger endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use totl_common::phone::PhoneKey;

use crate::models::ConsentState;
use crate::{ApiError, ApiResult, AppState};

const REASON_ADMIN: &str = "Administrator";

#[derive(Debug, Serialize)]
pub struct ConsentStatusResponse {
    pub phone: String,
    pub state: ConsentState,
    pub may_contact: bool,
}

#[derive(Debug, Deserialize)]
pub struct ClearOptOutRequest {
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct ClearOptOutResponse {
    pub phone: String,
    pub cleared: bool,
}

#[derive(Debug, Deserialize)]
pub struct ForceOptOutRequest {
    pub phone: String,
    #[serde(default)]
    pub reason: Option<String>,
}

fn parse_phone(state: &AppState, raw: &str) -> ApiResult<PhoneKey> {
    let phone = PhoneKey::parse_with_country(raw, &state.config.policy.default_country_code);
    if !phone.has_digits() {
        return Err(ApiError::BadRequest(format!("'{}' is not a phone number", raw)));
    }
    Ok(phone)
}

/// GET /api/consent/:phone
pub async fn get_consent(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<Json<ConsentStatusResponse>> {
    let phone = parse_phone(&state, &raw)?;
    let consent = state.ledger.state(&phone).await?;
    let may_contact = state.ledger.may_contact(&phone).await?;

    Ok(Json(ConsentStatusResponse {
        phone: phone.to_string(),
        state: consent,
        may_contact,
    }))
}

/// POST /api/consent/clear
///
/// Administrative unlock; the member returns to pending, not opted in.
pub async fn clear_opt_out(
    State(state): State<AppState>,
    Json(payload): Json<ClearOptOutRequest>,
) -> ApiResult<Json<ClearOptOutResponse>> {
    let phone = parse_phone(&state, &payload.phone)?;
    let cleared = state.ledger.clear_opt_out(&phone).await?;

    Ok(Json(ClearOptOutResponse {
        phone: phone.to_string(),
        cleared,
    }))
}

/// POST /api/consent/force
pub async fn force_opt_out(
    State(state): State<AppState>,
    Json(payload): Json<ForceOptOutRequest>,
) -> ApiResult<Json<ConsentStatusResponse>> {
    let phone = parse_phone(&state, &payload.phone)?;
    let reason = payload
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(REASON_ADMIN);

    state.ledger.force_opt_out(&phone, reason).await?;

    Ok(Json(ConsentStatusResponse {
        phone: phone.to_string(),
        state: ConsentState::OptedOut,
        may_contact: false,
    }))
}

pub fn consent_routes() -> Router<AppState> {
    Router::new()
        .route("/api/consent/clear", post(clear_opt_out))
        .route("/api/consent/force", post(force_opt_out))
        .route("/api/consent/:phone", get(get_consent))
}
