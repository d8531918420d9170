//! Carrier webhook for inbound texts

use axum::{extract::State, routing::post, Json, Router};

use crate::services::{InboundMessage, InboundReply};
use crate::{ApiResult, AppState};

/// POST /api/inbound
///
/// **Request:** `{"sender_phone": "+15551234567", "body": "STOP", "media_count": 0}`
/// **Response:** `{"reply_text": "..."}`; an empty reply means send nothing
pub async fn receive_message(
    State(state): State<AppState>,
    Json(mut message): Json<InboundMessage>,
) -> ApiResult<Json<InboundReply>> {
    if let Some(url) = message.media_url.take() {
        message.media_url = Some(absolute_media_url(
            &state.config.messaging.public_base_url,
            &url,
        ));
    }

    let reply = state.inbound.handle(&message).await?;
    Ok(Json(reply))
}

/// Carriers may hand over paths relative to the public host
fn absolute_media_url(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }
}

pub fn inbound_routes() -> Router<AppState> {
    Router::new().route("/api/inbound", post(receive_message))
}
