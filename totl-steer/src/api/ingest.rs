//! Feed ingestion endpoint

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};

use crate::ingest::{IngestKind, IngestReport, RawRecord};
use crate::{ApiError, ApiResult, AppState};

/// POST /api/ingest/:kind
///
/// **Request:** JSON array of flat records
/// **Response:** `{"processed": n, "errors": ["Record 2 (M-100): ..."]}`
///
/// Per-record failures are reported in the body; the request itself only
/// fails for an unknown kind.
pub async fn ingest_batch(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(records): Json<Vec<RawRecord>>,
) -> ApiResult<Json<IngestReport>> {
    let kind: IngestKind = kind.parse().map_err(ApiError::BadRequest)?;
    let report = state.ingestor.ingest(kind, &records).await;
    Ok(Json(report))
}

pub fn ingest_routes() -> Router<AppState> {
    Router::new().route("/api/ingest/:kind", post(ingest_batch))
}
