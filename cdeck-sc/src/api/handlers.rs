//! HTTP request handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use cdeck_common::{normalize, types::CompositionRequest, types::JobStatus};
use serde::Serialize;
use tracing::{info, warn};

use super::server::AppContext;
use crate::error::Error;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeAccepted {
    job_id: String,
    status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn err_response(status: StatusCode, message: impl Into<String>) -> HandlerError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health - liveness; not authenticated
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "cdeck-sc".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: cdeck_common::time::now().to_rfc3339(),
    })
}

/// POST /compose - validate, register, and enqueue a composition job.
///
/// The full timeline is normalized here so a request that could never
/// render is rejected with 400 before a job exists and before any asset
/// is fetched. On a full queue the just-registered job is rolled back
/// and the caller gets 503.
pub async fn compose(
    State(ctx): State<AppContext>,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<ComposeAccepted>), HandlerError> {
    // deserialize by hand so a missing field answers 400, not 422
    let request: CompositionRequest = serde_json::from_value(body)
        .map_err(|e| err_response(StatusCode::BAD_REQUEST, format!("malformed request: {e}")))?;

    request
        .validate()
        .map_err(|e| err_response(StatusCode::BAD_REQUEST, e.to_string()))?;

    normalize(&request.shots, &request.audio_tracks)
        .map_err(|e| err_response(StatusCode::BAD_REQUEST, e.to_string()))?;

    let job_id = request.job_id.clone();
    ctx.registry
        .insert(&job_id)
        .await
        .map_err(|e| err_response(StatusCode::BAD_REQUEST, e.to_string()))?;

    if let Err(e) = ctx.queue.try_enqueue(request) {
        ctx.registry.remove(&job_id).await;
        warn!(job_id = %job_id, error = %e, "composition rejected, queue full");
        let status = match e {
            Error::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        return Err(err_response(status, e.to_string()));
    }

    info!(job_id = %job_id, "composition job accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(ComposeAccepted {
            job_id,
            status: "processing".to_string(),
        }),
    ))
}

/// GET /status/:job_id - current registry entry for one job
pub async fn job_status(
    State(ctx): State<AppContext>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatus>, HandlerError> {
    match ctx.registry.get(&job_id).await {
        Some(status) => Ok(Json(status)),
        None => Err(err_response(
            StatusCode::NOT_FOUND,
            format!("unknown job: {job_id}"),
        )),
    }
}
