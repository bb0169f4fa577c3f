//! Handlers for the `/animations` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use memoria_core::animation::ProviderKind;
use memoria_core::types::DbId;
use serde::Deserialize;

use crate::engine::AnimateRequest;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters for the status endpoint.
#[derive(Debug, Deserialize)]
pub struct StatusParams {
    pub provider: Option<String>,
    /// Fallback lookup key when the handle is not indexed yet.
    pub media_id: Option<DbId>,
}

/// POST /api/v1/animations
///
/// Record and enqueue an animation request. Returns 202 with the job handle
/// immediately; provider submission happens in the worker.
pub async fn create_animation(
    State(state): State<AppState>,
    Json(input): Json<AnimateRequest>,
) -> AppResult<impl IntoResponse> {
    let dispatched = state.dispatcher.dispatch(input).await?;
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: dispatched })))
}

/// GET /api/v1/animations/{job_handle}/status
///
/// Normalized status of a job. An unknown handle is a `not_found` status,
/// not an HTTP 404, so pollers can keep waiting for a job that is not
/// visible yet.
pub async fn get_animation_status(
    State(state): State<AppState>,
    Path(job_handle): Path<String>,
    Query(params): Query<StatusParams>,
) -> AppResult<impl IntoResponse> {
    let provider = params
        .provider
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(str::parse::<ProviderKind>)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let view = state
        .status
        .resolve(&job_handle, provider, params.media_id)
        .await?;

    Ok(Json(DataResponse { data: view }))
}
