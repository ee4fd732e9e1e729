//! Cause endpoints.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::CauseProgressDto;
use crate::app_state::AppState;
use crate::domain::CauseId;
use crate::error::{DonationError, ErrorResponse};

/// `GET /causes/{id}/progress` — Current funding progress.
///
/// # Errors
///
/// Returns [`DonationError::CauseNotFound`] for an unknown id.
#[utoipa::path(
    get,
    path = "/api/v1/causes/{id}/progress",
    tag = "Causes",
    summary = "Cause progress",
    description = "Raised amount, percentage of goal (capped at 100) and completed donation count.",
    params(
        ("id" = uuid::Uuid, Path, description = "Cause UUID"),
    ),
    responses(
        (status = 200, description = "Current progress", body = CauseProgressDto),
        (status = 404, description = "Cause not found", body = ErrorResponse),
    )
)]
pub async fn cause_progress(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, DonationError> {
    let progress = state
        .donations
        .cause_progress(CauseId::from_uuid(id))
        .await?;
    Ok(Json(CauseProgressDto::from(progress)))
}

/// Cause routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/causes/{id}/progress", get(cause_progress))
}
