//! Health and identity endpoints

use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use signhost_api::Host;
use signhost_api::responses::{HealthResponse, VersionInfo};
use signhost_core::{Identity, SelfDescription};

use crate::api::error::{ApiError, AppError};
use crate::state::AppState;

/// Daemon liveness
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, description = "Daemon is running", body = HealthResponse))
)]
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// This node's own host record, as peers see it during discovery
///
/// # Errors
/// Returns `AppError` if the fleet actor is unavailable
#[utoipa::path(
    get,
    path = "/api/self",
    tag = "system",
    responses(
        (status = 200, description = "Local host record", body = Host),
        (status = 500, body = ApiError)
    )
)]
pub async fn self_description(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.fleet.ask(SelfDescription).await?))
}

/// Light identification used by older discovery peers
///
/// # Errors
/// Returns `AppError` if the fleet actor is unavailable
#[utoipa::path(
    get,
    path = "/api/version",
    tag = "system",
    responses(
        (status = 200, description = "Node id, version and hostname", body = VersionInfo),
        (status = 500, body = ApiError)
    )
)]
pub async fn version(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.fleet.ask(Identity).await?))
}
