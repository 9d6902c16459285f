//! Backup, restore and snapshot endpoints

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use signhost_api::responses::{BackupCreated, BackupInfo};
use signhost_core::{CoreError, CreateBackup, ImportSnapshot, ListBackups, RestoreBackup};

use crate::api::error::{ApiError, AppError};
use crate::state::AppState;

/// Backups on disk, newest first
///
/// # Errors
/// Returns `AppError` if the backup directory cannot be read
#[utoipa::path(
    get,
    path = "/api/backups",
    tag = "backups",
    responses((status = 200, body = Vec<BackupInfo>), (status = 500, body = ApiError))
)]
pub async fn list_backups(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.fleet.ask(ListBackups).await?))
}

/// Back up the live store now
///
/// # Errors
/// Returns `AppError` if copying fails
#[utoipa::path(
    post,
    path = "/api/backups",
    tag = "backups",
    responses((status = 201, body = BackupCreated), (status = 500, body = ApiError))
)]
pub async fn create_backup(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let created = state.fleet.ask(CreateBackup).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Install a backup as the live store; the current state is backed up first
///
/// # Errors
/// Returns `AppError` if the backup is missing or unusable
#[utoipa::path(
    post,
    path = "/api/backups/{name}/restore",
    tag = "backups",
    params(("name" = String, Path, description = "Backup file name")),
    responses(
        (status = 200, body = BackupCreated),
        (status = 400, body = ApiError),
        (status = 404, body = ApiError)
    )
)]
pub async fn restore_backup(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.fleet.ask(RestoreBackup { name }).await?))
}

/// Replace the live store with an uploaded store file
///
/// # Errors
/// Returns `AppError` if the upload is not a usable store
#[utoipa::path(
    post,
    path = "/api/backups/import",
    tag = "backups",
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses((status = 200, body = BackupCreated), (status = 400, body = ApiError))
)]
pub async fn import_snapshot(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let created = state
        .fleet
        .ask(ImportSnapshot {
            bytes: body.to_vec(),
        })
        .await?;
    Ok(Json(created))
}

/// Download the live store file
///
/// # Errors
/// Returns `AppError` if the file cannot be read
#[utoipa::path(
    get,
    path = "/api/backups/snapshot",
    tag = "backups",
    responses(
        (status = 200, content_type = "application/octet-stream", body = Vec<u8>),
        (status = 500, body = ApiError)
    )
)]
pub async fn snapshot(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let bytes = state.store.snapshot_bytes().map_err(CoreError::from)?;
    let name = state
        .config
        .store
        .path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("hosts.db");
    let disposition = format!("attachment; filename=\"{name}\"");
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}
