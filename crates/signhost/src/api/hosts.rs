//! Roster endpoints

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use signhost_api::Host;
use signhost_api::requests::EditHostRequest;
use signhost_api::responses::Accepted;
use signhost_core::{
    AddHost, EditHost, GetHost, ListRoster, ProbeHost, ProbeSweep, RemoveHost, SetPrimary,
};

use crate::api::error::{ApiError, AppError};
use crate::state::AppState;

/// The full roster in storage order
///
/// # Errors
/// Returns `AppError` if the fleet actor is unavailable
#[utoipa::path(
    get,
    path = "/api/hosts",
    tag = "hosts",
    responses((status = 200, body = Vec<Host>))
)]
pub async fn list_hosts(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.fleet.ask(ListRoster).await?))
}

/// Add a host; an empty id is assigned, the host is probed in the background
///
/// # Errors
/// Returns `AppError` for malformed or already used addresses
#[utoipa::path(
    post,
    path = "/api/hosts",
    tag = "hosts",
    request_body = Host,
    responses(
        (status = 201, body = Host),
        (status = 400, body = ApiError),
        (status = 409, body = ApiError)
    )
)]
pub async fn add_host(
    State(state): State<Arc<AppState>>,
    Json(host): Json<Host>,
) -> Result<impl IntoResponse, AppError> {
    let host = state.fleet.ask(AddHost { host }).await?;
    Ok((StatusCode::CREATED, Json(host)))
}

/// # Errors
/// Returns `AppError` if no host has this address
#[utoipa::path(
    get,
    path = "/api/hosts/{ip}",
    tag = "hosts",
    params(("ip" = String, Path, description = "Primary address")),
    responses((status = 200, body = Host), (status = 404, body = ApiError))
)]
pub async fn get_host(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.fleet.ask(GetHost { ip }).await?))
}

/// Inline edit of nickname, hostname, notes or addresses
///
/// # Errors
/// Returns `AppError` if the host is missing or the edit is rejected
#[utoipa::path(
    patch,
    path = "/api/hosts/{ip}",
    tag = "hosts",
    params(("ip" = String, Path, description = "Primary address")),
    request_body = EditHostRequest,
    responses(
        (status = 200, body = Host),
        (status = 400, body = ApiError),
        (status = 404, body = ApiError),
        (status = 409, body = ApiError)
    )
)]
pub async fn edit_host(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
    Json(edit): Json<EditHostRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.fleet.ask(EditHost { ip, edit }).await?))
}

/// Remove a host; returns the removed record
///
/// # Errors
/// Returns `AppError` if no host has this address
#[utoipa::path(
    delete,
    path = "/api/hosts/{ip}",
    tag = "hosts",
    params(("ip" = String, Path, description = "Primary address")),
    responses((status = 200, body = Host), (status = 404, body = ApiError))
)]
pub async fn delete_host(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.fleet.ask(RemoveHost { ip }).await?))
}

/// Keep this record as the only one with its hostname
///
/// # Errors
/// Returns `AppError` if no host has this address
#[utoipa::path(
    post,
    path = "/api/hosts/{ip}/primary",
    tag = "hosts",
    params(("ip" = String, Path, description = "Primary address")),
    responses(
        (status = 200, description = "Removed duplicates", body = Vec<Host>),
        (status = 404, body = ApiError)
    )
)]
pub async fn set_primary(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.fleet.ask(SetPrimary { ip }).await?))
}

/// Probe one host in the background
///
/// # Errors
/// Returns `AppError` if no host has this address
#[utoipa::path(
    post,
    path = "/api/hosts/{ip}/probe",
    tag = "hosts",
    params(("ip" = String, Path, description = "Primary address")),
    responses((status = 202, body = Accepted), (status = 404, body = ApiError))
)]
pub async fn probe_host(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.fleet.ask(ProbeHost { ip: ip.clone() }).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(Accepted::new(format!("probing {ip}"))),
    ))
}

/// Probe every host in the background
///
/// # Errors
/// Returns `AppError` if the fleet actor is unavailable
#[utoipa::path(
    post,
    path = "/api/probe",
    tag = "hosts",
    responses((status = 202, body = Accepted))
)]
pub async fn probe_all(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    state.fleet.ask(ProbeSweep).await?;
    Ok((StatusCode::ACCEPTED, Json(Accepted::new("probe sweep started"))))
}
