//! Discovery and gossip endpoints

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use signhost_api::Host;
use signhost_api::requests::{DiscoveryRequest, PullRequest, PushRequest, ReceiveQuery};
use signhost_api::responses::{Accepted, ReceiveReport};
use signhost_core::{PullRoster, PushRoster, ReceiveRoster, StartDiscovery};
use tracing::info;

use crate::api::error::{ApiError, AppError};
use crate::state::AppState;

/// Start a discovery scan in the background
///
/// # Errors
/// Returns `AppError` for a malformed interface address
#[utoipa::path(
    post,
    path = "/api/discovery",
    tag = "fleet",
    request_body = DiscoveryRequest,
    responses((status = 202, body = Accepted), (status = 400, body = ApiError))
)]
pub async fn start_discovery(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DiscoveryRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .fleet
        .ask(StartDiscovery {
            interface_address: req.interface_address,
        })
        .await?;
    Ok((StatusCode::ACCEPTED, Json(Accepted::new("discovery started"))))
}

/// Push the roster to peers in the background
///
/// # Errors
/// Returns `AppError` if the fleet actor is unavailable
#[utoipa::path(
    post,
    path = "/api/fleet/push",
    tag = "fleet",
    request_body = PushRequest,
    responses((status = 202, body = Accepted))
)]
pub async fn push(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PushRequest>,
) -> Result<impl IntoResponse, AppError> {
    let message = if req.targets.is_empty() {
        "pushing roster to all peers".to_string()
    } else {
        format!("pushing roster to {} peer(s)", req.targets.len())
    };
    state
        .fleet
        .ask(PushRoster {
            targets: req.targets,
        })
        .await?;
    Ok((StatusCode::ACCEPTED, Json(Accepted::new(message))))
}

/// Pull a peer's roster and merge it in the background
///
/// # Errors
/// Returns `AppError` for a malformed peer address
#[utoipa::path(
    post,
    path = "/api/fleet/pull",
    tag = "fleet",
    request_body = PullRequest,
    responses((status = 202, body = Accepted), (status = 400, body = ApiError))
)]
pub async fn pull(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PullRequest>,
) -> Result<impl IntoResponse, AppError> {
    let message = format!("pulling roster from {}", req.peer);
    state.fleet.ask(PullRoster { peer: req.peer }).await?;
    Ok((StatusCode::ACCEPTED, Json(Accepted::new(message))))
}

/// Receive a roster from a peer (merge or replace)
///
/// # Errors
/// Returns `AppError` if persisting the roster fails
#[utoipa::path(
    post,
    path = "/api/fleet/receive",
    tag = "fleet",
    params(("merge" = Option<bool>, Query, description = "Merge instead of replace")),
    request_body = Vec<Host>,
    responses((status = 200, body = ReceiveReport), (status = 500, body = ApiError))
)]
pub async fn receive(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReceiveQuery>,
    Json(hosts): Json<Vec<Host>>,
) -> Result<impl IntoResponse, AppError> {
    info!(count = hosts.len(), merge = query.merge, "roster received");
    let report = state
        .fleet
        .ask(ReceiveRoster {
            hosts,
            merge: query.merge,
        })
        .await?;
    Ok(Json(report))
}
