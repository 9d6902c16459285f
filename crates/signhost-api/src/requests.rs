//! Request types for the API

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Inline edit of the operator-owned fields of a host
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct EditHostRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpn_ip_address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DiscoveryRequest {
    /// Scan only the /24 around this address instead of the local interfaces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PushRequest {
    /// Peer addresses; empty means every known non-loopback host
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PullRequest {
    pub peer: String,
}

/// Query string of the receive endpoint
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
pub struct ReceiveQuery {
    #[serde(default)]
    pub merge: bool,
}
