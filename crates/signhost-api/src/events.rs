//! Roster change events

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Emitted by the store after every successful mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type")]
pub enum RosterEvent {
    HostAdded { ip: String },
    HostUpdated { ip: String },
    HostRemoved { ip: String },
    RosterReplaced { count: usize },
}
