//! Configuration types for fleet operations

use std::time::Duration;

use serde::{Deserialize, Serialize};
use signhost_api::Host;

/// Fleet-wide tunables
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Port peers serve their HTTP API on
    pub peer_port: u16,
    /// Per-call timeout for peer requests
    pub peer_timeout: Duration,
    /// Port dialled by the discovery scan
    pub discovery_port: u16,
    /// Backups kept by receive (replace mode) and manual backups
    pub max_backups: usize,
    /// Backups kept by restores and imports
    pub import_max_backups: usize,
    /// Probes in flight during a sweep
    pub probe_concurrency: usize,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            peer_port: 8000,
            peer_timeout: Duration::from_secs(3),
            discovery_port: 8000,
            max_backups: 10,
            import_max_backups: 20,
            probe_concurrency: 16,
        }
    }
}

/// Who this node is within the fleet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Stable node id, persisted across restarts
    pub id: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub hostname: String,
    /// Primary address, empty when none could be detected
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub vpn_ip_address: String,
}

impl NodeIdentity {
    /// Fresh roster record describing this node
    #[must_use]
    pub fn to_host(&self) -> Host {
        Host {
            id: self.id.clone(),
            nickname: self.nickname.clone(),
            hostname: self.hostname.clone(),
            ip_address: self.ip_address.clone(),
            vpn_ip_address: self.vpn_ip_address.clone(),
            ..Host::default()
        }
    }

    /// Whether `ip` is one of this node's own addresses
    #[must_use]
    pub fn owns(&self, ip: &str) -> bool {
        !ip.is_empty() && (ip == self.ip_address || ip == self.vpn_ip_address)
    }
}
