//! Host record: the unit of roster state

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::address::{AddressError, validate_ipv4};

/// Operational status of a host on one network path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    /// Never probed, or waiting for a re-probe
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
    Unreachable,
    ConnectionRefused,
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostStatus::Unknown => "unknown",
            HostStatus::Healthy => "healthy",
            HostStatus::Unhealthy => "unhealthy",
            HostStatus::Unreachable => "unreachable",
            HostStatus::ConnectionRefused => "connection_refused",
        };
        f.write_str(s)
    }
}

impl HostStatus {
    /// Parse the stored/wire representation, falling back to `Unknown`
    #[must_use]
    pub fn parse_lossy(s: &str) -> Self {
        match s {
            "healthy" => HostStatus::Healthy,
            "unhealthy" => HostStatus::Unhealthy,
            "unreachable" => HostStatus::Unreachable,
            "connection_refused" => HostStatus::ConnectionRefused,
            _ => HostStatus::Unknown,
        }
    }
}

/// Status of the content-management service on a host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CmsStatus {
    #[default]
    Unknown,
    Online,
    Offline,
}

impl fmt::Display for CmsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmsStatus::Unknown => "unknown",
            CmsStatus::Online => "online",
            CmsStatus::Offline => "offline",
        };
        f.write_str(s)
    }
}

impl CmsStatus {
    /// Parse the stored/wire representation, falling back to `Unknown`
    #[must_use]
    pub fn parse_lossy(s: &str) -> Self {
        match s {
            "online" => CmsStatus::Online,
            "offline" => CmsStatus::Offline,
            _ => CmsStatus::Unknown,
        }
    }
}

/// Which network path of a host a probe result belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkPath {
    Primary,
    Vpn,
}

impl fmt::Display for NetworkPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkPath::Primary => f.write_str("primary"),
            NetworkPath::Vpn => f.write_str("vpn"),
        }
    }
}

/// Probe-owned state of one network path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkState {
    pub status: HostStatus,
    /// Service status text reported by the health endpoint
    pub service_status: String,
    /// Service version reported by the health endpoint
    pub service_version: String,
    /// Signage software version reported by the CMS
    pub cms_version: String,
    /// Signage software status text reported by the CMS
    pub cms_app_status: String,
    pub cms_status: CmsStatus,
    pub asset_count: u32,
    pub dashboard_url: String,
    pub last_checked: Option<DateTime<Utc>>,
}

/// One entry in the fleet roster
///
/// Field names are the canonical peer wire format. Missing fields take their
/// defaults so partial payloads from older peers still deserialize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Host {
    pub nickname: String,
    pub ip_address: String,
    /// Secondary (VPN) address, empty when absent
    pub vpn_ip_address: String,
    pub hostname: String,
    pub notes: String,
    pub status: HostStatus,
    pub status_vpn: HostStatus,
    pub nsm_status: String,
    pub nsm_status_vpn: String,
    pub nsm_version: String,
    pub nsm_version_vpn: String,
    pub anthias_version: String,
    pub anthias_version_vpn: String,
    pub anthias_status: String,
    pub anthias_status_vpn: String,
    pub cms_status: CmsStatus,
    pub cms_status_vpn: CmsStatus,
    pub asset_count: u32,
    pub asset_count_vpn: u32,
    pub dashboard_url: String,
    pub dashboard_url_vpn: String,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_checked_vpn: Option<DateTime<Utc>>,
    /// Stable identifier, survives address changes
    pub id: String,
}

impl Host {
    /// Create a record with only an address set
    #[must_use]
    pub fn with_address(ip: impl Into<String>) -> Self {
        Self {
            ip_address: ip.into(),
            ..Self::default()
        }
    }

    /// Address of the given network path, if present
    #[must_use]
    pub fn address(&self, path: NetworkPath) -> Option<&str> {
        let addr = match path {
            NetworkPath::Primary => self.ip_address.as_str(),
            NetworkPath::Vpn => self.vpn_ip_address.as_str(),
        };
        (!addr.is_empty()).then_some(addr)
    }

    /// Check both addresses for syntactic validity
    ///
    /// An empty address is accepted: it means "not known" for the primary
    /// path and "absent" for the VPN path.
    ///
    /// # Errors
    /// Returns `AddressError` naming the first malformed address.
    pub fn validate(&self) -> Result<(), AddressError> {
        for addr in [&self.ip_address, &self.vpn_ip_address] {
            if !addr.is_empty() {
                validate_ipv4(addr)?;
            }
        }
        Ok(())
    }

    /// Trim whitespace around both addresses
    pub fn normalize_addresses(&mut self) {
        self.ip_address = self.ip_address.trim().to_string();
        self.vpn_ip_address = self.vpn_ip_address.trim().to_string();
    }

    /// Copy out the probe-owned state of a network path
    #[must_use]
    pub fn network(&self, path: NetworkPath) -> NetworkState {
        match path {
            NetworkPath::Primary => NetworkState {
                status: self.status,
                service_status: self.nsm_status.clone(),
                service_version: self.nsm_version.clone(),
                cms_version: self.anthias_version.clone(),
                cms_app_status: self.anthias_status.clone(),
                cms_status: self.cms_status,
                asset_count: self.asset_count,
                dashboard_url: self.dashboard_url.clone(),
                last_checked: self.last_checked,
            },
            NetworkPath::Vpn => NetworkState {
                status: self.status_vpn,
                service_status: self.nsm_status_vpn.clone(),
                service_version: self.nsm_version_vpn.clone(),
                cms_version: self.anthias_version_vpn.clone(),
                cms_app_status: self.anthias_status_vpn.clone(),
                cms_status: self.cms_status_vpn,
                asset_count: self.asset_count_vpn,
                dashboard_url: self.dashboard_url_vpn.clone(),
                last_checked: self.last_checked_vpn,
            },
        }
    }

    /// Overwrite the probe-owned state of a network path
    ///
    /// Operator-edited fields (nickname, hostname, notes, addresses, id) are
    /// never touched.
    pub fn set_network(&mut self, path: NetworkPath, state: NetworkState) {
        match path {
            NetworkPath::Primary => {
                self.status = state.status;
                self.nsm_status = state.service_status;
                self.nsm_version = state.service_version;
                self.anthias_version = state.cms_version;
                self.anthias_status = state.cms_app_status;
                self.cms_status = state.cms_status;
                self.asset_count = state.asset_count;
                self.dashboard_url = state.dashboard_url;
                self.last_checked = state.last_checked;
            }
            NetworkPath::Vpn => {
                self.status_vpn = state.status;
                self.nsm_status_vpn = state.service_status;
                self.nsm_version_vpn = state.service_version;
                self.anthias_version_vpn = state.cms_version;
                self.anthias_status_vpn = state.cms_app_status;
                self.cms_status_vpn = state.cms_status;
                self.asset_count_vpn = state.asset_count;
                self.dashboard_url_vpn = state.dashboard_url;
                self.last_checked_vpn = state.last_checked;
            }
        }
    }

    /// Copy every probe-owned field of `other` onto this record
    pub fn apply_probe_fields(&mut self, other: &Host) {
        for path in [NetworkPath::Primary, NetworkPath::Vpn] {
            self.set_network(path, other.network(path));
        }
    }
}
