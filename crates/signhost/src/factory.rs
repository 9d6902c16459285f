//! Builds the fleet coordinator and this node's identity from configuration

use std::fs;
use std::path::Path;
use std::sync::Arc;

use eyre::{Result, WrapErr};
use signhost_api::validate_ipv4;
use signhost_core::{FleetSync, FleetSyncArgs, HttpPeerTransport, NodeIdentity};
use signhost_discovery::{Scanner, primary_ipv4};
use signhost_probe::HttpProber;
use signhost_store::Store;
use tracing::{info, warn};

use crate::config::Config;

const NODE_ID_FILE: &str = "node-id";

/// Wire the store to the HTTP prober, peer transport and scanner
///
/// # Errors
/// Returns an error if the identity cannot be resolved or an HTTP client
/// cannot be built.
pub fn build_fleet(config: &Config, store: Arc<Store>) -> Result<Arc<FleetSync>> {
    let identity = resolve_identity(config, store.path())?;
    info!(
        id = %identity.id,
        hostname = %identity.hostname,
        ip = %identity.ip_address,
        "node identity"
    );

    let fleet = config.fleet_config();
    let prober = HttpProber::new(config.probe_config()).wrap_err("failed to build prober")?;
    let transport = HttpPeerTransport::new(fleet.peer_port, fleet.peer_timeout)
        .wrap_err("failed to build peer transport")?;

    Ok(Arc::new(FleetSync::new(FleetSyncArgs {
        store,
        prober: Arc::new(prober),
        transport: Arc::new(transport),
        scanner: Scanner::new(config.scan_config()),
        config: fleet,
        identity,
    })))
}

/// Configured values first, then persisted or detected ones
///
/// # Errors
/// Returns an error if a configured address is malformed or the node id
/// file cannot be written.
pub fn resolve_identity(config: &Config, store_path: &Path) -> Result<NodeIdentity> {
    let node = &config.node;

    let id = match &node.id {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => persistent_node_id(store_path)?,
    };
    let hostname = node.hostname.clone().unwrap_or_else(system_hostname);
    let nickname = node.nickname.clone().unwrap_or_else(|| hostname.clone());

    let ip_address = match &node.ip_address {
        Some(ip) => validate_ipv4(ip)?.to_string(),
        None => primary_ipv4().map(|ip| ip.to_string()).unwrap_or_else(|| {
            warn!("no non-loopback IPv4 address found, node record has no address");
            String::new()
        }),
    };
    let vpn_ip_address = match &node.vpn_ip_address {
        Some(ip) => validate_ipv4(ip)?.to_string(),
        None => String::new(),
    };

    Ok(NodeIdentity {
        id,
        nickname,
        hostname,
        ip_address,
        vpn_ip_address,
    })
}

/// Read `node-id` beside the store, creating it on first start
fn persistent_node_id(store_path: &Path) -> Result<String> {
    let dir = store_path.parent().unwrap_or_else(|| Path::new("."));
    let path = dir.join(NODE_ID_FILE);

    if let Ok(existing) = fs::read_to_string(&path) {
        let existing = existing.trim();
        if !existing.is_empty() {
            return Ok(existing.to_string());
        }
    }

    let id = uuid::Uuid::new_v4().to_string();
    fs::create_dir_all(dir)?;
    fs::write(&path, &id).wrap_err_with(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "generated node id");
    Ok(id)
}

fn system_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "signhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeSection;

    #[test]
    fn test_node_id_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("hosts.db");

        let first = persistent_node_id(&store_path).unwrap();
        let second = persistent_node_id(&store_path).unwrap();
        assert_eq!(first, second);
        assert!(dir.path().join(NODE_ID_FILE).is_file());
    }

    #[test]
    fn test_configured_identity_wins() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            node: NodeSection {
                id: Some("lobby-node".into()),
                hostname: Some("signage-lobby".into()),
                ip_address: Some(" 10.1.2.3 ".into()),
                ..NodeSection::default()
            },
            ..Config::default()
        };

        let identity = resolve_identity(&config, &dir.path().join("hosts.db")).unwrap();
        assert_eq!(identity.id, "lobby-node");
        assert_eq!(identity.nickname, "signage-lobby");
        assert_eq!(identity.ip_address, "10.1.2.3");
        assert!(!dir.path().join(NODE_ID_FILE).exists());
    }

    #[test]
    fn test_malformed_configured_address_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            node: NodeSection {
                id: Some("n".into()),
                ip_address: Some("10.1.2".into()),
                ..NodeSection::default()
            },
            ..Config::default()
        };
        assert!(resolve_identity(&config, &dir.path().join("hosts.db")).is_err());
    }
}
