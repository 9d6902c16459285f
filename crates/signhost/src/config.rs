//! Configuration loading and types

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use signhost_core::FleetConfig;
use signhost_discovery::ScanConfig;
use signhost_probe::ProbeConfig;

/// Top-level configuration for the signhost daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Daemon server settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub probe: ProbeSection,
    #[serde(default)]
    pub discovery: DiscoverySection,
    #[serde(default)]
    pub fleet: FleetSection,
    /// Overrides for this node's own roster record
    #[serde(default)]
    pub node: NodeSection,
}

/// Daemon server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address and port to bind to
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Live store file; backups go to `backups/` beside it
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Backups kept by manual backups and replace-mode receives
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
    /// Backups kept by restores and imports
    #[serde(default = "default_import_max_backups")]
    pub import_max_backups: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            max_backups: default_max_backups(),
            import_max_backups: default_import_max_backups(),
        }
    }
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("signhost/hosts.db")
}

fn default_max_backups() -> usize {
    10
}

fn default_import_max_backups() -> usize {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSection {
    pub management_port: u16,
    pub health_path: String,
    pub info_path: String,
    pub cms_port: u16,
    pub cms_path: String,
    pub assets_path: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// Probes in flight during a sweep
    pub concurrency: usize,
}

impl Default for ProbeSection {
    fn default() -> Self {
        let probe = ProbeConfig::default();
        Self {
            management_port: probe.management_port,
            health_path: probe.health_path,
            info_path: probe.info_path,
            cms_port: probe.cms_port,
            cms_path: probe.cms_path,
            assets_path: probe.assets_path,
            connect_timeout_ms: millis(probe.connect_timeout),
            request_timeout_ms: millis(probe.request_timeout),
            concurrency: FleetConfig::default().probe_concurrency,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    /// Port dialled on every candidate address
    pub port: u16,
    pub dial_timeout_ms: u64,
    pub max_concurrency: usize,
    pub budget_secs: u64,
    pub max_subnet_hosts: u64,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        let scan = ScanConfig::default();
        Self {
            port: FleetConfig::default().discovery_port,
            dial_timeout_ms: millis(scan.dial_timeout),
            max_concurrency: scan.max_concurrency,
            budget_secs: scan.budget.as_secs(),
            max_subnet_hosts: scan.max_subnet_hosts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSection {
    pub peer_port: u16,
    pub peer_timeout_ms: u64,
}

impl Default for FleetSection {
    fn default() -> Self {
        let fleet = FleetConfig::default();
        Self {
            peer_port: fleet.peer_port,
            peer_timeout_ms: millis(fleet.peer_timeout),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSection {
    /// Otherwise persisted in `node-id` beside the store
    pub id: Option<String>,
    /// Defaults to the hostname
    pub nickname: Option<String>,
    /// Defaults to the machine hostname
    pub hostname: Option<String>,
    /// Defaults to the first non-loopback IPv4 address
    pub ip_address: Option<String>,
    pub vpn_ip_address: Option<String>,
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from the first config file found, or use defaults
    ///
    /// Returns the path that was loaded, if any.
    ///
    /// # Errors
    /// Returns error if a config file exists but cannot be read or parsed
    pub fn load_default() -> eyre::Result<(Self, Option<PathBuf>)> {
        if let Ok(path) = std::env::var("SIGNHOST_CONFIG") {
            let path = PathBuf::from(path);
            return Ok((Self::load(&path)?, Some(path)));
        }

        let mut paths = vec![
            PathBuf::from("signhost.toml"),
            PathBuf::from("/etc/signhost/signhost.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("signhost/signhost.toml"));
        }

        for path in paths {
            if path.exists() {
                return Ok((Self::load(&path)?, Some(path)));
            }
        }

        Ok((Config::default(), None))
    }

    #[must_use]
    pub fn probe_config(&self) -> ProbeConfig {
        let p = &self.probe;
        ProbeConfig {
            management_port: p.management_port,
            health_path: p.health_path.clone(),
            info_path: p.info_path.clone(),
            cms_port: p.cms_port,
            cms_path: p.cms_path.clone(),
            assets_path: p.assets_path.clone(),
            connect_timeout: Duration::from_millis(p.connect_timeout_ms),
            request_timeout: Duration::from_millis(p.request_timeout_ms),
        }
    }

    #[must_use]
    pub fn scan_config(&self) -> ScanConfig {
        let d = &self.discovery;
        ScanConfig {
            dial_timeout: Duration::from_millis(d.dial_timeout_ms),
            max_concurrency: d.max_concurrency,
            budget: Duration::from_secs(d.budget_secs),
            max_subnet_hosts: d.max_subnet_hosts,
        }
    }

    #[must_use]
    pub fn fleet_config(&self) -> FleetConfig {
        FleetConfig {
            peer_port: self.fleet.peer_port,
            peer_timeout: Duration::from_millis(self.fleet.peer_timeout_ms),
            discovery_port: self.discovery.port,
            max_backups: self.store.max_backups,
            import_max_backups: self.store.import_max_backups,
            probe_concurrency: self.probe.concurrency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.daemon.bind, "0.0.0.0:8000");
        assert_eq!(config.store.max_backups, 10);
        assert_eq!(config.store.import_max_backups, 20);
        assert_eq!(config.probe.cms_path, "/api/v2/info");
        assert_eq!(config.discovery.budget_secs, 30);
        assert_eq!(config.fleet.peer_timeout_ms, 3000);
        assert!(config.node.id.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [daemon]
            log_format = "json"

            [store]
            path = "/var/lib/signhost/hosts.db"
            max_backups = 3

            [discovery]
            port = 9000
            max_concurrency = 10

            [node]
            nickname = "Lobby screen"
            "#,
        )
        .unwrap();

        assert_eq!(config.daemon.log_format, "json");
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.store.path, PathBuf::from("/var/lib/signhost/hosts.db"));

        let fleet = config.fleet_config();
        assert_eq!(fleet.max_backups, 3);
        assert_eq!(fleet.import_max_backups, 20);
        assert_eq!(fleet.discovery_port, 9000);
        assert_eq!(fleet.peer_port, 8000);

        let scan = config.scan_config();
        assert_eq!(scan.max_concurrency, 10);
        assert_eq!(scan.dial_timeout, Duration::from_millis(500));
        assert_eq!(config.node.nickname.as_deref(), Some("Lobby screen"));
    }

    #[test]
    fn test_probe_section_round_trips_into_probe_config() {
        let config: Config = toml::from_str(
            r"
            [probe]
            management_port = 8080
            connect_timeout_ms = 750
            ",
        )
        .unwrap();
        let probe = config.probe_config();
        assert_eq!(probe.management_port, 8080);
        assert_eq!(probe.connect_timeout, Duration::from_millis(750));
        assert_eq!(probe.health_path, "/health");
    }
}
