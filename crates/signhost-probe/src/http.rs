//! Network prober: TCP reachability, CMS status and HTTP health

use std::io;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use signhost_api::{CmsStatus, Host, HostStatus, NetworkPath, NetworkState};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument};

use crate::config::ProbeConfig;
use crate::error::ProbeError;
use crate::traits::HostProber;

/// Outcome of the TCP check against the management port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reach {
    Open,
    Refused,
    Unreachable,
}

/// Classify a failed dial
///
/// Only an active refusal means the host is up; every other failure
/// (name resolution, no route, timeout) is treated as unreachable.
fn classify_dial_error(err: &io::Error) -> HostStatus {
    if err.kind() == io::ErrorKind::ConnectionRefused {
        HostStatus::ConnectionRefused
    } else {
        HostStatus::Unreachable
    }
}

#[derive(Debug, Default, Deserialize)]
struct HealthBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InfoBody {
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CmsInfo {
    #[serde(default)]
    anthias_version: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Production prober using raw TCP and HTTP
#[derive(Debug, Clone)]
pub struct HttpProber {
    config: ProbeConfig,
    client: Client,
}

impl HttpProber {
    /// Create a prober with its own HTTP client
    ///
    /// # Errors
    /// Returns `ProbeError::Client` if the HTTP client cannot be built.
    pub fn new(config: ProbeConfig) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    #[must_use]
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    async fn dial(&self, ip: &str) -> Reach {
        let connect = TcpStream::connect((ip, self.config.management_port));
        match timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(_stream)) => Reach::Open,
            Ok(Err(e)) => {
                debug!(host = %ip, error = %e, "tcp check failed");
                match classify_dial_error(&e) {
                    HostStatus::ConnectionRefused => Reach::Refused,
                    _ => Reach::Unreachable,
                }
            }
            Err(_) => {
                debug!(host = %ip, "tcp check timed out");
                Reach::Unreachable
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Option<T> {
        let response = self.client.get(url).send().await.ok()?;
        if response.status() != StatusCode::OK {
            return None;
        }
        let body = response.text().await.ok()?;
        serde_json::from_str(&body).ok()
    }

    /// CMS status, application version/status and asset count
    async fn probe_cms(&self, ip: &str, state: &mut NetworkState) {
        let base = format!("http://{ip}:{}", self.config.cms_port);
        let url = format!("{base}{}", self.config.cms_path);

        let response = match self.client.get(&url).send().await {
            Ok(r) if r.status() == StatusCode::OK => r,
            Ok(r) => {
                debug!(host = %ip, status = %r.status(), "cms answered with non-200");
                state.cms_status = CmsStatus::Offline;
                state.dashboard_url.clear();
                return;
            }
            Err(e) => {
                debug!(host = %ip, error = %e, "cms request failed");
                state.cms_status = CmsStatus::Offline;
                state.dashboard_url.clear();
                return;
            }
        };

        state.cms_status = CmsStatus::Online;
        state.dashboard_url = format!("{base}/");

        let info: CmsInfo = response
            .text()
            .await
            .ok()
            .and_then(|body| serde_json::from_str(&body).ok())
            .unwrap_or_default();
        if let Some(version) = info.anthias_version.or(info.version) {
            state.cms_version = version;
        }
        if let Some(status) = info.status {
            state.cms_app_status = status;
        }

        let assets_url = format!("{base}{}", self.config.assets_path);
        if let Some(assets) = self.get_json::<Vec<serde_json::Value>>(&assets_url).await {
            state.asset_count = u32::try_from(assets.len()).unwrap_or(u32::MAX);
        }
    }

    /// Health endpoint on the management port
    async fn probe_health(&self, ip: &str, state: &mut NetworkState) {
        let base = format!("http://{ip}:{}", self.config.management_port);
        let url = format!("{base}{}", self.config.health_path);

        match self.client.get(&url).send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                state.status = HostStatus::Healthy;
                let body: HealthBody = response
                    .text()
                    .await
                    .ok()
                    .and_then(|body| serde_json::from_str(&body).ok())
                    .unwrap_or_default();
                state.service_status = body.status.unwrap_or_else(|| "ok".to_string());
                match body.version {
                    Some(version) => state.service_version = version,
                    None => {
                        let info_url = format!("{base}{}", self.config.info_path);
                        if let Some(info) = self.get_json::<InfoBody>(&info_url).await
                            && let Some(version) = info.version
                        {
                            state.service_version = version;
                        }
                    }
                }
            }
            Ok(response) => {
                state.status = HostStatus::Unhealthy;
                state.service_status = response.status().to_string();
            }
            Err(e) => {
                debug!(host = %ip, error = %e, "health request failed");
                state.status = HostStatus::Unhealthy;
                state.service_status = "unavailable".to_string();
            }
        }
    }

    /// Probe one network path, starting from its previous state
    async fn probe_path(&self, ip: &str, previous: NetworkState) -> NetworkState {
        let mut state = previous;
        state.last_checked = Some(Utc::now());

        match self.dial(ip).await {
            Reach::Open => {}
            Reach::Refused => {
                state.status = HostStatus::ConnectionRefused;
                state.service_status = "connection refused".to_string();
                state.cms_status = CmsStatus::Offline;
                state.dashboard_url.clear();
                return state;
            }
            Reach::Unreachable => {
                state.status = HostStatus::Unreachable;
                state.service_status = "unreachable".to_string();
                state.cms_status = CmsStatus::Offline;
                state.dashboard_url.clear();
                return state;
            }
        }

        self.probe_cms(ip, &mut state).await;
        self.probe_health(ip, &mut state).await;
        state
    }
}

#[async_trait]
impl HostProber for HttpProber {
    #[instrument(skip_all, fields(host = %host.ip_address))]
    async fn probe(&self, mut host: Host) -> Host {
        for path in [NetworkPath::Primary, NetworkPath::Vpn] {
            let Some(ip) = host.address(path).map(str::to_string) else {
                continue;
            };
            let state = self.probe_path(&ip, host.network(path)).await;
            debug!(%path, status = %state.status, cms = %state.cms_status, "probed");
            host.set_network(path, state);
        }
        host
    }
}
