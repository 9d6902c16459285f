//! Peer transport: how the fleet coordinator reaches other nodes

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use signhost_api::Host;
use signhost_api::responses::{ReceiveReport, VersionInfo};
use signhost_client::HttpClient;
use tracing::debug;

use crate::error::CoreError;

/// Calls made against a fleet peer, addressed by IPv4 address
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// The peer's own host record
    async fn fetch_self(&self, ip: &str) -> Result<Host, CoreError>;

    /// Light identification for peers without a self-description endpoint
    async fn fetch_identity(&self, ip: &str) -> Result<VersionInfo, CoreError>;

    /// Deliver a roster to the peer's receive endpoint
    async fn send_roster(
        &self,
        ip: &str,
        hosts: &[Host],
        merge: bool,
    ) -> Result<ReceiveReport, CoreError>;

    /// The peer's full roster
    async fn fetch_roster(&self, ip: &str) -> Result<Vec<Host>, CoreError>;
}

/// HTTP transport to `http://<ip>:<port>` using the daemon client
#[derive(Debug, Clone)]
pub struct HttpPeerTransport {
    client: Client,
    port: u16,
}

impl HttpPeerTransport {
    /// # Errors
    /// Returns `CoreError::ActorError` if the HTTP client cannot be built.
    pub fn new(port: u16, timeout: Duration) -> Result<Self, CoreError> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::ActorError(format!("http client: {e}")))?;
        Ok(Self { client, port })
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    fn peer(&self, ip: &str) -> Result<HttpClient, CoreError> {
        HttpClient::with_client(format!("http://{ip}:{}", self.port), self.client.clone())
            .map_err(|e| CoreError::InvalidAddress(format!("{ip}: {e}")))
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn fetch_self(&self, ip: &str) -> Result<Host, CoreError> {
        debug!(peer = %ip, "fetching self-description");
        self.peer(ip)?
            .self_description()
            .await
            .map_err(|e| CoreError::peer(ip, &e))
    }

    async fn fetch_identity(&self, ip: &str) -> Result<VersionInfo, CoreError> {
        debug!(peer = %ip, "fetching identity");
        self.peer(ip)?
            .version()
            .await
            .map_err(|e| CoreError::peer(ip, &e))
    }

    async fn send_roster(
        &self,
        ip: &str,
        hosts: &[Host],
        merge: bool,
    ) -> Result<ReceiveReport, CoreError> {
        debug!(peer = %ip, count = hosts.len(), merge, "sending roster");
        self.peer(ip)?
            .receive(hosts, merge)
            .await
            .map_err(|e| CoreError::peer(ip, &e))
    }

    async fn fetch_roster(&self, ip: &str) -> Result<Vec<Host>, CoreError> {
        debug!(peer = %ip, "fetching roster");
        self.peer(ip)?
            .list_hosts()
            .await
            .map_err(|e| CoreError::peer(ip, &e))
    }
}
