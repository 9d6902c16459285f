//! HTTP client for a signhost daemon

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use url::Url;

use signhost_api::Host;
use signhost_api::requests::{DiscoveryRequest, EditHostRequest, PullRequest, PushRequest};
use signhost_api::responses::{
    Accepted, BackupCreated, BackupInfo, HealthResponse, ReceiveReport, VersionInfo,
};

use crate::error::{ClientError, Result};

/// HTTP client for one signhost daemon (local or a fleet peer)
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
}

/// Turn a non-success status into `ClientError::Api`
async fn check(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(ClientError::Api { status, message })
}

impl HttpClient {
    /// Create a new HTTP client
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    ///
    /// # Example
    /// ```no_run
    /// use signhost_client::HttpClient;
    ///
    /// let client = HttpClient::new("http://localhost:8000")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_client(base_url, Client::new())
    }

    /// Create a client whose requests give up after `timeout`
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be built.
    pub fn with_timeout(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Self::with_client(base_url, client)
    }

    /// Create a new HTTP client with custom `reqwest::Client`
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    pub fn with_client(base_url: impl AsRef<str>, client: Client) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        Ok(Self { client, base_url })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build a full URL from a path
    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(ClientError::Url)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.client.get(self.url(path)?).send().await?;
        Ok(check(response).await?.json().await?)
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: impl serde::Serialize) -> Result<T> {
        let response = self.client.post(self.url(path)?).json(&body).send().await?;
        Ok(check(response).await?.json().await?)
    }

    /// POST without a body
    async fn trigger<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.client.post(self.url(path)?).send().await?;
        Ok(check(response).await?.json().await?)
    }

    async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: impl serde::Serialize,
    ) -> Result<T> {
        let response = self.client.patch(self.url(path)?).json(&body).send().await?;
        Ok(check(response).await?.json().await?)
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.client.delete(self.url(path)?).send().await?;
        Ok(check(response).await?.json().await?)
    }

    // System endpoints

    /// Get daemon health status
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/health").await
    }

    /// The daemon's own host record
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn self_description(&self) -> Result<Host> {
        self.get("/api/self").await
    }

    /// Lightweight identification (id, version, hostname)
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn version(&self) -> Result<VersionInfo> {
        self.get("/api/version").await
    }

    // Roster endpoints

    /// The full roster in storage order
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    ///
    /// # Example
    /// ```no_run
    /// # use signhost_client::HttpClient;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = HttpClient::new("http://localhost:8000")?;
    /// for host in client.list_hosts().await? {
    ///     println!("{} {}", host.ip_address, host.status);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn list_hosts(&self) -> Result<Vec<Host>> {
        self.get("/api/hosts").await
    }

    /// # Errors
    /// Returns an error if the request fails or no host has this address.
    pub async fn get_host(&self, ip: &str) -> Result<Host> {
        self.get(&format!("/api/hosts/{ip}")).await
    }

    /// Add a host; the daemon assigns an id when none is given
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon rejects the host.
    pub async fn add_host(&self, host: &Host) -> Result<Host> {
        self.post("/api/hosts", host).await
    }

    /// # Errors
    /// Returns an error if the request fails or the daemon rejects the edit.
    pub async fn edit_host(&self, ip: &str, edit: &EditHostRequest) -> Result<Host> {
        self.patch(&format!("/api/hosts/{ip}"), edit).await
    }

    /// # Errors
    /// Returns an error if the request fails or no host has this address.
    pub async fn delete_host(&self, ip: &str) -> Result<Host> {
        self.delete(&format!("/api/hosts/{ip}")).await
    }

    /// Make the host at `ip` the only record with its hostname
    ///
    /// Returns the records that were removed.
    ///
    /// # Errors
    /// Returns an error if the request fails or no host has this address.
    pub async fn set_primary(&self, ip: &str) -> Result<Vec<Host>> {
        self.trigger(&format!("/api/hosts/{ip}/primary")).await
    }

    // Probing and discovery

    /// # Errors
    /// Returns an error if the request fails or no host has this address.
    pub async fn probe_host(&self, ip: &str) -> Result<Accepted> {
        self.trigger(&format!("/api/hosts/{ip}/probe")).await
    }

    /// Start a probe sweep over the whole roster
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn probe_all(&self) -> Result<Accepted> {
        self.trigger("/api/probe").await
    }

    /// Start a discovery scan
    ///
    /// # Errors
    /// Returns an error if the request fails or the override is malformed.
    pub async fn start_discovery(&self, interface_address: Option<String>) -> Result<Accepted> {
        self.post("/api/discovery", DiscoveryRequest { interface_address })
            .await
    }

    // Fleet endpoints

    /// Ask the daemon to push its roster to `targets` (all peers if empty)
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn push(&self, targets: Vec<String>) -> Result<Accepted> {
        self.post("/api/fleet/push", PushRequest { targets }).await
    }

    /// Ask the daemon to pull and merge a peer's roster
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn pull(&self, peer: impl Into<String>) -> Result<Accepted> {
        self.post("/api/fleet/pull", PullRequest { peer: peer.into() })
            .await
    }

    /// Deliver a roster to this daemon's receive endpoint
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn receive(&self, hosts: &[Host], merge: bool) -> Result<ReceiveReport> {
        let mut url = self.url("/api/fleet/receive")?;
        url.query_pairs_mut()
            .append_pair("merge", if merge { "true" } else { "false" });
        let response = self.client.post(url).json(hosts).send().await?;
        Ok(check(response).await?.json().await?)
    }

    // Backups

    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        self.get("/api/backups").await
    }

    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn create_backup(&self) -> Result<BackupCreated> {
        self.trigger("/api/backups").await
    }

    /// Restore a named backup; returns the backup taken beforehand
    ///
    /// # Errors
    /// Returns an error if the request fails or the backup does not exist.
    pub async fn restore_backup(&self, name: &str) -> Result<BackupCreated> {
        self.trigger(&format!("/api/backups/{name}/restore")).await
    }

    /// Upload a store file to replace the live roster
    ///
    /// # Errors
    /// Returns an error if the request fails or the file is not a store.
    pub async fn import_snapshot(&self, bytes: Vec<u8>) -> Result<BackupCreated> {
        let response = self
            .client
            .post(self.url("/api/backups/import")?)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Download the live store file
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn snapshot(&self) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.url("/api/backups/snapshot")?)
            .send()
            .await?;
        Ok(check(response).await?.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        assert!(HttpClient::new("http://localhost:8000").is_ok());
        assert!(HttpClient::with_timeout("http://10.0.0.5:8000", Duration::from_secs(3)).is_ok());
    }

    #[test]
    fn test_invalid_url() {
        assert!(HttpClient::new("not a url").is_err());
    }

    #[test]
    fn test_url_building() {
        let client = HttpClient::new("http://10.0.0.5:8000").unwrap();
        let url = client.url("/api/hosts/10.0.0.7/probe").unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.5:8000/api/hosts/10.0.0.7/probe");
    }
}
