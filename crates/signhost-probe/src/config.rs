//! Probe configuration

use std::time::Duration;

/// Ports, paths and timeouts used by [`crate::HttpProber`]
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Port of the node management service (TCP check and health endpoint)
    pub management_port: u16,
    pub health_path: String,
    /// Fallback endpoint for the service version
    pub info_path: String,
    /// Port of the content-management service
    pub cms_port: u16,
    pub cms_path: String,
    pub assets_path: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            management_port: 8000,
            health_path: "/health".to_string(),
            info_path: "/api/version".to_string(),
            cms_port: 80,
            cms_path: "/api/v2/info".to_string(),
            assets_path: "/api/v2/assets".to_string(),
            connect_timeout: Duration::from_millis(2000),
            request_timeout: Duration::from_millis(3000),
        }
    }
}
