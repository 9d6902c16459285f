//! Error types for signhost-discovery

use signhost_api::AddressError;
use thiserror::Error;

/// Errors that prevent a scan from starting
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The local interfaces could not be enumerated
    #[error("failed to list network interfaces: {0}")]
    Interfaces(#[from] std::io::Error),

    /// The override address is not a valid IPv4 address
    #[error(transparent)]
    InvalidOverride(#[from] AddressError),
}
