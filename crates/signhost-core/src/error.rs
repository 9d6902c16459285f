//! Core error types for signhost-core

use kameo::error::SendError;
use signhost_api::AddressError;
use signhost_client::ClientError;
use signhost_discovery::DiscoveryError;
use signhost_store::StoreError;
use thiserror::Error;

/// Errors surfaced by fleet operations
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// No record with this address or id
    #[error("host not found: {0}")]
    NotFound(String),

    /// Malformed IPv4 address
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The address or id is held by another record
    #[error("already in use: {0}")]
    AddressInUse(String),

    /// Persisting the roster failed
    #[error("store I/O error: {0}")]
    StoreIo(String),

    #[error("backup unavailable: {0}")]
    BackupUnavailable(String),

    /// Network failure talking to a fleet peer
    #[error("peer {peer} unreachable: {message}")]
    PeerUnreachable {
        /// Peer address
        peer: String,
        message: String,
    },

    /// Uploaded or restored bytes are not a usable store
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// Local interfaces could not be listed
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// Actor communication error
    #[error("actor communication error: {0}")]
    ActorError(String),
}

impl CoreError {
    /// Wrap a client failure against `peer`
    pub fn peer(peer: impl Into<String>, err: &ClientError) -> Self {
        CoreError::PeerUnreachable {
            peer: peer.into(),
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => CoreError::NotFound(what),
            StoreError::InvalidAddress(e) => CoreError::InvalidAddress(e.0),
            StoreError::AddressInUse(ip) => CoreError::AddressInUse(ip),
            StoreError::DuplicateId(id) => CoreError::AddressInUse(format!("id {id}")),
            StoreError::Corrupt(msg) => CoreError::InvalidSnapshot(msg),
            StoreError::BackupUnavailable(name) => CoreError::BackupUnavailable(name),
            e @ (StoreError::Io(_) | StoreError::Sqlite(_)) => CoreError::StoreIo(e.to_string()),
        }
    }
}

impl From<AddressError> for CoreError {
    fn from(err: AddressError) -> Self {
        CoreError::InvalidAddress(err.0)
    }
}

impl From<DiscoveryError> for CoreError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::InvalidOverride(e) => CoreError::InvalidAddress(e.0),
            DiscoveryError::Interfaces(e) => CoreError::Discovery(e.to_string()),
        }
    }
}

impl<M> From<SendError<M, CoreError>> for CoreError {
    fn from(err: SendError<M, CoreError>) -> Self {
        match err {
            SendError::HandlerError(e) => e,
            other => CoreError::ActorError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_taxonomy_preserved() {
        assert!(matches!(
            CoreError::from(StoreError::NotFound("10.0.0.1".into())),
            CoreError::NotFound(_)
        ));
        assert!(matches!(
            CoreError::from(StoreError::Io(std::io::Error::other("disk full"))),
            CoreError::StoreIo(_)
        ));
        assert!(matches!(
            CoreError::from(StoreError::Corrupt("bad header".into())),
            CoreError::InvalidSnapshot(_)
        ));
        assert!(matches!(
            CoreError::from(StoreError::BackupUnavailable("x".into())),
            CoreError::BackupUnavailable(_)
        ));
    }

    #[test]
    fn test_address_error_message() {
        let err = CoreError::from(AddressError("10.0.0".into()));
        assert_eq!(err.to_string(), "invalid address: 10.0.0");
    }
}
