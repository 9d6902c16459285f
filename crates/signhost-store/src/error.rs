//! Error types for signhost-store

use signhost_api::AddressError;
use thiserror::Error;

/// Errors that can occur during roster store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record with the given id or address
    #[error("host not found: {0}")]
    NotFound(String),

    /// Malformed IPv4 address
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),

    /// Another record already holds this address
    #[error("address already in use: {0}")]
    AddressInUse(String),

    /// Another record already holds this id
    #[error("duplicate host id: {0}")]
    DuplicateId(String),

    /// Store file failed its integrity probe
    #[error("store corrupt: {0}")]
    Corrupt(String),

    /// Requested backup does not exist or cannot be read
    #[error("backup unavailable: {0}")]
    BackupUnavailable(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the underlying SQLite database
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Whether this is a persistence failure the operator must look at
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, StoreError::Io(_) | StoreError::Sqlite(_))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_) | StoreError::BackupUnavailable(_))
    }
}
