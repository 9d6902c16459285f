//! Error types for signhost-probe

use thiserror::Error;

/// Errors raised while setting up a prober
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
