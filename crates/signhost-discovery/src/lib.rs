//! signhost-discovery: Local network peer discovery
//!
//! Derives scan ranges from the local interfaces (or an override address)
//! and dials every candidate address under a shared concurrency limit and
//! a wall-clock budget, streaming live addresses as they answer.

pub mod error;
pub mod interfaces;
pub mod scanner;
pub mod subnet;

pub use error::DiscoveryError;
pub use interfaces::{LocalAddress, local_addresses, primary_ipv4};
pub use scanner::{Candidate, ScanConfig, Scanner};
pub use subnet::Subnet;
