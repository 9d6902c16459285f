//! signhost-api: Shared data model and wire types
//!
//! Contains the host record, status enumerations, request/response types and
//! roster change events used across the store, the daemon, peers and the CLI.

pub mod address;
pub mod events;
pub mod host;
pub mod requests;
pub mod responses;

pub use address::{AddressError, validate_ipv4};
pub use events::RosterEvent;
pub use host::{CmsStatus, Host, HostStatus, NetworkPath, NetworkState};
