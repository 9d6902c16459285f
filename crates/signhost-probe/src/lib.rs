//! signhost-probe: Host health probing
//!
//! Classifies the reachability and service status of a host on each of its
//! network paths, and sweeps the whole roster.

pub mod config;
pub mod error;
pub mod http;
pub mod sweep;
pub mod traits;

pub use config::ProbeConfig;
pub use error::ProbeError;
pub use http::HttpProber;
pub use sweep::{probe_all, probe_one};
pub use traits::HostProber;
