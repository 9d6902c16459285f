//! signhost-core: Fleet synchronization and orchestration
//!
//! Implements the gossip push/receive exchange, discovery-to-roster
//! resolution and the `FleetActor` (kameo) the daemon talks to.

pub mod actor;
pub mod config;
pub mod error;
pub mod message;
pub mod sync;
pub mod transport;

pub use actor::fleet::{FleetActor, FleetActorArgs};
pub use config::{FleetConfig, NodeIdentity};
pub use error::CoreError;
pub use message::{
    AddHost, CreateBackup, EditHost, FleetStatus, GetHost, GetStatus, Identity, ImportSnapshot,
    ListBackups, ListRoster, ProbeHost, ProbeSweep, PullRoster, PushRoster, ReceiveRoster,
    RemoveHost, RestoreBackup, SelfDescription, SetPrimary, StartDiscovery,
};
pub use sync::{FleetSync, FleetSyncArgs, PLACEHOLDER_NICKNAME, PLACEHOLDER_VERSION};
pub use transport::{HttpPeerTransport, PeerTransport};
