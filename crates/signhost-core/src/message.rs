//! Message types for the fleet actor
//!
//! Handlers live in `actor::fleet`. Every reply is a
//! `Result<_, CoreError>` so callers can tell handler failures apart from
//! mailbox failures.

use kameo_macros::Reply;
use signhost_api::Host;
use signhost_api::requests::EditHostRequest;

// ============================================================================
// Roster
// ============================================================================

/// Full roster in storage order
#[derive(Debug)]
pub struct ListRoster;

#[derive(Debug)]
pub struct GetHost {
    pub ip: String,
}

/// Add a record; it is probed in the background
#[derive(Debug)]
pub struct AddHost {
    pub host: Host,
}

#[derive(Debug)]
pub struct EditHost {
    pub ip: String,
    pub edit: EditHostRequest,
}

#[derive(Debug)]
pub struct RemoveHost {
    pub ip: String,
}

/// Drop every other record sharing this record's hostname
#[derive(Debug)]
pub struct SetPrimary {
    pub ip: String,
}

// ============================================================================
// Background work (replies once the task is started)
// ============================================================================

#[derive(Debug)]
pub struct ProbeHost {
    pub ip: String,
}

/// Probe every record
#[derive(Debug)]
pub struct ProbeSweep;

#[derive(Debug)]
pub struct StartDiscovery {
    /// Scan only the /24 around this address
    pub interface_address: Option<String>,
}

/// Push the roster to these peers, or to every peer if empty
#[derive(Debug)]
pub struct PushRoster {
    pub targets: Vec<String>,
}

/// Fetch a peer's roster and merge it
#[derive(Debug)]
pub struct PullRoster {
    pub peer: String,
}

// ============================================================================
// Gossip receive and identity
// ============================================================================

/// Roster delivered by a peer
#[derive(Debug)]
pub struct ReceiveRoster {
    pub hosts: Vec<Host>,
    pub merge: bool,
}

/// This node's own record
#[derive(Debug)]
pub struct SelfDescription;

/// Light identification of this node
#[derive(Debug)]
pub struct Identity;

// ============================================================================
// Backups
// ============================================================================

#[derive(Debug)]
pub struct CreateBackup;

#[derive(Debug)]
pub struct ListBackups;

#[derive(Debug)]
pub struct RestoreBackup {
    pub name: String,
}

/// Install an uploaded store file
#[derive(Debug)]
pub struct ImportSnapshot {
    pub bytes: Vec<u8>,
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug)]
pub struct GetStatus;

/// Snapshot of the actor's own state
#[derive(Debug, Clone, Reply)]
pub struct FleetStatus {
    /// Records in the roster
    pub hosts: usize,
    /// Detached probe, push, pull and discovery tasks still running
    pub background_tasks: usize,
}
