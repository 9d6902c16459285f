//! Application state shared across HTTP handlers

use std::sync::Arc;

use kameo::actor::ActorRef;
use signhost_core::FleetActor;
use signhost_store::Store;

use crate::config::Config;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Reference to the fleet actor
    pub fleet: ActorRef<FleetActor>,
    /// Roster store, for raw snapshots and the event stream
    pub store: Arc<Store>,
    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create new application state
    pub fn new(fleet: ActorRef<FleetActor>, store: Arc<Store>, config: Config) -> Self {
        Self {
            fleet,
            store,
            config: Arc::new(config),
        }
    }
}
