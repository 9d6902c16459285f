//! Actor implementations
//!
//! Contains the `FleetActor` fronting the fleet coordinator.

pub mod fleet;
