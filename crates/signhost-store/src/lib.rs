//! signhost-store: Durable host roster
//!
//! A SQLite-backed roster with an in-memory arena behind a single
//! reader/writer lock, startup recovery from rotating backups, and a
//! broadcast stream of change notifications.

mod backup;
pub mod error;
mod roster;
mod schema;
pub mod store;


pub use error::StoreError;
pub use roster::UpsertOutcome;
pub use store::{Store, Upserted};
