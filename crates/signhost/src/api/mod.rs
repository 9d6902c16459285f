//! API route handlers

pub mod backups;
pub mod docs;
pub mod error;
pub mod fleet;
pub mod hosts;
pub mod system;
pub mod ws;

pub use error::{ApiError, AppError};
