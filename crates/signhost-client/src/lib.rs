//! signhost-client: HTTP and WebSocket client library
//!
//! Talks to a signhost daemon: the local one from the CLI, or a fleet peer
//! during push, pull and discovery.
//!
//! # Examples
//!
//! ```no_run
//! use signhost_client::HttpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new("http://localhost:8000")?;
//!
//! let health = client.health().await?;
//! println!("Status: {}", health.status);
//!
//! let roster = client.list_hosts().await?;
//! client.push(Vec::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod http;
pub mod ws;

pub use error::{ClientError, Result};
pub use http::HttpClient;
pub use ws::WsClient;
