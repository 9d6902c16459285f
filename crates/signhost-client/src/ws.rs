//! WebSocket client for roster change events

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use signhost_api::RosterEvent;

use crate::error::{ClientError, Result};

/// Receives live roster events from a signhost daemon
#[derive(Debug)]
pub struct WsClient {
    url: Url,
    receiver: mpsc::Receiver<RosterEvent>,
    task_handle: tokio::task::JoinHandle<()>,
}

impl WsClient {
    /// Connect to the event endpoint
    ///
    /// Reconnects with exponential backoff when the connection drops.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid.
    ///
    /// # Example
    /// ```no_run
    /// use signhost_client::WsClient;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut client = WsClient::connect("ws://localhost:8000/ws/events").await?;
    /// while let Some(event) = client.recv().await {
    ///     println!("{event:?}");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[allow(clippy::unused_async)]
    pub async fn connect(url: impl AsRef<str>) -> Result<Self> {
        let url = Url::parse(url.as_ref())?;
        let (tx, rx) = mpsc::channel(100);

        let task_url = url.clone();
        let task_handle = tokio::spawn(async move {
            Self::connection_loop(task_url, tx).await;
        });

        Ok(Self {
            url,
            receiver: rx,
            task_handle,
        })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Receive the next event
    ///
    /// Returns `None` once the connection loop has ended.
    pub async fn recv(&mut self) -> Option<RosterEvent> {
        self.receiver.recv().await
    }

    async fn connection_loop(url: Url, tx: mpsc::Sender<RosterEvent>) {
        let mut backoff = Duration::from_secs(1);
        let max_backoff = Duration::from_secs(60);

        loop {
            match Self::connect_and_receive(&url, &tx).await {
                Ok(()) => {
                    info!("event stream closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, ?backoff, "event stream lost, reconnecting");
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(max_backoff);
                }
            }
        }
    }

    /// Returns `Ok` only when the local receiver is gone
    async fn connect_and_receive(url: &Url, tx: &mpsc::Sender<RosterEvent>) -> Result<()> {
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::WebSocket(e.to_string()))?;

        info!(%url, "event stream connected");

        let (_write, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            let msg = msg.map_err(|e| ClientError::WebSocket(e.to_string()))?;

            match msg {
                Message::Text(text) => match serde_json::from_str::<RosterEvent>(&text) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(e) => debug!(error = %e, "ignoring unparseable event"),
                },
                Message::Close(_) => {
                    return Err(ClientError::ConnectionClosed(
                        "server closed connection".into(),
                    ));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
            }
        }

        Err(ClientError::ConnectionClosed("stream ended".into()))
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.task_handle.abort();
    }
}
