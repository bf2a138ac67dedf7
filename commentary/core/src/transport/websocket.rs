//! WebSocket connector
//!
//! Opens `wss://` sockets with tokio-tungstenite and bridges them onto the
//! channel pair of a [`Connection`]. A writer task drains outbound frames and
//! sends a close frame once every sender is dropped; a reader task forwards
//! text frames until the socket ends.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use super::traits::{Connection, Connector, TransportError, TransportEvent};

/// Connector for real commentary sockets
#[derive(Clone, Debug, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a connector
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
        let parsed =
            url::Url::parse(url).map_err(|e| TransportError::InvalidEndpoint(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(TransportError::InvalidEndpoint(format!(
                "{url}: unsupported scheme {}",
                parsed.scheme()
            )));
        }

        let (stream, _response) = tokio_tungstenite::connect_async(parsed.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{url}: {e}")))?;
        tracing::debug!(url = %url, "WebSocket connected");

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let writer_url = url.to_string();
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::debug!(url = %writer_url, error = %e, "WebSocket write failed");
                    return;
                }
            }
            if let Err(e) = sink.close().await {
                tracing::trace!(url = %writer_url, error = %e, "WebSocket close failed");
            }
        });

        let reader_url = url.to_string();
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                let event = match message {
                    Ok(Message::Text(text)) => TransportEvent::Text(text),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => TransportEvent::Text(text),
                        Err(_) => {
                            tracing::trace!(url = %reader_url, "Skipping non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty());
                        let _ = event_tx.send(TransportEvent::Closed(reason));
                        return;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                        return;
                    }
                };
                if event_tx.send(event).is_err() {
                    // Nobody is listening any more
                    return;
                }
            }
            let _ = event_tx.send(TransportEvent::Closed(None));
        });

        Ok(Connection::new(outbound_tx, event_rx))
    }
}
