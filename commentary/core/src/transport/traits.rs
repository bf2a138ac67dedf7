//! Transport traits and channel-backed connection handles

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The socket is already closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Queueing an outbound frame failed
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The endpoint is not a usable socket URL
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Something that happened on an open socket
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived
    Text(String),
    /// The socket closed; the peer may have given a reason
    Closed(Option<String>),
    /// The socket failed
    Error(String),
}

/// Cloneable handle for queueing outbound text frames
///
/// When every sender for a connection is dropped the writer closes the
/// socket.
#[derive(Clone, Debug)]
pub struct ConnectionSender {
    tx: mpsc::UnboundedSender<String>,
}

impl ConnectionSender {
    /// Wrap the outbound half of a connection
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    /// Queue a text frame
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` once the writer has shut down.
    pub fn send(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.tx
            .send(text.into())
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Whether the writer has shut down
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// An open text-frame socket
#[derive(Debug)]
pub struct Connection {
    /// Outbound frames
    pub sender: ConnectionSender,
    /// Inbound frames and lifecycle events
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Connection {
    /// Assemble a connection from its two channel halves
    #[must_use]
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self {
            sender: ConnectionSender::new(outbound),
            events,
        }
    }
}

/// Opens sockets by URL
///
/// Implementations must not block; slow handshakes belong in the returned
/// future, which the caller bounds with its own timeout.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a socket to `url`
    async fn connect(&self, url: &str) -> Result<Connection, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_reports_closed_writer() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = ConnectionSender::new(tx);
        assert!(sender.send("a").is_ok());

        drop(rx);
        assert!(sender.is_closed());
        assert!(matches!(
            sender.send("b"),
            Err(TransportError::ConnectionClosed)
        ));
    }
}
