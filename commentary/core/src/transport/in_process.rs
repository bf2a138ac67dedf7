//! In-Process Connector
//!
//! Every `connect` produces a channel pair. The client half goes to the
//! caller of `connect`; the server half is delivered to the paired
//! [`InProcessListener`], which plays the role of the commentary service.
//!
//! # Usage
//!
//! ```ignore
//! let (connector, mut listener) = InProcessConnector::new();
//! manager_with(connector).start("NHK総合");
//!
//! let mut watch = listener.accept().await.unwrap();
//! assert_eq!(watch.next_sent().await.as_deref(), Some(r#"{"data":{},"type":"startWatching"}"#));
//! watch.push_text(r#"{"type":"seat","data":{"keepIntervalSec":30}}"#);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::traits::{Connection, Connector, TransportError, TransportEvent};

struct Inner {
    accepted: mpsc::UnboundedSender<ServerEnd>,
    refusing: AtomicBool,
    attempts: Mutex<Vec<(String, Instant)>>,
}

/// Connector backed by tokio channels
///
/// Cloning shares the listener, the refusal switch and the attempt log.
#[derive(Clone)]
pub struct InProcessConnector {
    inner: Arc<Inner>,
}

impl InProcessConnector {
    /// Create a connector and the listener that receives its server ends
    #[must_use]
    pub fn new() -> (Self, InProcessListener) {
        let (accepted, incoming) = mpsc::unbounded_channel();
        let connector = Self {
            inner: Arc::new(Inner {
                accepted,
                refusing: AtomicBool::new(false),
                attempts: Mutex::new(Vec::new()),
            }),
        };
        (connector, InProcessListener { incoming })
    }

    /// Make subsequent connects fail (or succeed again)
    pub fn set_refusing(&self, refusing: bool) {
        self.inner.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Every URL passed to `connect`, with the time of the attempt
    #[must_use]
    pub fn attempts(&self) -> Vec<(String, Instant)> {
        self.inner.attempts.lock().clone()
    }

    /// Number of connect attempts so far
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.inner.attempts.lock().len()
    }
}

impl std::fmt::Debug for InProcessConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessConnector")
            .field("refusing", &self.inner.refusing.load(Ordering::SeqCst))
            .field("attempts", &self.attempt_count())
            .finish()
    }
}

#[async_trait]
impl Connector for InProcessConnector {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
        self.inner
            .attempts
            .lock()
            .push((url.to_string(), Instant::now()));

        if self.inner.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(format!(
                "{url}: connection refused"
            )));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let server = ServerEnd {
            url: url.to_string(),
            sent: outbound_rx,
            events: event_tx,
        };
        self.inner
            .accepted
            .send(server)
            .map_err(|_| TransportError::ConnectionFailed(format!("{url}: listener gone")))?;

        Ok(Connection::new(outbound_tx, event_rx))
    }
}

/// Receives the server half of every in-process connection
#[derive(Debug)]
pub struct InProcessListener {
    incoming: mpsc::UnboundedReceiver<ServerEnd>,
}

impl InProcessListener {
    /// Wait for the next connection
    pub async fn accept(&mut self) -> Option<ServerEnd> {
        self.incoming.recv().await
    }

    /// Take a connection if one is already waiting
    pub fn try_accept(&mut self) -> Option<ServerEnd> {
        self.incoming.try_recv().ok()
    }
}

/// Server half of an in-process connection
#[derive(Debug)]
pub struct ServerEnd {
    url: String,
    sent: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl ServerEnd {
    /// URL the client connected to
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next frame the client sent; `None` once the client closed
    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent.recv().await
    }

    /// A frame the client already sent, without waiting
    pub fn try_next_sent(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }

    /// Whether the client dropped its side
    #[must_use]
    pub fn is_client_closed(&self) -> bool {
        self.events.is_closed()
    }

    /// Deliver a text frame to the client
    ///
    /// Returns `false` if the client is gone.
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.events.send(TransportEvent::Text(text.into())).is_ok()
    }

    /// Close the socket from the server side
    pub fn close(&self, reason: Option<&str>) -> bool {
        self.events
            .send(TransportEvent::Closed(reason.map(str::to_string)))
            .is_ok()
    }

    /// Fail the socket from the server side
    pub fn fail(&self, error: impl Into<String>) -> bool {
        self.events.send(TransportEvent::Error(error.into())).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_delivers_server_end() {
        let (connector, mut listener) = InProcessConnector::new();
        let mut client = connector.connect("wss://a/ws").await.unwrap();
        let mut server = listener.accept().await.unwrap();
        assert_eq!(server.url(), "wss://a/ws");

        client.sender.send("hi").unwrap();
        assert_eq!(server.next_sent().await.as_deref(), Some("hi"));

        assert!(server.push_text("back"));
        assert_eq!(
            client.events.recv().await,
            Some(TransportEvent::Text("back".into()))
        );
    }

    #[tokio::test]
    async fn test_refusing_records_attempt() {
        let (connector, mut listener) = InProcessConnector::new();
        connector.set_refusing(true);

        let result = connector.connect("wss://a/ws").await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
        assert_eq!(connector.attempt_count(), 1);
        assert!(listener.try_accept().is_none());
    }

    #[tokio::test]
    async fn test_dropping_client_closes_server_view() {
        let (connector, mut listener) = InProcessConnector::new();
        let client = connector.connect("wss://a/ws").await.unwrap();
        let mut server = listener.accept().await.unwrap();

        drop(client);
        assert!(server.is_client_closed());
        assert_eq!(server.next_sent().await, None);
    }
}
