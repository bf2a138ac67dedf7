//! Commentary Recorder
//!
//! Records the raw comment stream of one room to a JSONL file alongside a
//! video recording. It runs the same two-socket handshake as the connection
//! manager but never retries: a lost watch socket simply ends the recording.
//!
//! Every nonempty comment frame is written verbatim (whitespace-trimmed) as
//! one line, flushed immediately so a killed process loses nothing.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::ConnectionConfig;
use crate::protocol::{subscription_frame, WatchCommand, WatchMessage, MIN_KEEP_INTERVAL};
use crate::transport::{Connection, Connector, TransportError, TransportEvent};

/// Recorder errors
#[derive(Debug, Error)]
pub enum RecorderError {
    /// The output file could not be created or written
    #[error("Output file {path}: {source}")]
    Output {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Writing a line failed
    #[error("Write failed: {0}")]
    Write(#[from] std::io::Error),

    /// The watch socket could not be opened
    #[error("Watch connection failed: {0}")]
    Connect(#[from] TransportError),

    /// Opening the watch socket took too long
    #[error("Watch connection timed out after {0:?}")]
    ConnectTimeout(Duration),
}

/// Why a recording ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The requested duration elapsed
    DurationElapsed,
    /// A shutdown signal arrived
    Shutdown,
    /// The watch socket closed or failed
    WatchClosed(String),
    /// The server sent `disconnect`
    Disconnected(String),
}

/// Result of a finished recording
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordingSummary {
    /// Lines written to the output
    pub lines_written: u64,
    /// Why recording stopped
    pub stop_reason: StopReason,
    /// Whether the comment socket was ever subscribed
    pub subscribed: bool,
}

/// Records one room's comments
#[derive(Debug)]
pub struct Recorder<C> {
    connector: C,
    config: ConnectionConfig,
}

impl<C: Connector> Recorder<C> {
    /// Create a recorder
    pub fn new(connector: C, config: ConnectionConfig) -> Self {
        Self { connector, config }
    }

    /// Record `room_id` into the file at `path` (truncated first)
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created, the watch socket
    /// cannot be opened, or a write fails.
    pub async fn record_to_file(
        &self,
        room_id: &str,
        duration: Duration,
        path: &Path,
        shutdown: impl Future<Output = ()>,
    ) -> Result<RecordingSummary, RecorderError> {
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|source| RecorderError::Output {
                path: path.to_path_buf(),
                source,
            })?;
        self.record(room_id, duration, &mut file, shutdown).await
    }

    /// Record `room_id` into `output` until `duration` elapses, `shutdown`
    /// resolves, or the watch socket ends
    ///
    /// # Errors
    ///
    /// Returns an error if the watch socket cannot be opened or a write
    /// fails. Comment socket problems only end that socket.
    pub async fn record<W>(
        &self,
        room_id: &str,
        duration: Duration,
        output: &mut W,
        shutdown: impl Future<Output = ()>,
    ) -> Result<RecordingSummary, RecorderError>
    where
        W: AsyncWrite + Unpin,
    {
        let deadline = Instant::now().checked_add(duration);
        let url = self.config.watch_url(room_id);
        tracing::info!(url = %url, "Connecting watch socket");

        let Connection {
            sender: watch,
            events: mut watch_events,
        } = tokio::time::timeout(self.config.connect_timeout, self.connector.connect(&url))
            .await
            .map_err(|_| RecorderError::ConnectTimeout(self.config.connect_timeout))??;
        watch.send(WatchCommand::StartWatching.encode())?;
        tracing::info!("Watch socket connected, startWatching sent");

        let mut keep_interval = self.config.default_keep_interval;
        let mut keepalive = keepalive_timer(keep_interval);
        let mut comment: Option<Connection> = None;
        let mut summary = RecordingSummary {
            lines_written: 0,
            stop_reason: StopReason::DurationElapsed,
            subscribed: false,
        };

        tokio::pin!(shutdown);
        let expiry = expire_at(deadline);
        tokio::pin!(expiry);

        summary.stop_reason = loop {
            tokio::select! {
                // Drain queued comments before acting on watch messages
                biased;

                () = &mut expiry => break StopReason::DurationElapsed,
                () = &mut shutdown => break StopReason::Shutdown,
                _ = keepalive.tick() => {
                    if watch.send(WatchCommand::KeepSeat.encode()).is_err() {
                        break StopReason::WatchClosed("keepSeat send failed".into());
                    }
                }
                event = next_comment_event(&mut comment) => match event {
                    Some(TransportEvent::Text(text)) => {
                        let line = text.trim();
                        if !line.is_empty() {
                            output.write_all(line.as_bytes()).await?;
                            output.write_all(b"\n").await?;
                            output.flush().await?;
                            summary.lines_written += 1;
                        }
                    }
                    other => {
                        tracing::info!(event = ?other, "Comment socket ended");
                        comment = None;
                    }
                },
                event = watch_events.recv() => {
                    let text = match event {
                        Some(TransportEvent::Text(text)) => text,
                        Some(TransportEvent::Closed(reason)) => {
                            break StopReason::WatchClosed(reason.unwrap_or_else(|| "closed".into()));
                        }
                        Some(TransportEvent::Error(error)) => break StopReason::WatchClosed(error),
                        None => break StopReason::WatchClosed("closed".into()),
                    };
                    let message = match WatchMessage::decode(&text) {
                        Ok(message) => message,
                        Err(e) => {
                            tracing::debug!(error = %e, "Dropping malformed watch frame");
                            continue;
                        }
                    };
                    match message {
                        WatchMessage::Seat { keep_interval: interval } => {
                            keep_interval = interval.unwrap_or(self.config.default_keep_interval);
                            keepalive = keepalive_timer(keep_interval);
                            tracing::info!(keep_interval_secs = keep_interval.as_secs(), "Seat received");
                        }
                        WatchMessage::Room(room) => {
                            if comment.is_some() {
                                continue;
                            }
                            let endpoint = room
                                .message_server
                                .unwrap_or_else(|| self.config.comment_url(room_id));
                            tracing::info!(thread = %room.thread_id, "Room resolved");
                            comment = self
                                .subscribe(&endpoint, &room.thread_id, &room.post_key)
                                .await;
                            summary.subscribed |= comment.is_some();
                        }
                        WatchMessage::Ping => {
                            // A failed pong shows up as a closed watch socket
                            let _ = watch.send(WatchCommand::Pong.encode());
                        }
                        WatchMessage::Disconnect { reason } => {
                            tracing::info!(reason = %reason, "Server disconnect");
                            break StopReason::Disconnected(reason);
                        }
                        WatchMessage::Error { message } => {
                            tracing::warn!(message = %message, "Server error");
                        }
                        WatchMessage::Other(kind) => {
                            tracing::debug!(kind = %kind, "Ignoring watch message");
                        }
                    }
                }
            }
        };

        tracing::info!(
            lines = summary.lines_written,
            reason = ?summary.stop_reason,
            "Recording finished"
        );
        output.flush().await?;
        Ok(summary)
    }

    async fn subscribe(&self, endpoint: &str, thread_id: &str, post_key: &str) -> Option<Connection> {
        let connect = tokio::time::timeout(self.config.connect_timeout, self.connector.connect(endpoint));
        let connection = match connect.await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "Comment socket failed");
                return None;
            }
            Err(_) => {
                tracing::warn!(endpoint = %endpoint, "Comment socket timed out");
                return None;
            }
        };
        if let Err(e) = connection.sender.send(subscription_frame(thread_id, post_key)) {
            tracing::warn!(error = %e, "Subscription send failed");
            return None;
        }
        tracing::info!(endpoint = %endpoint, thread = %thread_id, "Comment socket subscribed");
        Some(connection)
    }
}

/// Resolves at `deadline`; a duration too long to represent never expires
async fn expire_at(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn keepalive_timer(interval: Duration) -> tokio::time::Interval {
    let interval = interval.max(MIN_KEEP_INTERVAL);
    let mut timer = tokio::time::interval_at(Instant::now() + interval, interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Next event of the comment socket, or never if there is none
async fn next_comment_event(comment: &mut Option<Connection>) -> Option<TransportEvent> {
    match comment {
        Some(connection) => connection.events.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InProcessConnector;

    fn recorder(connector: InProcessConnector) -> Recorder<InProcessConnector> {
        Recorder::new(connector, ConnectionConfig::for_testing())
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_trimmed_comment_frames() {
        let (connector, mut listener) = InProcessConnector::new();
        let recorder = recorder(connector);

        let server = tokio::spawn(async move {
            let mut watch = listener.accept().await.unwrap();
            assert!(watch.next_sent().await.unwrap().contains("startWatching"));
            watch.push_text(r#"{"type":"seat","data":{"keepIntervalSec":30}}"#);
            watch.push_text(r#"{"type":"room","data":{"threadId":"77","yourPostKey":"k"}}"#);

            let mut comment = listener.accept().await.unwrap();
            assert_eq!(comment.url(), "wss://jikkyo.test/api/v1/channels/jk1/ws/comment");
            assert!(comment.next_sent().await.unwrap().contains("\"threadkey\":\"k\""));

            comment.push_text("  {\"chat\":{\"content\":\"hello\"}}\n");
            comment.push_text("   ");
            comment.push_text(r#"{"chat":{"content":"world"}}"#);
            watch.push_text(r#"{"type":"disconnect","data":{"reason":"END_PROGRAM"}}"#);
            (watch, comment)
        });

        let mut output = Vec::new();
        let summary = recorder
            .record("jk1", Duration::from_secs(600), &mut output, std::future::pending())
            .await
            .unwrap();
        let _ends = server.await.unwrap();

        assert_eq!(summary.stop_reason, StopReason::Disconnected("END_PROGRAM".into()));
        assert!(summary.subscribed);
        assert_eq!(summary.lines_written, 2);
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "{\"chat\":{\"content\":\"hello\"}}\n{\"chat\":{\"content\":\"world\"}}\n"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_duration_with_keepalive() {
        let (connector, mut listener) = InProcessConnector::new();
        let recorder = recorder(connector);

        let mut output = Vec::new();
        let record = recorder.record("jk1", Duration::from_secs(65), &mut output, std::future::pending());
        let (summary, sent) = tokio::join!(record, async {
            let mut watch = listener.accept().await.unwrap();
            watch.push_text(r#"{"type":"seat","data":{"keepIntervalSec":30}}"#);
            let mut sent = Vec::new();
            while let Some(frame) = watch.next_sent().await {
                sent.push(frame);
            }
            sent
        });

        assert_eq!(summary.unwrap().stop_reason, StopReason::DurationElapsed);
        let keep_seats = sent.iter().filter(|f| f.contains("keepSeat")).count();
        assert_eq!(keep_seats, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tiny_keep_interval_falls_back_to_default() {
        let (connector, mut listener) = InProcessConnector::new();
        let recorder = recorder(connector);

        let mut output = Vec::new();
        let record = recorder.record("jk1", Duration::from_secs(65), &mut output, std::future::pending());
        let (summary, sent) = tokio::join!(record, async {
            let mut watch = listener.accept().await.unwrap();
            watch.push_text(r#"{"type":"seat","data":{"keepIntervalSec":1e-12}}"#);
            let mut sent = Vec::new();
            while let Some(frame) = watch.next_sent().await {
                sent.push(frame);
            }
            sent
        });

        assert_eq!(summary.unwrap().stop_reason, StopReason::DurationElapsed);
        let keep_seats = sent.iter().filter(|f| f.contains("keepSeat")).count();
        assert_eq!(keep_seats, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_duration_records_until_disconnect() {
        let (connector, mut listener) = InProcessConnector::new();
        let recorder = recorder(connector);

        let mut output = Vec::new();
        let record = recorder.record(
            "jk1",
            Duration::from_secs(u64::MAX),
            &mut output,
            std::future::pending(),
        );
        let (summary, _watch) = tokio::join!(record, async {
            let mut watch = listener.accept().await.unwrap();
            watch.next_sent().await.unwrap();
            tokio::time::sleep(Duration::from_secs(3600)).await;
            watch.push_text(r#"{"type":"disconnect","data":{"reason":"END_PROGRAM"}}"#);
            watch
        });

        assert_eq!(
            summary.unwrap().stop_reason,
            StopReason::Disconnected("END_PROGRAM".into())
        );
    }

    #[tokio::test]
    async fn test_shutdown_signal_ends_recording() {
        let (connector, mut listener) = InProcessConnector::new();
        let recorder = recorder(connector);

        let mut output = Vec::new();
        let summary = recorder
            .record("jk1", Duration::from_secs(600), &mut output, async {})
            .await
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::Shutdown);
        assert_eq!(summary.lines_written, 0);
        assert!(listener.try_accept().is_some());
    }

    #[tokio::test]
    async fn test_refused_watch_is_an_error() {
        let (connector, _listener) = InProcessConnector::new();
        connector.set_refusing(true);
        let recorder = recorder(connector);

        let mut output = Vec::new();
        let result = recorder
            .record("jk1", Duration::from_secs(1), &mut output, std::future::pending())
            .await;
        assert!(matches!(result, Err(RecorderError::Connect(_))));
    }

    #[tokio::test]
    async fn test_record_to_file_creates_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jk1.jsonl");
        let (connector, _listener) = InProcessConnector::new();
        let recorder = recorder(connector);

        recorder
            .record_to_file("jk1", Duration::from_secs(600), &path, async {})
            .await
            .unwrap();
        assert!(path.exists());
    }
}
