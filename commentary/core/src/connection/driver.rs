//! Session tasks
//!
//! Each function here runs as its own tokio task and holds the generation it
//! was spawned under. Locks are taken only inside the synchronous `Shared`
//! helpers, never across an `.await`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use super::Shared;
use crate::events::CommentaryEvent;
use crate::protocol::{
    decode_comment_frame, subscription_frame, WatchCommand, WatchMessage, MIN_KEEP_INTERVAL,
};
use crate::session::SessionPhase;
use crate::transport::{Connection, ConnectionSender, TransportEvent};

/// Which of the two sockets an event concerns
#[derive(Clone, Copy, Debug)]
pub(super) enum Socket {
    Watch,
    Comment,
}

impl fmt::Display for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Watch => "watch",
            Self::Comment => "comment",
        })
    }
}

/// Result of handing a freshly opened socket to the session
enum Attach {
    Attached,
    Superseded,
    Failed(String),
}

/// What the reader loop should do after one frame
enum Flow {
    Continue,
    Stop,
    Fail(String),
}

/// Open the watch socket, request a seat, then pump watch frames
pub(super) async fn run_watch(shared: Arc<Shared>, generation: u64, url: String) {
    let Some(Connection { sender, mut events }) = open(&shared, generation, &url, Socket::Watch).await
    else {
        return;
    };

    match shared.attach_watch(generation, sender) {
        Attach::Attached => {}
        Attach::Superseded => return,
        Attach::Failed(reason) => {
            shared.fail(generation, Socket::Watch, &reason);
            return;
        }
    }

    while let Some(event) = events.recv().await {
        let flow = match event {
            TransportEvent::Text(text) => shared.on_watch_text(generation, &text),
            TransportEvent::Closed(reason) => Flow::Fail(closed_reason(reason)),
            TransportEvent::Error(error) => Flow::Fail(error),
        };
        match flow {
            Flow::Continue => {}
            Flow::Stop => return,
            Flow::Fail(reason) => {
                shared.fail(generation, Socket::Watch, &reason);
                return;
            }
        }
    }
    shared.fail(generation, Socket::Watch, "socket ended");
}

/// Open the comment socket, subscribe, then pump chat frames
pub(super) async fn run_comment(
    shared: Arc<Shared>,
    generation: u64,
    endpoint: String,
    thread_id: String,
    post_key: String,
) {
    let Some(Connection { sender, mut events }) =
        open(&shared, generation, &endpoint, Socket::Comment).await
    else {
        return;
    };

    match shared.attach_comment(generation, sender, &thread_id, &post_key) {
        Attach::Attached => {}
        Attach::Superseded => return,
        Attach::Failed(reason) => {
            shared.fail(generation, Socket::Comment, &reason);
            return;
        }
    }

    while let Some(event) = events.recv().await {
        let flow = match event {
            TransportEvent::Text(text) => shared.on_comment_text(generation, &text),
            TransportEvent::Closed(reason) => Flow::Fail(closed_reason(reason)),
            TransportEvent::Error(error) => Flow::Fail(error),
        };
        match flow {
            Flow::Continue => {}
            Flow::Stop => return,
            Flow::Fail(reason) => {
                shared.fail(generation, Socket::Comment, &reason);
                return;
            }
        }
    }
    shared.fail(generation, Socket::Comment, "socket ended");
}

/// Send `keepSeat` every `interval` until the session moves on
pub(super) async fn keep_seat(shared: Arc<Shared>, generation: u64, interval: Duration) {
    let interval = interval.max(MIN_KEEP_INTERVAL);
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !shared.send_keep_seat(generation) {
            return;
        }
    }
}

/// Wait out the backoff, then restart the handshake
pub(super) async fn retry_after(shared: Arc<Shared>, generation: u64, delay: Duration) {
    tokio::time::sleep(delay).await;
    shared.restart(generation);
}

async fn open(
    shared: &Arc<Shared>,
    generation: u64,
    url: &str,
    socket: Socket,
) -> Option<Connection> {
    let timeout = shared.config.connect_timeout;
    let error = match tokio::time::timeout(timeout, shared.connector.connect(url)).await {
        Ok(Ok(connection)) => {
            tracing::debug!(socket = %socket, url = %url, generation, "Commentary socket open");
            return Some(connection);
        }
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("connect timed out after {}ms", timeout.as_millis()),
    };
    shared.fail(generation, socket, &error);
    None
}

fn closed_reason(reason: Option<String>) -> String {
    match reason {
        Some(reason) => format!("socket closed: {reason}"),
        None => "socket closed".to_string(),
    }
}

impl Shared {
    fn attach_watch(&self, generation: u64, sender: ConnectionSender) -> Attach {
        let mut state = self.state.lock();
        let Some(session) = state.live(generation) else {
            tracing::debug!(generation, "Watch socket opened for a superseded session");
            return Attach::Superseded;
        };

        if let Err(e) = sender.send(WatchCommand::StartWatching.encode()) {
            return Attach::Failed(e.to_string());
        }
        session.watch = Some(sender);
        session.phase = SessionPhase::WatchSeatPending;
        self.emit_phase(session);
        Attach::Attached
    }

    fn attach_comment(
        &self,
        generation: u64,
        sender: ConnectionSender,
        thread_id: &str,
        post_key: &str,
    ) -> Attach {
        let mut state = self.state.lock();
        let Some(session) = state.live(generation) else {
            tracing::debug!(generation, "Comment socket opened for a superseded session");
            return Attach::Superseded;
        };

        if let Err(e) = sender.send(subscription_frame(thread_id, post_key)) {
            return Attach::Failed(e.to_string());
        }
        session.comment = Some(sender);
        session.phase = SessionPhase::CommentLive;
        session.retry_count = 0;
        tracing::info!(
            broadcaster = %session.broadcaster,
            thread = %thread_id,
            generation,
            "Commentary live"
        );
        self.emit_phase(session);
        Attach::Attached
    }

    fn on_watch_text(self: &Arc<Self>, generation: u64, text: &str) -> Flow {
        let message = match WatchMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "Dropping malformed watch frame");
                return Flow::Continue;
            }
        };

        let mut state = self.state.lock();
        let Some(session) = state.live(generation) else {
            return Flow::Stop;
        };

        match message {
            WatchMessage::Seat { keep_interval } => {
                let interval = keep_interval.unwrap_or(self.config.default_keep_interval);
                session.keep_alive_interval = interval;
                session.replace_keepalive(tokio::spawn(keep_seat(
                    Arc::clone(self),
                    generation,
                    interval,
                )));
                tracing::debug!(
                    interval_ms = interval.as_millis() as u64,
                    generation,
                    "Seat granted"
                );
                Flow::Continue
            }
            WatchMessage::Room(room) => {
                if session.thread_id.is_some() {
                    tracing::debug!(generation, "Ignoring repeated room message");
                    return Flow::Continue;
                }
                let endpoint = room
                    .message_server
                    .unwrap_or_else(|| self.config.comment_url(&session.room_id));

                session.thread_id = Some(room.thread_id.clone());
                session.post_key = Some(room.post_key.clone());
                session.comment_endpoint = Some(endpoint.clone());
                session.phase = SessionPhase::RoomResolved;
                self.emit_phase(session);

                session.phase = SessionPhase::ConnectingComment;
                self.emit_phase(session);
                session.track(tokio::spawn(run_comment(
                    Arc::clone(self),
                    generation,
                    endpoint,
                    room.thread_id,
                    room.post_key,
                )));
                Flow::Continue
            }
            WatchMessage::Ping => {
                if let Some(watch) = &session.watch {
                    if let Err(e) = watch.send(WatchCommand::Pong.encode()) {
                        return Flow::Fail(format!("pong failed: {e}"));
                    }
                }
                Flow::Continue
            }
            WatchMessage::Disconnect { reason } => Flow::Fail(format!("server disconnect: {reason}")),
            WatchMessage::Error { message } => Flow::Fail(format!("server error: {message}")),
            WatchMessage::Other(kind) => {
                tracing::debug!(kind = %kind, "Ignoring watch message");
                Flow::Continue
            }
        }
    }

    fn on_comment_text(&self, generation: u64, text: &str) -> Flow {
        let frames = match decode_comment_frame(text) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::debug!(error = %e, "Dropping malformed comment frame");
                return Flow::Continue;
            }
        };

        // Held while recording so `stop` cannot interleave with an emit
        let state = self.state.lock();
        if state.live_ref(generation).is_none() {
            return Flow::Stop;
        }

        let now = Instant::now();
        for text in frames.iter().filter_map(|frame| frame.chat_text()) {
            let comment = self.buffer.record(text, now);
            self.emit(CommentaryEvent::Comment(comment));
        }
        Flow::Continue
    }

    fn send_keep_seat(&self, generation: u64) -> bool {
        let state = self.state.lock();
        let Some(watch) = state
            .live_ref(generation)
            .and_then(|session| session.watch.as_ref())
        else {
            return false;
        };

        match watch.send(WatchCommand::KeepSeat.encode()) {
            Ok(()) => {
                tracing::trace!(generation, "Sent keepSeat");
                true
            }
            // The watch reader reports the close
            Err(_) => false,
        }
    }

    /// Tear down after a socket failure and schedule a retry if any remain
    fn fail(self: &Arc<Self>, generation: u64, socket: Socket, reason: &str) {
        let mut state = self.state.lock();
        if state.live_ref(generation).is_none() {
            tracing::debug!(socket = %socket, generation, reason, "Ignoring failure of a superseded session");
            return;
        }

        state.generation += 1;
        let next = state.generation;
        let retry_max = self.config.retry_max;
        let retry_delay = self.config.retry_delay;

        let Some(session) = state.session.as_mut() else {
            return;
        };
        session.teardown();
        tracing::warn!(
            broadcaster = %session.broadcaster,
            socket = %socket,
            reason,
            retry_count = session.retry_count,
            "Commentary connection lost"
        );

        if session.retry_count >= retry_max {
            let broadcaster = session.broadcaster.clone();
            let attempts = session.retry_count;
            session.phase = SessionPhase::Idle;
            session.generation = next;
            self.emit_phase(session);
            state.session = None;

            tracing::warn!(
                broadcaster = %broadcaster,
                attempts,
                "Commentary retries exhausted, giving up"
            );
            self.emit(CommentaryEvent::RetriesExhausted {
                broadcaster,
                attempts,
            });
            return;
        }

        session.retry_count += 1;
        session.generation = next;
        session.phase = SessionPhase::RetryWait;
        tracing::info!(
            broadcaster = %session.broadcaster,
            attempt = session.retry_count,
            delay_ms = retry_delay.as_millis() as u64,
            "Scheduling commentary reconnect"
        );
        self.emit_phase(session);
        session.track(tokio::spawn(retry_after(Arc::clone(self), next, retry_delay)));
    }

    fn restart(self: &Arc<Self>, generation: u64) {
        let mut state = self.state.lock();
        let Some(session) = state.live(generation) else {
            return;
        };

        session.phase = SessionPhase::ConnectingWatch;
        self.emit_phase(session);
        let url = self.config.watch_url(&session.room_id);
        session.track(tokio::spawn(run_watch(Arc::clone(self), generation, url)));
    }
}
