//! Commentary Session
//!
//! A session is one attempt to watch commentary for one broadcaster. It owns
//! the socket senders and every task spawned on its behalf, so tearing it
//! down closes the sockets and cancels the timers in one place.
//!
//! # Generations
//!
//! The connection manager keeps a monotonically increasing generation
//! counter. Every task captures the generation it was spawned under and
//! becomes a no-op once the counter moves on, so a slow-closing socket from a
//! superseded session can never touch the current one.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::transport::ConnectionSender;

/// Where a session is in the two-socket handshake
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    /// No session
    Idle,
    /// Opening the watch socket
    ConnectingWatch,
    /// Watch socket open, waiting for seat and room
    WatchSeatPending,
    /// Room resolved, comment socket not yet requested
    RoomResolved,
    /// Opening the comment socket
    ConnectingComment,
    /// Subscribed; comments are flowing
    CommentLive,
    /// Waiting out the backoff before the next attempt
    RetryWait,
    /// Stopped by the caller
    Closed,
}

impl SessionPhase {
    /// Whether a network operation is pending or established
    #[must_use]
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Idle | Self::Closed)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ConnectingWatch => "connecting-watch",
            Self::WatchSeatPending => "watch-seat-pending",
            Self::RoomResolved => "room-resolved",
            Self::ConnectingComment => "connecting-comment",
            Self::CommentLive => "comment-live",
            Self::RetryWait => "retry-wait",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Live session state owned by the connection manager
pub struct Session {
    /// Broadcaster display name
    pub(crate) broadcaster: String,
    /// Commentary room id
    pub(crate) room_id: String,
    /// Generation of the current attempt
    pub(crate) generation: u64,
    pub(crate) phase: SessionPhase,
    pub(crate) thread_id: Option<String>,
    pub(crate) post_key: Option<String>,
    pub(crate) comment_endpoint: Option<String>,
    pub(crate) retry_count: u32,
    pub(crate) keep_alive_interval: Duration,
    pub(crate) watch: Option<ConnectionSender>,
    pub(crate) comment: Option<ConnectionSender>,
    keepalive: Option<JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    pub(crate) fn new(
        broadcaster: impl Into<String>,
        room_id: impl Into<String>,
        generation: u64,
        keep_alive_interval: Duration,
    ) -> Self {
        Self {
            broadcaster: broadcaster.into(),
            room_id: room_id.into(),
            generation,
            phase: SessionPhase::ConnectingWatch,
            thread_id: None,
            post_key: None,
            comment_endpoint: None,
            retry_count: 0,
            keep_alive_interval,
            watch: None,
            comment: None,
            keepalive: None,
            tasks: Vec::new(),
        }
    }

    /// Keep `handle` so teardown can cancel it
    pub(crate) fn track(&mut self, handle: JoinHandle<()>) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(handle);
    }

    /// Install the keepalive task, cancelling any previous one
    ///
    /// A repeated `seat` message restarts the keepalive at the new interval
    /// instead of stacking a second timer.
    pub(crate) fn replace_keepalive(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.keepalive.replace(handle) {
            previous.abort();
        }
    }

    /// Close both sockets, cancel every task, forget the resolved room
    ///
    /// Broadcaster, room id and retry count survive so the handshake can be
    /// restarted.
    pub(crate) fn teardown(&mut self) {
        if let Some(keepalive) = self.keepalive.take() {
            keepalive.abort();
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.watch = None;
        self.comment = None;
        self.thread_id = None;
        self.post_key = None;
        self.comment_endpoint = None;
    }

    /// Read-only view for callers
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            broadcaster: self.broadcaster.clone(),
            room_id: self.room_id.clone(),
            generation: self.generation,
            phase: self.phase,
            thread_id: self.thread_id.clone(),
            comment_endpoint: self.comment_endpoint.clone(),
            retry_count: self.retry_count,
            keep_alive_interval: self.keep_alive_interval,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(keepalive) = &self.keepalive {
            keepalive.abort();
        }
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("broadcaster", &self.broadcaster)
            .field("room_id", &self.room_id)
            .field("generation", &self.generation)
            .field("phase", &self.phase)
            .field("retry_count", &self.retry_count)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

/// Point-in-time copy of a session's public state
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Broadcaster display name
    pub broadcaster: String,
    /// Commentary room id
    pub room_id: String,
    /// Generation of the current attempt
    pub generation: u64,
    /// Handshake phase
    pub phase: SessionPhase,
    /// Resolved thread id
    pub thread_id: Option<String>,
    /// Resolved comment socket endpoint
    pub comment_endpoint: Option<String>,
    /// Retries used since the last successful connect
    pub retry_count: u32,
    /// Keepalive interval in effect
    pub keep_alive_interval: Duration,
}
