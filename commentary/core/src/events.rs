//! Commentary events
//!
//! Broadcast by the connection manager to every subscriber: sinks, the
//! compositor and any embedding UI.

use std::sync::Arc;

use crate::buffer::Comment;
use crate::session::SessionPhase;

/// Event broadcast by the connection manager
#[derive(Clone, Debug)]
pub enum CommentaryEvent {
    /// A chat message arrived on the live session
    Comment(Arc<Comment>),

    /// The session moved to another handshake phase
    PhaseChanged {
        /// Broadcaster the session belongs to
        broadcaster: String,
        /// Generation of the attempt
        generation: u64,
        /// New phase
        phase: SessionPhase,
    },

    /// Retries ran out; the session is gone
    RetriesExhausted {
        /// Broadcaster the session belonged to
        broadcaster: String,
        /// Retries spent
        attempts: u32,
    },
}

impl CommentaryEvent {
    /// The comment carried by this event, if any
    #[must_use]
    pub fn as_comment(&self) -> Option<&Arc<Comment>> {
        match self {
            Self::Comment(comment) => Some(comment),
            _ => None,
        }
    }
}
