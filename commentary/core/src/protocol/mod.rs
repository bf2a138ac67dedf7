//! Commentary Wire Protocol
//!
//! JSON message types for the two sockets of a commentary session:
//!
//! - [`watch`]: stage-1 socket that holds the viewing seat and resolves the room
//! - [`comment`]: stage-2 socket that streams the room's chat messages
//!
//! Decoding is lenient: unknown message kinds are reported as such rather than
//! failing, and only structurally broken frames produce a [`ProtocolError`].

pub mod comment;
pub mod watch;

use thiserror::Error;

pub use comment::{decode_comment_frame, subscription_frame, CommentFrame, THREAD_VERSION};
pub use watch::{keep_interval_from_secs, RoomInfo, WatchCommand, WatchMessage, MIN_KEEP_INTERVAL};

/// Errors decoding a protocol frame
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame is not valid JSON
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Frame is JSON but not shaped like any known message
    #[error("Unexpected frame shape: {0}")]
    UnexpectedShape(String),
}
