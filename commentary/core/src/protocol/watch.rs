//! Watch (stage-1) socket messages

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use super::ProtocolError;

/// Shortest keepalive interval honoured; anything shorter counts as absent
pub const MIN_KEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Room details resolved from a `room` message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomInfo {
    /// Comment thread id
    pub thread_id: String,
    /// Key authorizing the thread subscription
    pub post_key: String,
    /// Comment socket endpoint, when the server names one
    pub message_server: Option<String>,
}

/// Inbound message on the watch socket
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchMessage {
    /// A viewing seat was granted
    Seat {
        /// Keepalive interval, if the server supplied a usable one (at least one second)
        keep_interval: Option<Duration>,
    },
    /// The comment room was resolved
    Room(RoomInfo),
    /// Liveness probe; must be answered with a pong
    Ping,
    /// The server is reclaiming the seat
    Disconnect {
        /// Server-supplied reason
        reason: String,
    },
    /// The server reported an error
    Error {
        /// Server-supplied message
        message: String,
    },
    /// Any other message kind (`statistics`, `schedule`, ...)
    Other(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RoomData {
    thread_id: Value,
    your_post_key: Option<String>,
    message_server: Option<MessageServer>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct MessageServer {
    uri: Option<String>,
}

impl WatchMessage {
    /// Decode one text frame from the watch socket
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the frame is not a JSON object with a
    /// string `type` field, or a `room` message lacks a thread id.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;

        match envelope.kind.as_str() {
            "seat" => {
                let keep_interval = envelope
                    .data
                    .get("keepIntervalSec")
                    .and_then(Value::as_f64)
                    .and_then(keep_interval_from_secs);
                Ok(Self::Seat { keep_interval })
            }
            "room" => {
                let data: RoomData = serde_json::from_value(envelope.data)?;
                let thread_id = match data.thread_id {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    _ => String::new(),
                };
                if thread_id.is_empty() {
                    return Err(ProtocolError::UnexpectedShape(
                        "room message without threadId".into(),
                    ));
                }
                Ok(Self::Room(RoomInfo {
                    thread_id,
                    post_key: data.your_post_key.unwrap_or_default(),
                    message_server: data
                        .message_server
                        .and_then(|ms| ms.uri)
                        .filter(|uri| !uri.is_empty()),
                }))
            }
            "ping" => Ok(Self::Ping),
            "disconnect" => Ok(Self::Disconnect {
                reason: string_field(&envelope.data, "reason")
                    .unwrap_or_else(|| "unknown".to_string()),
            }),
            "error" => Ok(Self::Error {
                message: string_field(&envelope.data, "message").unwrap_or_default(),
            }),
            other => Ok(Self::Other(other.to_string())),
        }
    }
}

/// Interval from a server-supplied seconds value; `None` when out of range,
/// non-finite, or shorter than [`MIN_KEEP_INTERVAL`]
#[must_use]
pub fn keep_interval_from_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|interval| *interval >= MIN_KEEP_INTERVAL)
}

fn string_field(data: &Value, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Outbound message on the watch socket
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchCommand {
    /// Request a viewing seat
    StartWatching,
    /// Keep the granted seat
    KeepSeat,
    /// Answer a server ping
    Pong,
}

impl WatchCommand {
    /// Encode as a text frame
    #[must_use]
    pub fn encode(self) -> String {
        let value = match self {
            Self::StartWatching => json!({ "type": "startWatching", "data": {} }),
            Self::KeepSeat => json!({ "type": "keepSeat" }),
            Self::Pong => json!({ "type": "pong" }),
        };
        value.to_string()
    }
}
