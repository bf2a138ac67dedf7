//! Comment (stage-2) socket messages
//!
//! After opening the comment socket the client sends exactly one subscription
//! frame: a five-element array of ping markers around a `thread` request. The
//! ping objects are range padding and are never parsed back.

use serde_json::{json, Value};

use super::ProtocolError;

/// Thread protocol version sent in the subscription
pub const THREAD_VERSION: &str = "20061206";

/// Number of historical messages requested on subscribe
pub const HISTORY_LENGTH: i64 = 100;

/// Build the subscription frame for a resolved thread
#[must_use]
pub fn subscription_frame(thread_id: &str, post_key: &str) -> String {
    json!([
        { "ping": { "content": "rs:0" } },
        { "ping": { "content": "ps:0" } },
        {
            "thread": {
                "version": THREAD_VERSION,
                "thread": thread_id,
                "threadkey": post_key,
                "user_id": "",
                "res_from": -HISTORY_LENGTH,
            }
        },
        { "ping": { "content": "pf:0" } },
        { "ping": { "content": "rf:0" } },
    ])
    .to_string()
}

/// One object received on the comment socket
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommentFrame {
    /// A chat message
    Chat {
        /// Message text (may be empty)
        content: String,
    },
    /// Range marker
    Ping,
    /// Thread acknowledgement
    Thread,
    /// Anything else
    Other,
}

impl CommentFrame {
    /// Text of a chat frame with nonempty content
    #[must_use]
    pub fn chat_text(&self) -> Option<&str> {
        match self {
            Self::Chat { content } if !content.is_empty() => Some(content.as_str()),
            _ => None,
        }
    }

    fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        let Some(object) = value.as_object() else {
            return Err(ProtocolError::UnexpectedShape(format!(
                "expected object, got {value}"
            )));
        };

        if let Some(chat) = object.get("chat") {
            let content = chat
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Ok(Self::Chat { content });
        }
        if object.contains_key("ping") {
            return Ok(Self::Ping);
        }
        if object.contains_key("thread") {
            return Ok(Self::Thread);
        }
        Ok(Self::Other)
    }
}

/// Decode one text frame; a frame may hold a single object or an array
///
/// # Errors
///
/// Returns [`ProtocolError`] for invalid JSON or non-object elements.
pub fn decode_comment_frame(text: &str) -> Result<Vec<CommentFrame>, ProtocolError> {
    let value: Value = serde_json::from_str(text)?;
    match value {
        Value::Array(items) => items.iter().map(CommentFrame::from_value).collect(),
        other => Ok(vec![CommentFrame::from_value(&other)?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_subscription_frame_shape() {
        let frame: Value = serde_json::from_str(&subscription_frame("77", "k")).unwrap();
        assert_eq!(
            frame,
            json!([
                { "ping": { "content": "rs:0" } },
                { "ping": { "content": "ps:0" } },
                { "thread": {
                    "version": "20061206",
                    "thread": "77",
                    "threadkey": "k",
                    "user_id": "",
                    "res_from": -100
                } },
                { "ping": { "content": "pf:0" } },
                { "ping": { "content": "rf:0" } }
            ])
        );
    }

    #[test]
    fn test_decode_chat() {
        let frames = decode_comment_frame(r#"{"chat":{"content":"hello","no":1}}"#).unwrap();
        assert_eq!(
            frames,
            vec![CommentFrame::Chat {
                content: "hello".into()
            }]
        );
        assert_eq!(frames[0].chat_text(), Some("hello"));
    }

    #[test]
    fn test_decode_non_chat_frames() {
        let frames = decode_comment_frame(
            r#"[{"ping":{"content":"rs:0"}},{"thread":{"resultcode":0}},{"leave_thread":{}}]"#,
        )
        .unwrap();
        assert_eq!(
            frames,
            vec![CommentFrame::Ping, CommentFrame::Thread, CommentFrame::Other]
        );
        assert!(frames.iter().all(|f| f.chat_text().is_none()));
    }

    #[test]
    fn test_empty_chat_has_no_text() {
        let frames = decode_comment_frame(r#"{"chat":{"content":""}}"#).unwrap();
        assert_eq!(frames[0].chat_text(), None);

        let frames = decode_comment_frame(r#"{"chat":{}}"#).unwrap();
        assert_eq!(frames[0].chat_text(), None);
    }

    #[test]
    fn test_whitespace_chat_is_kept_verbatim() {
        let frames = decode_comment_frame(r#"{"chat":{"content":"　"}}"#).unwrap();
        assert_eq!(frames[0].chat_text(), Some("　"));
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            decode_comment_frame("{chat"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode_comment_frame("42"),
            Err(ProtocolError::UnexpectedShape(_))
        ));
    }
}
