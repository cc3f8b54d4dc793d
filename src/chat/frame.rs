//! Websocket frame shapes.
//!
//! Inbound frames carry a `type` discriminator:
//!
//! ```json
//! {"type": "chat_message", "message": "hi", "temp_id": "tmp-1"}
//! {"type": "typing", "typing": true}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{ChatError, clubs::messages::Message};

pub const MAX_MESSAGE_CHARS: usize = 500;

/// Stable for the lifetime of one connection; receivers compare it against
/// their own to recognise their echoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> SessionId {
        SessionId(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    ChatMessage {
        message: String,
        #[serde(default)]
        temp_id: Option<String>,
    },
    Typing {
        typing: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedFrame {
    pub reason: String,
    pub temp_id: Option<String>,
}

impl Inbound {
    /// On failure the client's `temp_id` is still recovered when the payload
    /// was a JSON object carrying one as a string.
    pub fn parse(raw: &str) -> Result<Inbound, MalformedFrame> {
        let value: Value = serde_json::from_str(raw).map_err(|err| MalformedFrame {
            reason: format!("malformed JSON: {err}"),
            temp_id: None,
        })?;

        let temp_id = value.get("temp_id").and_then(Value::as_str).map(str::to_owned);
        if !value.get("type").is_some_and(Value::is_string) {
            return Err(MalformedFrame { reason: "missing frame type".to_owned(), temp_id });
        }

        serde_json::from_value(value).map_err(|err| MalformedFrame {
            reason: format!("unsupported frame: {err}"),
            temp_id,
        })
    }
}

/// Returns the trimmed message to store.
pub fn validate_message(message: &str) -> Result<&str, ChatError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(ChatError::Validation("message is empty".to_owned()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ChatError::Validation(format!("message exceeds {MAX_MESSAGE_CHARS} characters")));
    }
    Ok(trimmed)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Joined {
        session_id: SessionId,
        room: String,
    },
    ChatMessage {
        id: String,
        message: String,
        username: String,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
        temp_id: Option<String>,
    },
    Typing {
        typing: bool,
        username: String,
        origin: SessionId,
    },
    Error {
        error: String,
        kind: &'static str,
        temp_id: Option<String>,
    },
}

impl Outbound {
    pub fn chat_message(message: &Message, temp_id: Option<String>) -> Outbound {
        Outbound::ChatMessage {
            id: message.id.clone(),
            message: message.content.clone(),
            username: message.sender.clone(),
            timestamp: message.timestamp,
            temp_id,
        }
    }

    pub fn error(err: &ChatError, temp_id: Option<String>) -> Outbound {
        Outbound::Error { error: err.to_string(), kind: err.kind(), temp_id }
    }
}
