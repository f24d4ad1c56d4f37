use serde::{Deserialize, Serialize};

use crate::errors::ChatError;
use crate::ids::{SessionId, UserId};

/// Frames a connected client may send. Field names are fixed for wire
/// compatibility; anything that fails to parse is a logged anomaly, not a
/// connection error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "chat_message")]
    ChatMessage {
        session_id: SessionId,
        content: String,
    },

    #[serde(rename = "end_session")]
    EndSession { session_id: SessionId },

    #[serde(rename = "rating")]
    Rating {
        session_id: SessionId,
        rating: i32,
        is_human_guess: bool,
    },
}

impl ClientFrame {
    pub fn parse(raw: &str) -> Result<Self, ChatError> {
        serde_json::from_str(raw).map_err(|e| ChatError::MalformedMessage(e.to_string()))
    }

    pub fn frame_type(&self) -> &'static str {
        match self {
            Self::ChatMessage { .. } => "chat_message",
            Self::EndSession { .. } => "end_session",
            Self::Rating { .. } => "rating",
        }
    }

    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::ChatMessage { session_id, .. }
            | Self::EndSession { session_id }
            | Self::Rating { session_id, .. } => session_id,
        }
    }
}

/// Frames pushed to a connected client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "session_start")]
    SessionStart {
        session_id: SessionId,
        partner: UserId,
    },

    #[serde(rename = "session_end")]
    SessionEnd { session_id: SessionId },

    #[serde(rename = "chat_message")]
    ChatMessage {
        session_id: SessionId,
        user: UserId,
        message: String,
    },
}

impl ServerFrame {
    pub fn to_json(&self) -> Result<String, ChatError> {
        serde_json::to_string(self).map_err(|e| ChatError::MalformedMessage(e.to_string()))
    }

    pub fn frame_type(&self) -> &'static str {
        match self {
            Self::SessionStart { .. } => "session_start",
            Self::SessionEnd { .. } => "session_end",
            Self::ChatMessage { .. } => "chat_message",
        }
    }
}
