use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SessionId, UserId};

/// Why a session was torn down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// A member sent an explicit `end_session` frame.
    Explicit,
    /// A member's receive stream terminated.
    Disconnect,
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicit"),
            Self::Disconnect => write!(f, "disconnect"),
        }
    }
}

impl std::str::FromStr for EndReason {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "explicit" => Ok(Self::Explicit),
            "disconnect" => Ok(Self::Disconnect),
            other => Err(format!("unknown end reason: {other}")),
        }
    }
}

/// Domain events broadcast by the pairing/relay core.
///
/// The archive bridge is the only persistent consumer; the core itself
/// never touches storage.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    #[serde(rename = "session_started")]
    SessionStarted {
        session_id: SessionId,
        members: [UserId; 2],
        started_at: DateTime<Utc>,
    },

    #[serde(rename = "chat_relayed")]
    ChatRelayed {
        session_id: SessionId,
        sender: UserId,
        content: String,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "session_ended")]
    SessionEnded {
        session_id: SessionId,
        members: [UserId; 2],
        reason: EndReason,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        message_count: u64,
    },

    #[serde(rename = "rating_submitted")]
    RatingSubmitted {
        session_id: SessionId,
        user: UserId,
        rating: i32,
        is_human_guess: bool,
    },
}

impl ChatEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::SessionStarted { session_id, .. }
            | Self::ChatRelayed { session_id, .. }
            | Self::SessionEnded { session_id, .. }
            | Self::RatingSubmitted { session_id, .. } => session_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::ChatRelayed { .. } => "chat_relayed",
            Self::SessionEnded { .. } => "session_ended",
            Self::RatingSubmitted { .. } => "rating_submitted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_accessor() {
        let sid = SessionId::from_raw("alice-bob");
        let evt = ChatEvent::SessionStarted {
            session_id: sid.clone(),
            members: [UserId::from_raw("alice"), UserId::from_raw("bob")],
            started_at: Utc::now(),
        };
        assert_eq!(evt.session_id(), &sid);
    }

    #[test]
    fn event_type_matches_serde_tag() {
        let evt = ChatEvent::ChatRelayed {
            session_id: SessionId::from_raw("a-b"),
            sender: UserId::from_raw("a"),
            content: "hi".into(),
            timestamp: Utc::now(),
        };
        let json: serde_json::Value = serde_json::to_value(&evt).unwrap();
        assert_eq!(json["type"], evt.event_type());
    }

    #[test]
    fn end_reason_is_snake_case_on_the_wire() {
        let evt = ChatEvent::SessionEnded {
            session_id: SessionId::from_raw("a-b"),
            members: [UserId::from_raw("a"), UserId::from_raw("b")],
            reason: EndReason::Disconnect,
            started_at: Utc::now(),
            ended_at: Utc::now(),
            message_count: 3,
        };
        let json: serde_json::Value = serde_json::to_value(&evt).unwrap();
        assert_eq!(json["reason"], "disconnect");
        assert_eq!(json["message_count"], 3);
    }

    #[test]
    fn serde_roundtrip() {
        let events = vec![
            ChatEvent::SessionStarted {
                session_id: SessionId::from_raw("a-b"),
                members: [UserId::from_raw("a"), UserId::from_raw("b")],
                started_at: Utc::now(),
            },
            ChatEvent::RatingSubmitted {
                session_id: SessionId::from_raw("a-b"),
                user: UserId::from_raw("a"),
                rating: 5,
                is_human_guess: false,
            },
        ];
        for evt in &events {
            let json = serde_json::to_string(evt).unwrap();
            let parsed: ChatEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(serde_json::to_string(&parsed).unwrap(), json);
        }
    }
}
