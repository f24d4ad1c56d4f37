use crate::ids::{SessionId, UserId};

/// Error taxonomy for the pairing/relay core.
///
/// Nothing here is fatal to the process; every failure is scoped to one
/// connection or one session. Only admission failures close the connection.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ChatError {
    // Closes the connection, no state created
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    // Logged, connection stays alive
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    // Surfaces as the affected member's own disconnect
    #[error("send to {user} failed: {reason}")]
    PeerSendFailure { user: UserId, reason: String },
}

impl ChatError {
    /// True when the connection must be closed (admission failures only).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthFailure(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthFailure(_) => "auth_failure",
            Self::UnknownSession(_) => "unknown_session",
            Self::MalformedMessage(_) => "malformed_message",
            Self::PeerSendFailure { .. } => "peer_send_failure",
        }
    }
}
