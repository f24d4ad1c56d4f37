use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::EndReason;
use crate::ids::{SessionId, UserId};

/// Durable record of a completed session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub user_a: UserId,
    pub user_b: UserId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub end_reason: EndReason,
    pub message_count: u64,
}

/// A relayed chat message as handed to the archive. Transient in the core;
/// never reconstructed from session state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageRecord {
    pub session_id: SessionId,
    pub sender: UserId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A partner rating submitted during or after a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rating {
    pub session_id: SessionId,
    pub user: UserId,
    pub rating: i32,
    pub is_human_guess: bool,
}

/// Durable store for sessions, messages, and ratings.
///
/// Fire-and-forget from the core's perspective: implementations own their
/// failures and must not propagate them back into the relay path.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn record_session(&self, summary: SessionSummary);
    async fn record_message(&self, message: MessageRecord);
    async fn record_rating(&self, rating: Rating);
}
