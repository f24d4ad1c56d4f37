use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use parley_core::archive::{ArchiveStore, MessageRecord, Rating, SessionSummary};
use parley_core::events::ChatEvent;

/// Subscribes to the core's event broadcast and forwards to the archive
/// collaborator. The core never blocks on storage: a lagging bridge drops
/// events with a warning.
pub struct ArchiveBridge {
    archive: Arc<dyn ArchiveStore>,
}

impl ArchiveBridge {
    pub fn new(archive: Arc<dyn ArchiveStore>) -> Self {
        Self { archive }
    }

    pub fn start(&self, mut rx: broadcast::Receiver<ChatEvent>) -> tokio::task::JoinHandle<()> {
        let archive = Arc::clone(&self.archive);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => forward(archive.as_ref(), event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "archive bridge lagged, dropped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("archive bridge channel closed");
                        break;
                    }
                }
            }
        })
    }
}

async fn forward(archive: &dyn ArchiveStore, event: ChatEvent) {
    match event {
        ChatEvent::ChatRelayed {
            session_id,
            sender,
            content,
            timestamp,
        } => {
            archive
                .record_message(MessageRecord {
                    session_id,
                    sender,
                    content,
                    timestamp,
                })
                .await;
        }
        ChatEvent::SessionEnded {
            session_id,
            members,
            reason,
            started_at,
            ended_at,
            message_count,
        } => {
            let [user_a, user_b] = members;
            archive
                .record_session(SessionSummary {
                    session_id,
                    user_a,
                    user_b,
                    started_at,
                    ended_at,
                    end_reason: reason,
                    message_count,
                })
                .await;
        }
        ChatEvent::RatingSubmitted {
            session_id,
            user,
            rating,
            is_human_guess,
        } => {
            archive
                .record_rating(Rating {
                    session_id,
                    user,
                    rating,
                    is_human_guess,
                })
                .await;
        }
        ChatEvent::SessionStarted { .. } => {}
    }
}

/// Create a bridge wired to an event receiver.
pub fn create_bridge(
    archive: Arc<dyn ArchiveStore>,
    rx: broadcast::Receiver<ChatEvent>,
) -> tokio::task::JoinHandle<()> {
    ArchiveBridge::new(archive).start(rx)
}
