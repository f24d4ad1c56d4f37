use async_trait::async_trait;
use tracing::warn;

use parley_core::archive::{ArchiveStore, MessageRecord, Rating, SessionSummary};

use crate::database::Database;
use crate::messages::MessageRepo;
use crate::ratings::RatingRepo;
use crate::sessions::SessionArchiveRepo;

/// SQLite-backed archive store.
///
/// Fire-and-forget per the collaborator contract: failures are logged here
/// and never reach the relay path.
pub struct SqliteArchive {
    sessions: SessionArchiveRepo,
    messages: MessageRepo,
    ratings: RatingRepo,
}

impl SqliteArchive {
    pub fn new(db: Database) -> Self {
        Self {
            sessions: SessionArchiveRepo::new(db.clone()),
            messages: MessageRepo::new(db.clone()),
            ratings: RatingRepo::new(db),
        }
    }

    pub fn sessions(&self) -> &SessionArchiveRepo {
        &self.sessions
    }

    pub fn messages(&self) -> &MessageRepo {
        &self.messages
    }

    pub fn ratings(&self) -> &RatingRepo {
        &self.ratings
    }
}

#[async_trait]
impl ArchiveStore for SqliteArchive {
    async fn record_session(&self, summary: SessionSummary) {
        if let Err(e) = self.sessions.record(&summary) {
            warn!(session_id = %summary.session_id, error = %e, "failed to archive session");
        }
    }

    async fn record_message(&self, message: MessageRecord) {
        if let Err(e) = self.messages.record(&message) {
            warn!(session_id = %message.session_id, error = %e, "failed to archive message");
        }
    }

    async fn record_rating(&self, rating: Rating) {
        if let Err(e) = self.ratings.record(&rating) {
            warn!(session_id = %rating.session_id, error = %e, "failed to archive rating");
        }
    }
}
