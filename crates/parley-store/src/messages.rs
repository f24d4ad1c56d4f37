use serde::{Deserialize, Serialize};
use tracing::instrument;

use parley_core::archive::MessageRecord;
use parley_core::ids::{SessionId, UserId};

use crate::database::Database;
use crate::error::StoreError;

/// A relayed message as stored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: i64,
    pub session_id: SessionId,
    pub sender: UserId,
    pub content: String,
    pub timestamp: String,
}

pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, message), fields(session_id = %message.session_id))]
    pub fn record(&self, message: &MessageRecord) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (session_id, sender, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    message.session_id.as_str(),
                    message.sender.as_str(),
                    message.content,
                    message.timestamp.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Messages for a session in relay order.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn list_for_session(&self, session_id: &SessionId) -> Result<Vec<MessageRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, sender, content, timestamp
                 FROM messages WHERE session_id = ?1 ORDER BY id ASC",
            )?;
            let mut rows = stmt.query([session_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(MessageRow {
                    id: row.get(0)?,
                    session_id: SessionId::from_raw(row.get::<_, String>(1)?),
                    sender: UserId::from_raw(row.get::<_, String>(2)?),
                    content: row.get(3)?,
                    timestamp: row.get(4)?,
                });
            }
            Ok(results)
        })
    }
}
