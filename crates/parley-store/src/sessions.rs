use serde::{Deserialize, Serialize};
use tracing::instrument;

use parley_core::archive::SessionSummary;
use parley_core::events::EndReason;
use parley_core::ids::{SessionId, UserId};

use crate::database::Database;
use crate::error::StoreError;

/// A completed session as stored. Session ids may repeat across history
/// (the same pair can match again after their first session ends), so rows
/// are keyed by rowid and `session_id` is an indexed, non-unique column.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: i64,
    pub session_id: SessionId,
    pub user_a: UserId,
    pub user_b: UserId,
    pub started_at: String,
    pub ended_at: String,
    pub end_reason: EndReason,
    pub message_count: u64,
}

pub struct SessionArchiveRepo {
    db: Database,
}

impl SessionArchiveRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a completed session.
    #[instrument(skip(self, summary), fields(session_id = %summary.session_id))]
    pub fn record(&self, summary: &SessionSummary) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (session_id, user_a, user_b, started_at, ended_at, end_reason, message_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    summary.session_id.as_str(),
                    summary.user_a.as_str(),
                    summary.user_b.as_str(),
                    summary.started_at.to_rfc3339(),
                    summary.ended_at.to_rfc3339(),
                    summary.end_reason.to_string(),
                    summary.message_count as i64,
                ],
            )?;
            Ok(())
        })
    }

    /// Most recent record for a session id.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn get(&self, session_id: &SessionId) -> Result<SessionRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, user_a, user_b, started_at, ended_at, end_reason, message_count
                 FROM sessions WHERE session_id = ?1 ORDER BY id DESC LIMIT 1",
            )?;
            let mut rows = stmt.query([session_id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_session(row),
                None => Err(StoreError::NotFound(format!("session {session_id}"))),
            }
        })
    }

    /// Recently ended sessions, newest first.
    #[instrument(skip(self))]
    pub fn list_recent(&self, limit: u32) -> Result<Vec<SessionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, user_a, user_b, started_at, ended_at, end_reason, message_count
                 FROM sessions ORDER BY id DESC LIMIT ?1",
            )?;
            let mut rows = stmt.query([limit])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_session(row)?);
            }
            Ok(results)
        })
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<SessionRow, StoreError> {
    let reason_str: String = row.get(6)?;
    let end_reason = reason_str
        .parse()
        .map_err(|reason| StoreError::CorruptRow {
            table: "sessions",
            column: "end_reason",
            reason,
        })?;

    Ok(SessionRow {
        id: row.get(0)?,
        session_id: SessionId::from_raw(row.get::<_, String>(1)?),
        user_a: UserId::from_raw(row.get::<_, String>(2)?),
        user_b: UserId::from_raw(row.get::<_, String>(3)?),
        started_at: row.get(4)?,
        ended_at: row.get(5)?,
        end_reason,
        message_count: row.get::<_, i64>(7)? as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn summary(session_id: &str, count: u64) -> SessionSummary {
        SessionSummary {
            session_id: SessionId::from_raw(session_id),
            user_a: UserId::from_raw("alice"),
            user_b: UserId::from_raw("bob"),
            started_at: Utc::now(),
            ended_at: Utc::now(),
            end_reason: EndReason::Explicit,
            message_count: count,
        }
    }

    #[test]
    fn record_and_get() {
        let repo = SessionArchiveRepo::new(Database::in_memory().unwrap());
        repo.record(&summary("alice-bob", 4)).unwrap();

        let row = repo.get(&SessionId::from_raw("alice-bob")).unwrap();
        assert_eq!(row.user_a.as_str(), "alice");
        assert_eq!(row.user_b.as_str(), "bob");
        assert_eq!(row.message_count, 4);
        assert_eq!(row.end_reason, EndReason::Explicit);
    }

    #[test]
    fn get_unknown_is_not_found() {
        let repo = SessionArchiveRepo::new(Database::in_memory().unwrap());
        let result = repo.get(&SessionId::from_raw("nobody-noone"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn repeated_session_id_keeps_both_records() {
        let repo = SessionArchiveRepo::new(Database::in_memory().unwrap());
        repo.record(&summary("alice-bob", 1)).unwrap();
        repo.record(&summary("alice-bob", 9)).unwrap();

        // get returns the most recent run of the pair
        let row = repo.get(&SessionId::from_raw("alice-bob")).unwrap();
        assert_eq!(row.message_count, 9);

        let all = repo.list_recent(10).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn list_recent_orders_newest_first() {
        let repo = SessionArchiveRepo::new(Database::in_memory().unwrap());
        repo.record(&summary("a-b", 0)).unwrap();
        repo.record(&summary("c-d", 0)).unwrap();
        repo.record(&summary("e-f", 0)).unwrap();

        let rows = repo.list_recent(2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].session_id.as_str(), "e-f");
        assert_eq!(rows[1].session_id.as_str(), "c-d");
    }

    #[test]
    fn corrupt_end_reason_is_reported() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (session_id, user_a, user_b, started_at, ended_at, end_reason, message_count)
                 VALUES ('a-b', 'a', 'b', '', '', 'INVALID', 0)",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let repo = SessionArchiveRepo::new(db);
        let result = repo.get(&SessionId::from_raw("a-b"));
        assert!(matches!(result, Err(StoreError::CorruptRow { .. })));
    }
}
