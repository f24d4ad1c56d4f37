use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use parley_core::archive::Rating;
use parley_core::ids::{SessionId, UserId};

use crate::database::Database;
use crate::error::StoreError;

/// A submitted rating as stored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RatingRow {
    pub id: i64,
    pub session_id: SessionId,
    pub user: UserId,
    pub rating: i32,
    pub is_human_guess: bool,
    pub created_at: String,
}

pub struct RatingRepo {
    db: Database,
}

impl RatingRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, rating), fields(session_id = %rating.session_id, user = %rating.user))]
    pub fn record(&self, rating: &Rating) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO ratings (session_id, user, rating, is_human_guess, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    rating.session_id.as_str(),
                    rating.user.as_str(),
                    rating.rating,
                    rating.is_human_guess,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn list_for_session(&self, session_id: &SessionId) -> Result<Vec<RatingRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, user, rating, is_human_guess, created_at
                 FROM ratings WHERE session_id = ?1 ORDER BY id ASC",
            )?;
            let mut rows = stmt.query([session_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(RatingRow {
                    id: row.get(0)?,
                    session_id: SessionId::from_raw(row.get::<_, String>(1)?),
                    user: UserId::from_raw(row.get::<_, String>(2)?),
                    rating: row.get(3)?,
                    is_human_guess: row.get(4)?,
                    created_at: row.get(5)?,
                });
            }
            Ok(results)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating(session_id: &str, user: &str, score: i32) -> Rating {
        Rating {
            session_id: SessionId::from_raw(session_id),
            user: UserId::from_raw(user),
            rating: score,
            is_human_guess: true,
        }
    }

    #[test]
    fn record_and_list() {
        let repo = RatingRepo::new(Database::in_memory().unwrap());
        repo.record(&rating("alice-bob", "alice", 5)).unwrap();
        repo.record(&rating("alice-bob", "bob", 2)).unwrap();

        let rows = repo.list_for_session(&SessionId::from_raw("alice-bob")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].user.as_str(), "alice");
        assert_eq!(rows[0].rating, 5);
        assert!(rows[0].is_human_guess);
        assert!(!rows[0].created_at.is_empty());
    }

    #[test]
    fn both_members_can_rate_independently() {
        let repo = RatingRepo::new(Database::in_memory().unwrap());
        repo.record(&rating("alice-bob", "alice", 1)).unwrap();
        repo.record(&rating("carol-dan", "carol", 4)).unwrap();

        let rows = repo.list_for_session(&SessionId::from_raw("carol-dan")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user.as_str(), "carol");
    }
}
