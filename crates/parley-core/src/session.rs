use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use crate::ids::{SessionId, UserId};

/// An active two-party conversation.
///
/// Created atomically with a match and destroyed atomically with
/// termination; membership never changes in between, so a registered
/// session always has exactly two members.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    members: [UserId; 2],
    started_at: DateTime<Utc>,
    relayed: AtomicU64,
}

impl Session {
    /// Form a session from a newly arrived client and the waiting head.
    /// The id is derived in that order, matching the external wire format.
    pub fn form(arriving: UserId, waiting: UserId) -> Self {
        let id = SessionId::derive(&arriving, &waiting);
        Self::with_id(id, arriving, waiting)
    }

    /// Re-form with an explicit id (collision retry path).
    pub fn with_id(id: SessionId, first: UserId, second: UserId) -> Self {
        Self {
            id,
            members: [first, second],
            started_at: Utc::now(),
            relayed: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn members(&self) -> &[UserId; 2] {
        &self.members
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }

    /// The other member. `None` when `user` is not in the session.
    pub fn partner_of(&self, user: &UserId) -> Option<&UserId> {
        if *user == self.members[0] {
            Some(&self.members[1])
        } else if *user == self.members[1] {
            Some(&self.members[0])
        } else {
            None
        }
    }

    /// Count a relayed message toward the end-of-session summary.
    pub fn note_relayed(&self) -> u64 {
        self.relayed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn relayed_count(&self) -> u64 {
        self.relayed.load(Ordering::Relaxed)
    }
}
