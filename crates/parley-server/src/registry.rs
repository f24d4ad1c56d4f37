use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use parley_core::ids::{SessionId, UserId};
use parley_core::session::Session;

/// The derived id is already mapped to a live session. The caller retries
/// registration with a disambiguated id.
#[derive(Debug, thiserror::Error)]
#[error("session id {0} is already active")]
pub struct SessionCollision(pub SessionId);

/// Active sessions keyed by id, with an identity index for O(1) teardown
/// lookup on disconnect.
///
/// Both maps live under one mutex: a session and its member index entries
/// appear and disappear together, and `unregister` has exactly one winner
/// per id, which is what keeps simultaneous disconnects from notifying
/// twice.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Arc<Session>>,
    by_member: HashMap<UserId, SessionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: Session) -> Result<Arc<Session>, SessionCollision> {
        let mut inner = self.inner.lock();
        if inner.sessions.contains_key(session.id()) {
            return Err(SessionCollision(session.id().clone()));
        }

        let session = Arc::new(session);
        for member in session.members() {
            inner
                .by_member
                .insert(member.clone(), session.id().clone());
        }
        inner
            .sessions
            .insert(session.id().clone(), Arc::clone(&session));
        Ok(session)
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.inner.lock().sessions.get(id).cloned()
    }

    /// The session a connected identity is currently in, if any.
    pub fn session_of(&self, user: &UserId) -> Option<Arc<Session>> {
        let inner = self.inner.lock();
        let id = inner.by_member.get(user)?;
        inner.sessions.get(id).cloned()
    }

    /// Remove a session. The first caller receives it and performs the
    /// teardown notifications; later callers get `None`.
    pub fn unregister(&self, id: &SessionId) -> Option<Arc<Session>> {
        let mut inner = self.inner.lock();
        let session = inner.sessions.remove(id)?;
        for member in session.members() {
            if inner.by_member.get(member) == Some(id) {
                inner.by_member.remove(member);
            }
        }
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().sessions.is_empty()
    }
}
