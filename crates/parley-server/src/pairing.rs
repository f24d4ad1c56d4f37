use std::collections::VecDeque;

use parking_lot::Mutex;

use parley_core::ids::UserId;
use parley_core::session::Session;

/// FIFO waiting list of clients with no current partner.
///
/// One mutex serializes `enqueue_or_match` and `remove`: no two concurrent
/// arrivals can match the same waiting client, and a client removed
/// concurrently with a match attempt is either matched or removed, never
/// both and never lost. Popping the head and forming the session happen
/// under the lock, so it is a single queue operation.
#[derive(Default)]
pub struct PairingQueue {
    waiting: Mutex<VecDeque<UserId>>,
}

impl PairingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match the arrival against the waiting head, or enqueue it.
    /// The returned session still has to be registered; the caller owns
    /// notifying both members.
    pub fn enqueue_or_match(&self, arriving: UserId) -> Option<Session> {
        let mut waiting = self.waiting.lock();
        match waiting.pop_front() {
            Some(head) => Some(Session::form(arriving, head)),
            None => {
                waiting.push_back(arriving);
                None
            }
        }
    }

    /// Remove a still-waiting client. Idempotent: returns false when the
    /// client is not in the list.
    pub fn remove(&self, user: &UserId) -> bool {
        let mut waiting = self.waiting.lock();
        match waiting.iter().position(|u| u == user) {
            Some(pos) => {
                waiting.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.waiting.lock().iter().any(|u| u == user)
    }

    pub fn len(&self) -> usize {
        self.waiting.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.lock().is_empty()
    }
}
