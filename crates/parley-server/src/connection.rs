use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::stream::SplitSink;
use futures::SinkExt;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use parley_core::errors::ChatError;
use parley_core::ids::UserId;
use parley_core::protocol::ServerFrame;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(90);

/// WebSocket close code for admission refusal.
pub const POLICY_VIOLATION: u16 = 1008;

/// One live duplex connection, keyed by its verified identity.
pub struct Client {
    identity: UserId,
    tx: mpsc::Sender<String>,
    connected: AtomicBool,
    last_pong: AtomicU64,
}

impl Client {
    fn new(identity: UserId, tx: mpsc::Sender<String>) -> Self {
        Self {
            identity,
            tx,
            connected: AtomicBool::new(true),
            last_pong: AtomicU64::new(now_secs()),
        }
    }

    pub fn identity(&self) -> &UserId {
        &self.identity
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    fn is_alive(&self) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < CLIENT_TIMEOUT.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all connected clients.
///
/// Each client owns a bounded outbound queue. Senders use `try_send`, so a
/// slow consumer drops its own frames instead of stalling the relay of
/// other members.
pub struct ClientRegistry {
    clients: DashMap<UserId, Arc<Client>>,
    max_send_queue: usize,
}

impl ClientRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            clients: DashMap::new(),
            max_send_queue,
        }
    }

    /// Admit a verified identity and return its outbound queue receiver.
    /// `None` when the identity already has a live connection.
    pub fn register(&self, identity: UserId) -> Option<mpsc::Receiver<String>> {
        use dashmap::mapref::entry::Entry;

        let (tx, rx) = mpsc::channel(self.max_send_queue);
        match self.clients.entry(identity.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(Client::new(identity, tx)));
                Some(rx)
            }
        }
    }

    /// Remove a connection. Dropping the last sender lets the writer task
    /// drain queued frames, emit a close frame, and exit.
    pub fn unregister(&self, identity: &UserId) {
        if let Some((_, client)) = self.clients.remove(identity) {
            client.connected.store(false, Ordering::Relaxed);
        }
    }

    /// Queue a frame for one client. A full queue drops the frame with a
    /// warning; a closed or missing queue reports the peer as gone so the
    /// caller can leave cleanup to that member's disconnect path.
    pub fn send_frame(&self, identity: &UserId, frame: &ServerFrame) -> Result<(), ChatError> {
        let json = frame.to_json()?;
        let Some(client) = self.clients.get(identity) else {
            return Err(ChatError::PeerSendFailure {
                user: identity.clone(),
                reason: "not connected".into(),
            });
        };

        match client.tx.try_send(json) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(identity = %identity, frame = frame.frame_type(), "send queue full, dropping frame");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ChatError::PeerSendFailure {
                user: identity.clone(),
                reason: "connection closed".into(),
            }),
        }
    }

    pub fn record_pong(&self, identity: &UserId) {
        if let Some(client) = self.clients.get(identity) {
            client.record_pong();
        }
    }

    fn mark_disconnected(&self, identity: &UserId) {
        if let Some(client) = self.clients.get(identity) {
            client.connected.store(false, Ordering::Relaxed);
        }
    }

    /// Identities that have not answered a ping within the timeout.
    pub fn stale_identities(&self) -> Vec<UserId> {
        self.clients
            .iter()
            .filter(|entry| !entry.value().is_alive())
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn contains(&self, identity: &UserId) -> bool {
        self.clients.contains_key(identity)
    }

    pub fn count(&self) -> usize {
        self.clients.len()
    }
}

/// Writer half of a connection: forwards the outbound queue to the socket
/// and emits heartbeat pings. Exits when the queue closes (teardown) or the
/// socket dies, sending a close frame on the way out so the peer's read
/// loop terminates promptly.
pub fn spawn_writer(
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<String>,
    identity: UserId,
    registry: Arc<ClientRegistry>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ping = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            let _ = ws_tx.send(WsMessage::Close(None)).await;
                            break;
                        }
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    trace!(identity = %identity, "sent ping");
                }
            }
        }

        registry.mark_disconnected(&identity);
    })
}

/// Refuse a connection with the policy-violation close code. Used for both
/// failed credentials and duplicate identities; no core state exists yet.
pub async fn close_policy_violation(mut socket: WebSocket, reason: &'static str) {
    let frame = CloseFrame {
        code: POLICY_VIOLATION,
        reason: reason.into(),
    };
    let _ = socket.send(WsMessage::Close(Some(frame))).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::ids::SessionId;

    fn frame() -> ServerFrame {
        ServerFrame::SessionEnd {
            session_id: SessionId::from_raw("a-b"),
        }
    }

    #[test]
    fn register_and_unregister() {
        let registry = ClientRegistry::new(32);
        assert_eq!(registry.count(), 0);

        let _rx1 = registry.register(UserId::from_raw("alice")).unwrap();
        let _rx2 = registry.register(UserId::from_raw("bob")).unwrap();
        assert_eq!(registry.count(), 2);

        registry.unregister(&UserId::from_raw("alice"));
        assert_eq!(registry.count(), 1);
        assert!(!registry.contains(&UserId::from_raw("alice")));
    }

    #[test]
    fn duplicate_identity_refused() {
        let registry = ClientRegistry::new(32);
        let _rx = registry.register(UserId::from_raw("alice")).unwrap();
        assert!(registry.register(UserId::from_raw("alice")).is_none());

        // after the first connection is gone the identity is admissible again
        registry.unregister(&UserId::from_raw("alice"));
        assert!(registry.register(UserId::from_raw("alice")).is_some());
    }

    #[tokio::test]
    async fn send_frame_reaches_queue() {
        let registry = ClientRegistry::new(32);
        let mut rx = registry.register(UserId::from_raw("alice")).unwrap();

        registry.send_frame(&UserId::from_raw("alice"), &frame()).unwrap();

        let raw = rx.recv().await.unwrap();
        assert!(raw.contains("session_end"));
    }

    #[test]
    fn send_to_missing_client_is_peer_failure() {
        let registry = ClientRegistry::new(32);
        let err = registry
            .send_frame(&UserId::from_raw("ghost"), &frame())
            .unwrap_err();
        assert_eq!(err.error_kind(), "peer_send_failure");
    }

    #[test]
    fn full_queue_drops_without_error() {
        let registry = ClientRegistry::new(2);
        let _rx = registry.register(UserId::from_raw("alice")).unwrap();
        let alice = UserId::from_raw("alice");

        registry.send_frame(&alice, &frame()).unwrap();
        registry.send_frame(&alice, &frame()).unwrap();
        // queue full: dropped, relay not blocked
        registry.send_frame(&alice, &frame()).unwrap();
    }

    #[test]
    fn send_after_unregister_is_peer_failure() {
        let registry = ClientRegistry::new(32);
        let _rx = registry.register(UserId::from_raw("alice")).unwrap();
        registry.unregister(&UserId::from_raw("alice"));

        let err = registry
            .send_frame(&UserId::from_raw("alice"), &frame())
            .unwrap_err();
        assert_eq!(err.error_kind(), "peer_send_failure");
    }

    #[test]
    fn stale_identities_after_timeout() {
        let registry = ClientRegistry::new(32);
        let _rx = registry.register(UserId::from_raw("alice")).unwrap();
        assert!(registry.stale_identities().is_empty());

        if let Some(client) = registry.clients.get(&UserId::from_raw("alice")) {
            client.last_pong.store(0, Ordering::Relaxed);
        }
        assert_eq!(registry.stale_identities(), vec![UserId::from_raw("alice")]);
    }
}
