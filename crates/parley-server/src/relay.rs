use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::warn;

use parley_core::errors::ChatError;
use parley_core::events::ChatEvent;
use parley_core::ids::{SessionId, UserId};
use parley_core::protocol::ServerFrame;

use crate::connection::ClientRegistry;
use crate::registry::SessionRegistry;

/// Routes an incoming chat message to the members of its session.
///
/// The fan-out includes the sender: clients render their own messages from
/// the echoed frame, so both members receive every relayed message.
pub struct RelayEngine {
    sessions: Arc<SessionRegistry>,
    clients: Arc<ClientRegistry>,
    events: broadcast::Sender<ChatEvent>,
}

impl RelayEngine {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        clients: Arc<ClientRegistry>,
        events: broadcast::Sender<ChatEvent>,
    ) -> Self {
        Self {
            sessions,
            clients,
            events,
        }
    }

    /// Best-effort fan-out. A failure to reach one member is logged and
    /// left to that member's own disconnect path; it never blocks delivery
    /// to the rest of the session.
    pub fn relay(
        &self,
        session_id: &SessionId,
        sender: &UserId,
        content: &str,
    ) -> Result<(), ChatError> {
        let Some(session) = self.sessions.get(session_id) else {
            return Err(ChatError::UnknownSession(session_id.clone()));
        };

        let frame = ServerFrame::ChatMessage {
            session_id: session_id.clone(),
            user: sender.clone(),
            message: content.to_owned(),
        };
        for member in session.members() {
            if let Err(e) = self.clients.send_frame(member, &frame) {
                warn!(session_id = %session_id, member = %member, error = %e, "relay send failed");
            }
        }
        session.note_relayed();

        let _ = self.events.send(ChatEvent::ChatRelayed {
            session_id: session_id.clone(),
            sender: sender.clone(),
            content: content.to_owned(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::session::Session;

    fn setup() -> (RelayEngine, Arc<ClientRegistry>, broadcast::Receiver<ChatEvent>) {
        let sessions = Arc::new(SessionRegistry::new());
        let clients = Arc::new(ClientRegistry::new(32));
        let (events, events_rx) = broadcast::channel(64);
        let relay = RelayEngine::new(sessions, Arc::clone(&clients), events);
        (relay, clients, events_rx)
    }

    fn user(name: &str) -> UserId {
        UserId::from_raw(name)
    }

    #[tokio::test]
    async fn relays_to_both_members_including_sender() {
        let (relay, clients, _events_rx) = setup();
        let mut alice_rx = clients.register(user("alice")).unwrap();
        let mut bob_rx = clients.register(user("bob")).unwrap();

        let session = relay
            .sessions
            .register(Session::form(user("alice"), user("bob")))
            .unwrap();

        relay.relay(session.id(), &user("alice"), "hi").unwrap();

        for rx in [&mut alice_rx, &mut bob_rx] {
            let raw = rx.try_recv().unwrap();
            let frame: serde_json::Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(frame["type"], "chat_message");
            assert_eq!(frame["user"], "alice");
            assert_eq!(frame["message"], "hi");
        }
        assert_eq!(session.relayed_count(), 1);
    }

    #[tokio::test]
    async fn unknown_session_fails_without_side_effects() {
        let (relay, clients, mut events_rx) = setup();
        let mut alice_rx = clients.register(user("alice")).unwrap();

        let err = relay
            .relay(&SessionId::from_raw("ghost-session"), &user("alice"), "hi")
            .unwrap_err();
        assert_eq!(err.error_kind(), "unknown_session");
        assert!(alice_rx.try_recv().is_err());
        assert!(events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_member_does_not_block_fanout() {
        let (relay, clients, _events_rx) = setup();
        let mut alice_rx = clients.register(user("alice")).unwrap();
        let _ = clients.register(user("bob")).unwrap();
        clients.unregister(&user("bob"));

        let session = relay
            .sessions
            .register(Session::form(user("alice"), user("bob")))
            .unwrap();

        relay.relay(session.id(), &user("alice"), "anyone there?").unwrap();
        assert!(alice_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn emits_chat_relayed_event() {
        let (relay, clients, mut events_rx) = setup();
        let _alice_rx = clients.register(user("alice")).unwrap();
        let _bob_rx = clients.register(user("bob")).unwrap();

        let session = relay
            .sessions
            .register(Session::form(user("alice"), user("bob")))
            .unwrap();
        relay.relay(session.id(), &user("bob"), "hello").unwrap();

        match events_rx.try_recv().unwrap() {
            ChatEvent::ChatRelayed { sender, content, .. } => {
                assert_eq!(sender.as_str(), "bob");
                assert_eq!(content, "hello");
            }
            other => panic!("unexpected event: {}", other.event_type()),
        }
    }
}
