use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use parley_core::events::{ChatEvent, EndReason};
use parley_core::ids::{SessionId, UserId};
use parley_core::protocol::{ClientFrame, ServerFrame};
use parley_core::session::Session;

use crate::connection::{self, ClientRegistry};
use crate::pairing::PairingQueue;
use crate::registry::{SessionCollision, SessionRegistry};
use crate::relay::RelayEngine;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Connection phases after admission: `Waiting → Paired → Ended`.
/// (`Connecting` ends at identity verification, before any of this state
/// exists.)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Waiting,
    Paired,
    Ended,
}

/// Outcome of one inbound frame: keep reading, or exit the connection loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    Ended,
}

/// The shared pairing/relay state.
///
/// Explicitly owned and injected into every connection task rather than a
/// process-wide singleton, so tests can run isolated instances. The
/// pairing queue and session registry are the only mutable state shared
/// between connection tasks.
pub struct ChatState {
    pub pairing: PairingQueue,
    pub sessions: Arc<SessionRegistry>,
    pub clients: Arc<ClientRegistry>,
    pub relay: RelayEngine,
    events: broadcast::Sender<ChatEvent>,
}

impl ChatState {
    pub fn new(max_send_queue: usize) -> (Arc<Self>, broadcast::Receiver<ChatEvent>) {
        let sessions = Arc::new(SessionRegistry::new());
        let clients = Arc::new(ClientRegistry::new(max_send_queue));
        let (events, events_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let relay = RelayEngine::new(Arc::clone(&sessions), Arc::clone(&clients), events.clone());

        let state = Arc::new(Self {
            pairing: PairingQueue::new(),
            sessions,
            clients,
            relay,
            events,
        });
        (state, events_rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Observable phase of an identity, derived from the shared structures.
    pub fn phase_of(&self, user: &UserId) -> Phase {
        if self.pairing.contains(user) {
            Phase::Waiting
        } else if self.sessions.session_of(user).is_some() {
            Phase::Paired
        } else {
            Phase::Ended
        }
    }
}

/// Per-connection control loop, socket-free so the state machine can be
/// exercised without websockets.
pub struct Controller {
    state: Arc<ChatState>,
    identity: UserId,
}

impl Controller {
    pub fn new(state: Arc<ChatState>, identity: UserId) -> Self {
        Self { state, identity }
    }

    pub fn identity(&self) -> &UserId {
        &self.identity
    }

    /// Admission outcome: wait for a partner, or form the session and
    /// notify both members with `session_start` naming the other side.
    pub fn handle_join(&self) -> Phase {
        match self.state.pairing.enqueue_or_match(self.identity.clone()) {
            None => {
                debug!(identity = %self.identity, "waiting for a partner");
                Phase::Waiting
            }
            Some(session) => {
                let session = self.register_formed(session);
                for member in session.members() {
                    if let Some(partner) = session.partner_of(member) {
                        let frame = ServerFrame::SessionStart {
                            session_id: session.id().clone(),
                            partner: partner.clone(),
                        };
                        if let Err(e) = self.state.clients.send_frame(member, &frame) {
                            warn!(session_id = %session.id(), member = %member, error = %e, "session_start send failed");
                        }
                    }
                }
                let _ = self.state.events.send(ChatEvent::SessionStarted {
                    session_id: session.id().clone(),
                    members: session.members().clone(),
                    started_at: session.started_at(),
                });
                info!(session_id = %session.id(), "session started");
                Phase::Paired
            }
        }
    }

    /// Register a formed session, retrying with a disambiguated id while
    /// the derived one collides with a live session.
    fn register_formed(&self, session: Session) -> Arc<Session> {
        let [first, second] = session.members().clone();
        let mut candidate = session;
        loop {
            match self.state.sessions.register(candidate) {
                Ok(session) => return session,
                Err(SessionCollision(id)) => {
                    warn!(session_id = %id, "active session id collision, disambiguating");
                    candidate = Session::with_id(
                        SessionId::disambiguate(&first, &second),
                        first.clone(),
                        second.clone(),
                    );
                }
            }
        }
    }

    /// Dispatch one inbound frame. Malformed and unknown-session frames are
    /// protocol anomalies: logged, never fatal to the connection.
    pub fn handle_frame(&self, raw: &str) -> FrameOutcome {
        let frame = match ClientFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(identity = %self.identity, error = %e, "ignoring malformed frame");
                return FrameOutcome::Continue;
            }
        };

        match frame {
            ClientFrame::ChatMessage { session_id, content } => {
                if let Err(e) = self.state.relay.relay(&session_id, &self.identity, &content) {
                    debug!(identity = %self.identity, session_id = %session_id, kind = e.error_kind(), "relay refused");
                }
                FrameOutcome::Continue
            }
            ClientFrame::EndSession { session_id } => {
                match self.teardown(&session_id, EndReason::Explicit) {
                    Some(session) if session.is_member(&self.identity) => FrameOutcome::Ended,
                    Some(_) => FrameOutcome::Continue,
                    None => {
                        debug!(identity = %self.identity, session_id = %session_id, "end_session for unknown session");
                        FrameOutcome::Continue
                    }
                }
            }
            ClientFrame::Rating {
                session_id,
                rating,
                is_human_guess,
            } => {
                let _ = self.state.events.send(ChatEvent::RatingSubmitted {
                    session_id,
                    user: self.identity.clone(),
                    rating,
                    is_human_guess,
                });
                FrameOutcome::Continue
            }
        }
    }

    /// Receive-stream termination: leave the waiting list, or tear down the
    /// session this identity is in. Safe to call after an explicit end.
    pub fn handle_disconnect(&self) {
        if self.state.pairing.remove(&self.identity) {
            debug!(identity = %self.identity, "removed from waiting list");
        } else if let Some(session) = self.state.sessions.session_of(&self.identity) {
            self.teardown(session.id(), EndReason::Disconnect);
        }
        self.state.clients.unregister(&self.identity);
    }

    /// Single-winner teardown: the first caller unregisters the session,
    /// notifies every member, and closes their connections. Later callers
    /// are a silent no-op, so simultaneous disconnects never notify twice.
    fn teardown(&self, session_id: &SessionId, reason: EndReason) -> Option<Arc<Session>> {
        let session = self.state.sessions.unregister(session_id)?;
        let ended_at = Utc::now();

        let frame = ServerFrame::SessionEnd {
            session_id: session.id().clone(),
        };
        for member in session.members() {
            if let Err(e) = self.state.clients.send_frame(member, &frame) {
                debug!(session_id = %session_id, member = %member, error = %e, "session_end send failed");
            }
            self.state.clients.unregister(member);
        }

        let _ = self.state.events.send(ChatEvent::SessionEnded {
            session_id: session.id().clone(),
            members: session.members().clone(),
            reason,
            started_at: session.started_at(),
            ended_at,
            message_count: session.relayed_count(),
        });
        info!(session_id = %session.id(), reason = %reason, messages = session.relayed_count(), "session ended");
        Some(session)
    }
}

/// Drive one admitted connection to completion.
///
/// This is the independent per-connection task of the core: after
/// admission it touches other connections only through the shared pairing
/// queue, session registry, and client registry.
pub async fn run_connection(socket: WebSocket, identity: UserId, state: Arc<ChatState>) {
    let Some(rx) = state.clients.register(identity.clone()) else {
        warn!(identity = %identity, "duplicate connection for live identity refused");
        connection::close_policy_violation(socket, "identity already connected").await;
        return;
    };

    info!(identity = %identity, "client admitted");
    let (ws_tx, mut ws_rx) = socket.split();
    let mut writer =
        connection::spawn_writer(ws_tx, rx, identity.clone(), Arc::clone(&state.clients));

    let controller = Controller::new(Arc::clone(&state), identity.clone());
    controller.handle_join();

    loop {
        tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    if controller.handle_frame(text.as_str()) == FrameOutcome::Ended {
                        break;
                    }
                }
                Some(Ok(WsMessage::Pong(_))) => state.clients.record_pong(&identity),
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(identity = %identity, error = %e, "socket error");
                    break;
                }
            },
            // outbound queue closed: the session was torn down from the
            // other side, or the sweep removed this connection
            _ = &mut writer => break,
        }
    }

    controller.handle_disconnect();
    info!(identity = %identity, "client disconnected");
}
