//! Message routing between the two members of a session. Pure relay logic:
//! payloads are forwarded verbatim, keyed only on session id and role.
//!
//! All mutation goes through `&mut RelayState`, which the connection tasks
//! share behind a single mutex — the per-session serialization point. Nothing
//! here blocks: outbound frames are fire-and-forget `try_send`s into each
//! connection's queue, so a stalled peer never stalls routing to others.

use tokio::sync::mpsc;

use beamcast_common::{PeerId, Role, SessionId, SignalError, SignalingMessage};

use crate::registry::PeerRegistry;
use crate::session::SessionStore;

/// The relay state as shared between connection tasks.
pub type SharedState = std::sync::Arc<tokio::sync::Mutex<RelayState>>;

/// The relay's entire mutable state. Single-writer via the surrounding mutex.
#[derive(Default)]
pub struct RelayState {
    pub registry: PeerRegistry,
    pub sessions: SessionStore,
}

impl RelayState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Dispatch one inbound message from `peer_id`. `reply` is the sending
/// connection's own outbound queue, used for direct responses — the peer may
/// not be registered yet.
pub fn handle_message(
    state: &mut RelayState,
    peer_id: &PeerId,
    reply: &mpsc::Sender<String>,
    msg: SignalingMessage,
) {
    match msg {
        SignalingMessage::Register { role, session_id } => {
            handle_register(state, peer_id, reply, &role, session_id);
        }
        SignalingMessage::Offer { session_id, offer, .. } => {
            handle_offer(state, peer_id, reply, &session_id, offer);
        }
        SignalingMessage::Answer { session_id, answer, .. } => {
            handle_answer(state, peer_id, reply, &session_id, answer);
        }
        SignalingMessage::IceCandidate { session_id, candidate, .. } => {
            handle_candidate(state, peer_id, reply, &session_id, candidate);
        }
        // Server-to-client variants arriving inbound are dropped.
        other => {
            tracing::debug!(peer = %peer_id, msg = ?other, "Ignoring unexpected inbound message");
        }
    }
}

/// Connection closed: unregister, detach, and notify any remaining
/// counterpart with exactly one `peer-disconnected`.
pub fn handle_disconnect(state: &mut RelayState, peer_id: &PeerId) {
    let Some(session_id) = state.registry.unregister(peer_id) else {
        return;
    };
    if let Some(counterpart) = state.sessions.detach(&session_id, peer_id) {
        tracing::info!(peer = %peer_id, session = %session_id, "Peer left, notifying counterpart");
        push(&state.registry, &counterpart, &SignalingMessage::PeerDisconnected);
    } else {
        tracing::info!(session = %session_id, "Session removed");
    }
}

fn handle_register(
    state: &mut RelayState,
    peer_id: &PeerId,
    reply: &mpsc::Sender<String>,
    role: &str,
    session_id: Option<SessionId>,
) {
    let prev_session = state
        .registry
        .get(peer_id)
        .and_then(|record| record.session_id.clone());

    let role = match state.registry.register(peer_id, role, reply.clone()) {
        Ok(role) => role,
        Err(e) => {
            reply_error(reply, &e.to_string());
            return;
        }
    };

    // Re-registering while bound to a session is a departure from it: the
    // fresh record carries no binding, so the old slot must be vacated now or
    // the counterpart never learns and the session leaks.
    if let Some(prev_session) = prev_session {
        if let Some(counterpart) = state.sessions.detach(&prev_session, peer_id) {
            tracing::info!(peer = %peer_id, session = %prev_session, "Re-register leaves session");
            push(&state.registry, &counterpart, &SignalingMessage::PeerDisconnected);
        }
    }

    tracing::info!(peer = %peer_id, role = role.as_str(), "Peer registered");
    push_to(reply, &SignalingMessage::Registered {
        peer_id: peer_id.clone(),
        role,
    });

    // A receiver registering with a session id attaches immediately and picks
    // up any offer that arrived while no receiver was present.
    if role == Role::Receiver {
        if let Some(session_id) = session_id {
            attach_responder(state, peer_id, &session_id);
            flush_pending_offer(state, peer_id, &session_id);
        }
    }
}

fn handle_offer(
    state: &mut RelayState,
    peer_id: &PeerId,
    reply: &mpsc::Sender<String>,
    session_id: &SessionId,
    offer: serde_json::Value,
) {
    if !check_role(state, peer_id, reply, Role::Sender) {
        return;
    }

    if let Some(displaced) = state.sessions.attach_initiator(session_id, peer_id) {
        notify_displaced(state, &displaced, Role::Sender, session_id);
    }
    state.registry.bind_to_session(peer_id, session_id);

    let responder = state.sessions.counterpart_of(session_id, peer_id);
    match responder {
        Some(responder) => {
            tracing::info!(session = %session_id, from = %peer_id, "Forwarding offer to receiver");
            push(&state.registry, &responder, &SignalingMessage::Offer {
                session_id: session_id.clone(),
                offer,
                from: Some(peer_id.clone()),
            });
        }
        None => {
            tracing::info!(session = %session_id, from = %peer_id, "No receiver yet, buffering offer");
            if let Some(session) = state.sessions.get_mut(session_id) {
                session.pending_offer = Some((peer_id.clone(), offer));
            }
        }
    }
}

fn handle_answer(
    state: &mut RelayState,
    peer_id: &PeerId,
    reply: &mpsc::Sender<String>,
    session_id: &SessionId,
    answer: serde_json::Value,
) {
    if !check_role(state, peer_id, reply, Role::Receiver) {
        return;
    }

    // Unlike offers, an answer never creates a session: answering a session
    // nobody offered into is a protocol violation, rejected without fuss.
    if !state.sessions.contains(session_id) {
        reply_error(reply, &SignalError::SessionNotFound.to_string());
        return;
    }

    attach_responder(state, peer_id, session_id);
    // The receiver has produced an answer, so the buffered offer is spent.
    if let Some(session) = state.sessions.get_mut(session_id) {
        session.pending_offer = None;
    }

    if let Some(initiator) = state.sessions.counterpart_of(session_id, peer_id) {
        tracing::info!(session = %session_id, from = %peer_id, "Forwarding answer to sender");
        push(&state.registry, &initiator, &SignalingMessage::Answer {
            session_id: session_id.clone(),
            answer,
            from: Some(peer_id.clone()),
        });
    }
}

fn handle_candidate(
    state: &mut RelayState,
    peer_id: &PeerId,
    reply: &mpsc::Sender<String>,
    session_id: &SessionId,
    candidate: serde_json::Value,
) {
    if state.registry.get(peer_id).is_none() {
        reply_error(reply, "not registered");
        return;
    }
    if !state.sessions.contains(session_id) {
        reply_error(reply, &SignalError::SessionNotFound.to_string());
        return;
    }

    match state.sessions.counterpart_of(session_id, peer_id) {
        Some(counterpart) => {
            push(&state.registry, &counterpart, &SignalingMessage::IceCandidate {
                session_id: session_id.clone(),
                candidate,
                from: Some(peer_id.clone()),
            });
        }
        None => {
            // Candidates are best-effort and may legitimately arrive before
            // the counterpart does.
            tracing::debug!(session = %session_id, from = %peer_id, "Dropping candidate, no counterpart");
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn attach_responder(state: &mut RelayState, peer_id: &PeerId, session_id: &SessionId) {
    if let Some(displaced) = state.sessions.attach_responder(session_id, peer_id) {
        notify_displaced(state, &displaced, Role::Receiver, session_id);
    }
    state.registry.bind_to_session(peer_id, session_id);
}

fn flush_pending_offer(state: &mut RelayState, responder: &PeerId, session_id: &SessionId) {
    let pending = state
        .sessions
        .get_mut(session_id)
        .and_then(|session| session.pending_offer.take());
    if let Some((from, offer)) = pending {
        tracing::info!(session = %session_id, to = %responder, "Flushing buffered offer");
        push(&state.registry, responder, &SignalingMessage::Offer {
            session_id: session_id.clone(),
            offer,
            from: Some(from),
        });
    }
}

/// Tell a displaced slot occupant it has been superseded, and unbind it so
/// its eventual disconnect doesn't touch the session again.
fn notify_displaced(state: &mut RelayState, displaced: &PeerId, role: Role, session_id: &SessionId) {
    tracing::info!(peer = %displaced, session = %session_id, "Displacing stale occupant");
    push(&state.registry, displaced, &SignalingMessage::Error {
        message: format!("displaced by a new {} for session {session_id}", role.as_str()),
    });
    state.registry.clear_session(displaced);
}

/// Verify the peer is registered under `expected` before a session verb.
fn check_role(
    state: &RelayState,
    peer_id: &PeerId,
    reply: &mpsc::Sender<String>,
    expected: Role,
) -> bool {
    match state.registry.get(peer_id) {
        Some(record) if record.role == expected => true,
        Some(_) | None => {
            reply_error(reply, &format!("not registered as {}", expected.as_str()));
            false
        }
    }
}

/// Queue a frame on a registered peer's connection. Fire-and-forget: a full
/// or closed queue means the peer is unreachable and the frame is dropped.
fn push(registry: &PeerRegistry, peer_id: &PeerId, msg: &SignalingMessage) {
    match registry.get(peer_id) {
        Some(record) => push_to(&record.tx, msg),
        None => tracing::debug!(peer = %peer_id, "Push to unknown peer dropped"),
    }
}

fn push_to(tx: &mpsc::Sender<String>, msg: &SignalingMessage) {
    let frame = serde_json::to_string(msg).unwrap();
    if tx.try_send(frame).is_err() {
        tracing::debug!("Peer unreachable, dropping frame");
    }
}

fn reply_error(tx: &mpsc::Sender<String>, message: &str) {
    push_to(tx, &SignalingMessage::Error {
        message: message.to_string(),
    });
}
