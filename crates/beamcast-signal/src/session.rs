//! Session store: pairing slots keyed by session id, at most one sender and
//! one receiver each.

use std::collections::HashMap;

use beamcast_common::{PeerId, SessionId};

/// A pairing slot. `pending_offer` buffers the most recent offer seen while
/// no receiver was attached, so a late receiver still gets the handshake.
#[derive(Default)]
pub struct Session {
    pub initiator: Option<PeerId>,
    pub responder: Option<PeerId>,
    pub pending_offer: Option<(PeerId, serde_json::Value)>,
}

/// Owns all sessions. A session with a single live member persists awaiting
/// its counterpart; it is deleted the moment both slots are empty.
#[derive(Default)]
pub struct SessionStore {
    sessions: HashMap<SessionId, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, session_id: &SessionId) -> &mut Session {
        self.sessions.entry(session_id.clone()).or_default()
    }

    pub fn get(&self, session_id: &SessionId) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn get_mut(&mut self, session_id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(session_id)
    }

    /// Set the initiator slot, returning the displaced prior occupant (if it
    /// was a different peer) so the caller can notify it.
    pub fn attach_initiator(&mut self, session_id: &SessionId, peer: &PeerId) -> Option<PeerId> {
        self.get_or_create(session_id)
            .initiator
            .replace(peer.clone())
            .filter(|prev| prev != peer)
    }

    /// Set the responder slot, returning the displaced prior occupant.
    pub fn attach_responder(&mut self, session_id: &SessionId, peer: &PeerId) -> Option<PeerId> {
        self.get_or_create(session_id)
            .responder
            .replace(peer.clone())
            .filter(|prev| prev != peer)
    }

    /// Clear whichever slot matches `peer`. Deletes the session once both
    /// slots are empty; otherwise returns the remaining counterpart.
    pub fn detach(&mut self, session_id: &SessionId, peer: &PeerId) -> Option<PeerId> {
        let session = self.sessions.get_mut(session_id)?;
        if session.initiator.as_ref() == Some(peer) {
            session.initiator = None;
            // A departed sender's buffered offer must not leak to a later receiver.
            session.pending_offer = None;
        }
        if session.responder.as_ref() == Some(peer) {
            session.responder = None;
        }
        let remaining = session.initiator.clone().or_else(|| session.responder.clone());
        if remaining.is_none() {
            self.sessions.remove(session_id);
        }
        remaining
    }

    /// Resolve the other party for routing.
    pub fn counterpart_of(&self, session_id: &SessionId, peer: &PeerId) -> Option<PeerId> {
        let session = self.sessions.get(session_id)?;
        if session.initiator.as_ref() == Some(peer) {
            session.responder.clone()
        } else if session.responder.as_ref() == Some(peer) {
            session.initiator.clone()
        } else {
            None
        }
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}
