//! Peer registry: every currently-connected endpoint and its declared role.

use std::collections::HashMap;

use tokio::sync::mpsc;

use beamcast_common::{PeerId, Role, SessionId, SignalError};

/// One registered connection. The record never outlives the connection;
/// `tx` is the connection's outbound frame queue.
pub struct PeerRecord {
    pub role: Role,
    pub session_id: Option<SessionId>,
    pub tx: mpsc::Sender<String>,
}

/// Owns all peer records for the relay's lifetime. Side effects are confined
/// to its own map; it never sends messages.
#[derive(Default)]
pub struct PeerRegistry {
    peers: HashMap<PeerId, PeerRecord>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record for `peer_id` under the given role. Rejects unknown
    /// role strings before touching any state. Re-registering replaces the
    /// record and drops any previous session binding.
    pub fn register(
        &mut self,
        peer_id: &PeerId,
        role: &str,
        tx: mpsc::Sender<String>,
    ) -> Result<Role, SignalError> {
        let role = Role::parse(role)?;
        self.peers.insert(
            peer_id.clone(),
            PeerRecord {
                role,
                session_id: None,
                tx,
            },
        );
        Ok(role)
    }

    /// Bind a peer to its session. Idempotent.
    pub fn bind_to_session(&mut self, peer_id: &PeerId, session_id: &SessionId) {
        if let Some(record) = self.peers.get_mut(peer_id) {
            record.session_id = Some(session_id.clone());
        }
    }

    /// Drop a peer's session binding (used when it is displaced).
    pub fn clear_session(&mut self, peer_id: &PeerId) {
        if let Some(record) = self.peers.get_mut(peer_id) {
            record.session_id = None;
        }
    }

    /// Remove the record; returns the last known session so the caller can
    /// drive session cleanup.
    pub fn unregister(&mut self, peer_id: &PeerId) -> Option<SessionId> {
        self.peers.remove(peer_id).and_then(|record| record.session_id)
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&PeerRecord> {
        self.peers.get(peer_id)
    }

    pub fn count(&self) -> usize {
        self.peers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chan() -> mpsc::Sender<String> {
        mpsc::channel(8).0
    }

    #[test]
    fn register_assigns_role() {
        let mut registry = PeerRegistry::new();
        let peer = PeerId::new();
        let role = registry.register(&peer, "sender", chan()).unwrap();
        assert_eq!(role, Role::Sender);
        assert_eq!(registry.count(), 1);
        assert!(registry.get(&peer).unwrap().session_id.is_none());
    }

    #[test]
    fn invalid_role_creates_no_record() {
        let mut registry = PeerRegistry::new();
        let peer = PeerId::new();
        let err = registry.register(&peer, "bogus", chan()).unwrap_err();
        assert!(matches!(err, SignalError::InvalidRole));
        assert_eq!(registry.count(), 0);
        // A later valid register on the same connection still works.
        assert!(registry.register(&peer, "receiver", chan()).is_ok());
    }

    #[test]
    fn bind_is_idempotent() {
        let mut registry = PeerRegistry::new();
        let peer = PeerId::new();
        registry.register(&peer, "sender", chan()).unwrap();
        let sid = SessionId::from("s1");
        registry.bind_to_session(&peer, &sid);
        registry.bind_to_session(&peer, &sid);
        assert_eq!(registry.get(&peer).unwrap().session_id, Some(sid));
    }

    #[test]
    fn unregister_returns_last_session() {
        let mut registry = PeerRegistry::new();
        let peer = PeerId::new();
        registry.register(&peer, "sender", chan()).unwrap();
        registry.bind_to_session(&peer, &SessionId::from("s1"));
        assert_eq!(registry.unregister(&peer), Some(SessionId::from("s1")));
        assert_eq!(registry.count(), 0);
        // Unknown peer is a no-op.
        assert_eq!(registry.unregister(&peer), None);
    }
}
