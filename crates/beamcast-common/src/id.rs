use serde::{Deserialize, Serialize};
use std::fmt;

pub fn new_peer_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Opaque token identifying one live connection to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn new() -> Self {
        Self(new_peer_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Join key pairing a sender and a receiver. Caller-supplied or generated;
/// the relay treats it as an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_is_valid_uuid() {
        let id = PeerId::new();
        let parsed = uuid::Uuid::parse_str(id.as_str());
        assert!(parsed.is_ok());
        assert_eq!(parsed.unwrap().get_version_num(), 4);
    }

    #[test]
    fn peer_id_is_unique() {
        assert_ne!(PeerId::new(), PeerId::new());
    }

    #[test]
    fn session_id_from_caller_string() {
        let sid = SessionId::from("sess_abc123");
        assert_eq!(sid.as_str(), "sess_abc123");
        assert_eq!(sid.to_string(), "sess_abc123");
    }

    #[test]
    fn session_id_generated_is_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn session_id_hash_and_equality() {
        use std::collections::HashSet;
        let a = SessionId::from("x");
        let b = SessionId::from("x");
        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let sid = SessionId::from("x");
        assert_eq!(serde_json::to_string(&sid).unwrap(), "\"x\"");
        let back: SessionId = serde_json::from_str("\"x\"").unwrap();
        assert_eq!(back, sid);
    }
}
