//! Signaling wire protocol. One JSON text frame per message, tagged by
//! `type`. Offer/answer/candidate payloads are opaque values — the relay
//! forwards them verbatim and never looks inside.

use serde::{Deserialize, Serialize};

use crate::errors::SignalError;
use crate::id::{PeerId, SessionId};

/// Declared role of a registered peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Screen-sharing host; initiates the offer.
    #[serde(rename = "sender")]
    Sender,
    /// Touch-control viewer; answers.
    #[serde(rename = "receiver")]
    Receiver,
}

impl Role {
    /// Parse the wire string. Anything but the two recognized values is
    /// rejected so a bogus role surfaces as `InvalidRole`, not a decode error.
    pub fn parse(s: &str) -> Result<Self, SignalError> {
        match s {
            "sender" => Ok(Role::Sender),
            "receiver" => Ok(Role::Receiver),
            _ => Err(SignalError::InvalidRole),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Sender => "sender",
            Role::Receiver => "receiver",
        }
    }
}

/// Every message that crosses the signaling connection, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalingMessage {
    /// First frame the relay sends on accept, before any registration.
    #[serde(rename = "peer-id")]
    PeerAssigned {
        #[serde(rename = "peerId")]
        peer_id: PeerId,
    },

    /// Client declares its role. Role travels as a free string so the relay
    /// can answer unknown values with an error instead of dropping the frame.
    /// A receiver may carry a `sessionId` to attach before any answer.
    #[serde(rename = "register")]
    Register {
        role: String,
        #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },

    #[serde(rename = "registered")]
    Registered {
        #[serde(rename = "peerId")]
        peer_id: PeerId,
        role: Role,
    },

    #[serde(rename = "offer")]
    Offer {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        offer: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<PeerId>,
    },

    #[serde(rename = "answer")]
    Answer {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        answer: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<PeerId>,
    },

    #[serde(rename = "ice-candidate")]
    IceCandidate {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        candidate: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<PeerId>,
    },

    #[serde(rename = "peer-disconnected")]
    PeerDisconnected,

    #[serde(rename = "error")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse() {
        assert_eq!(Role::parse("sender").unwrap(), Role::Sender);
        assert_eq!(Role::parse("receiver").unwrap(), Role::Receiver);
        assert!(matches!(Role::parse("bogus"), Err(SignalError::InvalidRole)));
        // Case-sensitive, as in the original wire protocol.
        assert!(Role::parse("Sender").is_err());
    }

    #[test]
    fn peer_assigned_wire_shape() {
        let msg = SignalingMessage::PeerAssigned {
            peer_id: PeerId::from("p1".to_string()),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"peer-id","peerId":"p1"}"#);
    }

    #[test]
    fn register_without_session_omits_field() {
        let msg = SignalingMessage::Register {
            role: "sender".into(),
            session_id: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"register","role":"sender"}"#);
    }

    #[test]
    fn register_accepts_unknown_role_string() {
        let msg: SignalingMessage =
            serde_json::from_str(r#"{"type":"register","role":"bogus"}"#).unwrap();
        match msg {
            SignalingMessage::Register { role, session_id } => {
                assert_eq!(role, "bogus");
                assert!(session_id.is_none());
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn offer_payload_survives_round_trip() {
        let payload = serde_json::json!({
            "type": "offer",
            "sdp": "v=0\r\no=- 46117 2 IN IP4 127.0.0.1\r\n"
        });
        let msg = SignalingMessage::Offer {
            session_id: SessionId::from("s1"),
            offer: payload.clone(),
            from: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: SignalingMessage = serde_json::from_str(&json).unwrap();
        match back {
            SignalingMessage::Offer { offer, .. } => assert_eq!(offer, payload),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn candidate_with_from_round_trip() {
        let msg = SignalingMessage::IceCandidate {
            session_id: SessionId::from("s1"),
            candidate: serde_json::json!({"candidate": "candidate:1 1 UDP 2122252543 ..."}),
            from: Some(PeerId::from("p2".to_string())),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"ice-candidate""#));
        assert!(json.contains(r#""from":"p2""#));
        let back: SignalingMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, SignalingMessage::IceCandidate { .. }));
    }

    #[test]
    fn peer_disconnected_is_bare() {
        let json = serde_json::to_string(&SignalingMessage::PeerDisconnected).unwrap();
        assert_eq!(json, r#"{"type":"peer-disconnected"}"#);
    }

    #[test]
    fn unknown_type_fails_to_decode() {
        let result = serde_json::from_str::<SignalingMessage>(r#"{"type":"discover"}"#);
        assert!(result.is_err());
    }
}
