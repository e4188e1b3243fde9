//! Receiver-side handshake machine. Passive until the offer arrives, then
//! produces exactly one answer for its session. Gesture payloads are only
//! meaningful once the direct session exists; anything earlier is dropped,
//! not queued.

use beamcast_common::{PeerId, Role, SessionId, SignalingMessage};

use crate::events::{EndpointAction, EndpointEvent};
use crate::transport::TransportEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderState {
    Idle,
    ConnectingToRelay,
    Registered,
    AwaitingOffer,
    AnswerSent,
    Connected,
    Closed,
}

pub struct ResponderMachine {
    state: ResponderState,
    session_id: SessionId,
    peer_id: Option<PeerId>,
    answer_sent: bool,
}

impl ResponderMachine {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            state: ResponderState::Idle,
            session_id,
            peer_id: None,
            answer_sent: false,
        }
    }

    pub fn state(&self) -> ResponderState {
        self.state
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Relay-assigned identity, once known.
    pub fn peer_id(&self) -> Option<&PeerId> {
        self.peer_id.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.state == ResponderState::Connected
    }

    pub fn is_closed(&self) -> bool {
        self.state == ResponderState::Closed
    }

    /// The relay connection attempt started.
    pub fn begin_connect(&mut self) {
        if self.state == ResponderState::Idle {
            self.state = ResponderState::ConnectingToRelay;
        }
    }

    pub fn on_signal(&mut self, msg: SignalingMessage) -> Vec<EndpointAction> {
        // Closed is terminal; a late frame must not resurrect the machine.
        if self.state == ResponderState::Closed {
            return vec![];
        }
        match msg {
            SignalingMessage::PeerAssigned { peer_id } => {
                self.peer_id = Some(peer_id.clone());
                // Registering with the session id attaches us immediately, so
                // an offer sent before we arrived is replayed by the relay.
                vec![
                    EndpointAction::Emit(EndpointEvent::RelayConnected { peer_id }),
                    EndpointAction::SendSignal(SignalingMessage::Register {
                        role: Role::Receiver.as_str().into(),
                        session_id: Some(self.session_id.clone()),
                    }),
                ]
            }

            SignalingMessage::Registered { role, .. } => {
                self.state = ResponderState::AwaitingOffer;
                vec![EndpointAction::Emit(EndpointEvent::Registered { role })]
            }

            SignalingMessage::Offer { offer, .. } => {
                if self.state == ResponderState::AwaitingOffer && !self.answer_sent {
                    vec![EndpointAction::AcceptOffer(offer)]
                } else {
                    tracing::debug!(state = ?self.state, "Ignoring offer");
                    vec![]
                }
            }

            SignalingMessage::IceCandidate { candidate, .. } => {
                if self.negotiating() {
                    vec![EndpointAction::AddRemoteCandidate(candidate)]
                } else {
                    vec![]
                }
            }

            SignalingMessage::PeerDisconnected => {
                let mut actions = vec![EndpointAction::Emit(EndpointEvent::PeerDisconnected)];
                if self.state != ResponderState::Connected {
                    actions.extend(self.close());
                }
                actions
            }

            SignalingMessage::Error { message } => {
                vec![EndpointAction::Emit(EndpointEvent::RelayError(message))]
            }

            other => {
                tracing::debug!(msg = ?other, "Ignoring unexpected signal");
                vec![]
            }
        }
    }

    /// The transport answered the remote offer.
    pub fn on_answer_created(&mut self, answer: serde_json::Value) -> Vec<EndpointAction> {
        if self.answer_sent {
            return vec![];
        }
        self.answer_sent = true;
        self.state = ResponderState::AnswerSent;
        vec![
            EndpointAction::SendSignal(SignalingMessage::Answer {
                session_id: self.session_id.clone(),
                answer,
                from: None,
            }),
            EndpointAction::Emit(EndpointEvent::AnswerSent {
                session_id: self.session_id.clone(),
            }),
        ]
    }

    pub fn on_transport(&mut self, event: TransportEvent) -> Vec<EndpointAction> {
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                if self.negotiating() {
                    vec![EndpointAction::SendSignal(SignalingMessage::IceCandidate {
                        session_id: self.session_id.clone(),
                        candidate,
                        from: None,
                    })]
                } else {
                    vec![]
                }
            }
            TransportEvent::Connected => {
                if self.state == ResponderState::AnswerSent {
                    self.state = ResponderState::Connected;
                    vec![EndpointAction::Emit(EndpointEvent::TransportConnected)]
                } else {
                    vec![]
                }
            }
            TransportEvent::Failed(reason) => {
                let mut actions =
                    vec![EndpointAction::Emit(EndpointEvent::TransportFailed(reason))];
                actions.extend(self.close());
                actions
            }
        }
    }

    /// Gesture payload from the host UI. Dropped unless the direct session
    /// is up.
    pub fn on_gesture(&mut self, payload: serde_json::Value) -> Vec<EndpointAction> {
        if self.state == ResponderState::Connected {
            vec![EndpointAction::SendInput(payload)]
        } else {
            tracing::trace!(state = ?self.state, "Dropping gesture before connect");
            vec![]
        }
    }

    /// Terminal transition. Safe to call repeatedly.
    pub fn close(&mut self) -> Vec<EndpointAction> {
        if self.state == ResponderState::Closed {
            return vec![];
        }
        self.state = ResponderState::Closed;
        vec![EndpointAction::Emit(EndpointEvent::Closed)]
    }

    fn negotiating(&self) -> bool {
        matches!(
            self.state,
            ResponderState::AwaitingOffer | ResponderState::AnswerSent | ResponderState::Connected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beamcast_common::PeerId;

    fn machine() -> ResponderMachine {
        ResponderMachine::new(SessionId::from("s1"))
    }

    fn awaiting_offer_machine() -> ResponderMachine {
        let mut m = machine();
        m.begin_connect();
        m.on_signal(SignalingMessage::PeerAssigned { peer_id: PeerId::new() });
        m.on_signal(SignalingMessage::Registered {
            peer_id: PeerId::new(),
            role: Role::Receiver,
        });
        m
    }

    #[test]
    fn registers_with_session_id_for_attach() {
        let mut m = machine();
        m.begin_connect();
        let actions = m.on_signal(SignalingMessage::PeerAssigned { peer_id: PeerId::new() });
        match &actions[1] {
            EndpointAction::SendSignal(SignalingMessage::Register { role, session_id }) => {
                assert_eq!(role, "receiver");
                assert_eq!(session_id, &Some(SessionId::from("s1")));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn happy_path_reaches_connected() {
        let mut m = awaiting_offer_machine();
        assert_eq!(m.state(), ResponderState::AwaitingOffer);

        let actions = m.on_signal(SignalingMessage::Offer {
            session_id: SessionId::from("s1"),
            offer: serde_json::json!({"sdp": "o"}),
            from: None,
        });
        assert!(matches!(actions[0], EndpointAction::AcceptOffer(_)));

        let actions = m.on_answer_created(serde_json::json!({"sdp": "a"}));
        assert!(matches!(
            actions[0],
            EndpointAction::SendSignal(SignalingMessage::Answer { .. })
        ));
        assert_eq!(m.state(), ResponderState::AnswerSent);

        let actions = m.on_transport(TransportEvent::Connected);
        assert!(matches!(
            actions[0],
            EndpointAction::Emit(EndpointEvent::TransportConnected)
        ));
        assert!(m.is_connected());
    }

    #[test]
    fn exactly_one_answer_per_session() {
        let mut m = awaiting_offer_machine();
        m.on_signal(SignalingMessage::Offer {
            session_id: SessionId::from("s1"),
            offer: serde_json::json!({}),
            from: None,
        });
        assert!(!m.on_answer_created(serde_json::json!({})).is_empty());
        // A replayed offer after answering is ignored.
        let actions = m.on_signal(SignalingMessage::Offer {
            session_id: SessionId::from("s1"),
            offer: serde_json::json!({}),
            from: None,
        });
        assert!(actions.is_empty());
        assert!(m.on_answer_created(serde_json::json!({})).is_empty());
    }

    #[test]
    fn gestures_before_connected_are_dropped_not_queued() {
        let mut m = awaiting_offer_machine();
        assert!(m.on_gesture(serde_json::json!({"dx": -3.0, "dy": 12.0})).is_empty());

        m.on_signal(SignalingMessage::Offer {
            session_id: SessionId::from("s1"),
            offer: serde_json::json!({}),
            from: None,
        });
        m.on_answer_created(serde_json::json!({}));
        assert!(m.on_gesture(serde_json::json!({"dx": 1.0, "dy": 0.0})).is_empty());

        m.on_transport(TransportEvent::Connected);
        let actions = m.on_gesture(serde_json::json!({"dx": 1.0, "dy": 0.0}));
        assert!(matches!(actions[0], EndpointAction::SendInput(_)));
    }

    #[test]
    fn candidates_tolerated_before_offer() {
        let mut m = awaiting_offer_machine();
        let actions = m.on_signal(SignalingMessage::IceCandidate {
            session_id: SessionId::from("s1"),
            candidate: serde_json::json!({"c": 1}),
            from: None,
        });
        assert!(matches!(actions[0], EndpointAction::AddRemoteCandidate(_)));
    }

    #[test]
    fn peer_disconnected_mid_handshake_closes() {
        let mut m = awaiting_offer_machine();
        m.on_signal(SignalingMessage::PeerDisconnected);
        assert!(m.is_closed());
    }

    #[test]
    fn close_is_idempotent() {
        let mut m = awaiting_offer_machine();
        assert_eq!(m.close().len(), 1);
        assert!(m.close().is_empty());
    }

    #[test]
    fn late_signals_do_not_resurrect_closed_machine() {
        let mut m = awaiting_offer_machine();
        m.close();
        let actions = m.on_signal(SignalingMessage::Registered {
            peer_id: PeerId::new(),
            role: Role::Receiver,
        });
        assert!(actions.is_empty());
        assert!(m.is_closed());
    }
}
