//! Sender-side handshake machine. Acquires the capture gate, registers as
//! `sender`, sends exactly one offer for its session, and waits out the
//! answer/candidate exchange until the transport reports a direct session.

use beamcast_common::{PeerId, Role, SessionId, SignalingMessage};

use crate::events::{EndpointAction, EndpointEvent};
use crate::transport::TransportEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatorState {
    Idle,
    AcquiringCapture,
    ConnectingToRelay,
    Registered,
    NegotiationStarted,
    AwaitingAnswer,
    Connected,
    Closed,
}

pub struct InitiatorMachine {
    state: InitiatorState,
    session_id: SessionId,
    peer_id: Option<PeerId>,
    offer_sent: bool,
}

impl InitiatorMachine {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            state: InitiatorState::Idle,
            session_id,
            peer_id: None,
            offer_sent: false,
        }
    }

    pub fn state(&self) -> InitiatorState {
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
        self.state == InitiatorState::Connected
    }

    pub fn is_closed(&self) -> bool {
        self.state == InitiatorState::Closed
    }

    /// Capture acquisition started.
    pub fn begin_capture(&mut self) {
        if self.state == InitiatorState::Idle {
            self.state = InitiatorState::AcquiringCapture;
        }
    }

    /// Capture gate passed; the relay connection may start.
    pub fn on_capture_acquired(&mut self) {
        if self.state == InitiatorState::AcquiringCapture {
            self.state = InitiatorState::ConnectingToRelay;
        }
    }

    /// A frame arrived from the relay.
    pub fn on_signal(&mut self, msg: SignalingMessage) -> Vec<EndpointAction> {
        // Closed is terminal; a late frame must not resurrect the machine.
        if self.state == InitiatorState::Closed {
            return vec![];
        }
        match msg {
            SignalingMessage::PeerAssigned { peer_id } => {
                self.peer_id = Some(peer_id.clone());
                vec![
                    EndpointAction::Emit(EndpointEvent::RelayConnected { peer_id }),
                    EndpointAction::SendSignal(SignalingMessage::Register {
                        role: Role::Sender.as_str().into(),
                        session_id: None,
                    }),
                ]
            }

            SignalingMessage::Registered { role, .. } => {
                let mut actions = vec![EndpointAction::Emit(EndpointEvent::Registered { role })];
                self.state = InitiatorState::Registered;
                // One offer per session, created as soon as registration lands.
                if !self.offer_sent {
                    self.state = InitiatorState::NegotiationStarted;
                    actions.push(EndpointAction::CreateOffer);
                }
                actions
            }

            SignalingMessage::Answer { answer, .. } => {
                if self.state == InitiatorState::AwaitingAnswer {
                    vec![
                        EndpointAction::AcceptAnswer(answer),
                        EndpointAction::Emit(EndpointEvent::AnswerReceived),
                    ]
                } else {
                    tracing::debug!(state = ?self.state, "Ignoring answer");
                    vec![]
                }
            }

            SignalingMessage::IceCandidate { candidate, .. } => {
                // Remote candidates are legitimate both before and after the
                // answer lands.
                if self.negotiating() {
                    vec![EndpointAction::AddRemoteCandidate(candidate)]
                } else {
                    vec![]
                }
            }

            SignalingMessage::PeerDisconnected => {
                let mut actions = vec![EndpointAction::Emit(EndpointEvent::PeerDisconnected)];
                // Mid-handshake, losing the counterpart ends the attempt; once
                // the direct session exists the relay no longer matters.
                if self.state != InitiatorState::Connected {
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

    /// The transport produced our offer.
    pub fn on_offer_created(&mut self, offer: serde_json::Value) -> Vec<EndpointAction> {
        if self.state != InitiatorState::NegotiationStarted || self.offer_sent {
            return vec![];
        }
        self.offer_sent = true;
        self.state = InitiatorState::AwaitingAnswer;
        vec![
            EndpointAction::SendSignal(SignalingMessage::Offer {
                session_id: self.session_id.clone(),
                offer,
                from: None,
            }),
            EndpointAction::Emit(EndpointEvent::OfferSent {
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
                if self.state == InitiatorState::AwaitingAnswer {
                    self.state = InitiatorState::Connected;
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

    /// Terminal transition. Safe to call repeatedly; the driver performs the
    /// actual resource teardown.
    pub fn close(&mut self) -> Vec<EndpointAction> {
        if self.state == InitiatorState::Closed {
            return vec![];
        }
        self.state = InitiatorState::Closed;
        vec![EndpointAction::Emit(EndpointEvent::Closed)]
    }

    fn negotiating(&self) -> bool {
        matches!(
            self.state,
            InitiatorState::NegotiationStarted
                | InitiatorState::AwaitingAnswer
                | InitiatorState::Connected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beamcast_common::PeerId;

    fn machine() -> InitiatorMachine {
        InitiatorMachine::new(SessionId::from("s1"))
    }

    fn registered_machine() -> InitiatorMachine {
        let mut m = machine();
        m.begin_capture();
        m.on_capture_acquired();
        m.on_signal(SignalingMessage::PeerAssigned { peer_id: PeerId::new() });
        m.on_signal(SignalingMessage::Registered {
            peer_id: PeerId::new(),
            role: Role::Sender,
        });
        m
    }

    #[test]
    fn happy_path_reaches_connected() {
        let mut m = machine();
        assert_eq!(m.state(), InitiatorState::Idle);
        m.begin_capture();
        assert_eq!(m.state(), InitiatorState::AcquiringCapture);
        m.on_capture_acquired();
        assert_eq!(m.state(), InitiatorState::ConnectingToRelay);

        let actions = m.on_signal(SignalingMessage::PeerAssigned { peer_id: PeerId::new() });
        assert!(actions.iter().any(|a| matches!(
            a,
            EndpointAction::SendSignal(SignalingMessage::Register { role, .. }) if role == "sender"
        )));

        let actions = m.on_signal(SignalingMessage::Registered {
            peer_id: PeerId::new(),
            role: Role::Sender,
        });
        assert!(actions.iter().any(|a| matches!(a, EndpointAction::CreateOffer)));
        assert_eq!(m.state(), InitiatorState::NegotiationStarted);

        let actions = m.on_offer_created(serde_json::json!({"sdp": "o"}));
        assert!(actions.iter().any(|a| matches!(
            a,
            EndpointAction::SendSignal(SignalingMessage::Offer { .. })
        )));
        assert_eq!(m.state(), InitiatorState::AwaitingAnswer);

        // Candidate before the answer resolves.
        let actions = m.on_signal(SignalingMessage::IceCandidate {
            session_id: SessionId::from("s1"),
            candidate: serde_json::json!({"candidate": "a"}),
            from: None,
        });
        assert!(matches!(actions[0], EndpointAction::AddRemoteCandidate(_)));

        let actions = m.on_signal(SignalingMessage::Answer {
            session_id: SessionId::from("s1"),
            answer: serde_json::json!({"sdp": "a"}),
            from: None,
        });
        assert!(matches!(actions[0], EndpointAction::AcceptAnswer(_)));

        let actions = m.on_transport(TransportEvent::Connected);
        assert!(matches!(
            actions[0],
            EndpointAction::Emit(EndpointEvent::TransportConnected)
        ));
        assert!(m.is_connected());

        // Candidate after the answer resolves.
        let actions = m.on_signal(SignalingMessage::IceCandidate {
            session_id: SessionId::from("s1"),
            candidate: serde_json::json!({"candidate": "b"}),
            from: None,
        });
        assert!(matches!(actions[0], EndpointAction::AddRemoteCandidate(_)));
    }

    #[test]
    fn exactly_one_offer_per_session() {
        let mut m = registered_machine();
        assert!(!m.on_offer_created(serde_json::json!({"sdp": "o"})).is_empty());
        // A duplicate registration ack must not trigger a second offer.
        let actions = m.on_signal(SignalingMessage::Registered {
            peer_id: PeerId::new(),
            role: Role::Sender,
        });
        assert!(!actions.iter().any(|a| matches!(a, EndpointAction::CreateOffer)));
        assert!(m.on_offer_created(serde_json::json!({"sdp": "o2"})).is_empty());
    }

    #[test]
    fn local_candidates_forwarded_while_negotiating() {
        let mut m = registered_machine();
        m.on_offer_created(serde_json::json!({}));
        let actions = m.on_transport(TransportEvent::LocalCandidate(serde_json::json!({"c": 1})));
        match &actions[0] {
            EndpointAction::SendSignal(SignalingMessage::IceCandidate { session_id, .. }) => {
                assert_eq!(session_id, &SessionId::from("s1"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn candidate_before_negotiation_is_ignored() {
        let mut m = machine();
        m.begin_capture();
        m.on_capture_acquired();
        let actions = m.on_signal(SignalingMessage::IceCandidate {
            session_id: SessionId::from("s1"),
            candidate: serde_json::json!({}),
            from: None,
        });
        assert!(actions.is_empty());
    }

    #[test]
    fn peer_disconnected_mid_handshake_closes() {
        let mut m = registered_machine();
        m.on_offer_created(serde_json::json!({}));
        let actions = m.on_signal(SignalingMessage::PeerDisconnected);
        assert!(actions
            .iter()
            .any(|a| matches!(a, EndpointAction::Emit(EndpointEvent::PeerDisconnected))));
        assert!(m.is_closed());
    }

    #[test]
    fn peer_disconnected_after_connected_does_not_close() {
        let mut m = registered_machine();
        m.on_offer_created(serde_json::json!({}));
        m.on_signal(SignalingMessage::Answer {
            session_id: SessionId::from("s1"),
            answer: serde_json::json!({}),
            from: None,
        });
        m.on_transport(TransportEvent::Connected);
        m.on_signal(SignalingMessage::PeerDisconnected);
        assert!(m.is_connected());
    }

    #[test]
    fn transport_failure_closes() {
        let mut m = registered_machine();
        m.on_offer_created(serde_json::json!({}));
        let actions = m.on_transport(TransportEvent::Failed("ice failed".into()));
        assert!(actions
            .iter()
            .any(|a| matches!(a, EndpointAction::Emit(EndpointEvent::TransportFailed(_)))));
        assert!(m.is_closed());
    }

    #[test]
    fn close_is_idempotent() {
        let mut m = registered_machine();
        assert_eq!(m.close().len(), 1);
        assert!(m.close().is_empty());
        assert!(m.is_closed());
    }

    #[test]
    fn late_signals_do_not_resurrect_closed_machine() {
        let mut m = registered_machine();
        m.close();
        let actions = m.on_signal(SignalingMessage::Registered {
            peer_id: PeerId::new(),
            role: Role::Sender,
        });
        assert!(actions.is_empty());
        assert!(m.is_closed());
    }
}
