//! Events surfaced to the host application and the actions the machine cores
//! hand back to their drivers.

use beamcast_common::{PeerId, Role, SessionId, SignalingMessage};

use crate::transport::TransportStats;

/// Events emitted while a connection attempt runs.
#[derive(Debug, Clone)]
pub enum EndpointEvent {
    /// Relay accepted us and assigned an identity.
    RelayConnected { peer_id: PeerId },
    /// Role registration acknowledged.
    Registered { role: Role },
    OfferSent { session_id: SessionId },
    AnswerReceived,
    AnswerSent { session_id: SessionId },
    /// The counterpart dropped off the relay.
    PeerDisconnected,
    /// The direct session formed; the relay is out of the path now.
    TransportConnected,
    /// Periodic health sample, only while connected.
    Stats(TransportStats),
    TransportFailed(String),
    /// Non-fatal error reported by the relay.
    RelayError(String),
    Closed,
}

/// What a machine core asks its driver to do next. The cores never touch
/// sockets or collaborators directly.
#[derive(Debug, Clone)]
pub enum EndpointAction {
    SendSignal(SignalingMessage),
    /// Ask the transport for an offer; the result comes back through
    /// `on_offer_created`.
    CreateOffer,
    /// Apply a remote offer and answer it; the result comes back through
    /// `on_answer_created`.
    AcceptOffer(serde_json::Value),
    AcceptAnswer(serde_json::Value),
    AddRemoteCandidate(serde_json::Value),
    /// Forward a gesture payload over the established channel.
    SendInput(serde_json::Value),
    Emit(EndpointEvent),
}
