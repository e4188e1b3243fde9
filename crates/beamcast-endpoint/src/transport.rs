//! Collaborator boundaries. The browser-native handshake/codec/transport
//! stack (ICE gathering, DTLS/SRTP, congestion control) and the screen
//! capture source live behind these traits; the state machines only ever see
//! opaque payloads and coarse events.

use async_trait::async_trait;

use beamcast_common::EndpointError;

/// The local capture resource. Acquisition is a prerequisite gate for the
/// sender: failure aborts the attempt before any relay connection.
#[async_trait]
pub trait ScreenSource: Send {
    async fn acquire(&mut self) -> Result<(), EndpointError>;

    /// Idempotent. Releasing a source that was never acquired is a no-op.
    fn release(&mut self);
}

/// The direct peer-to-peer transport. Offer/answer/candidate payloads are
/// opaque values produced and consumed by the implementation; this crate
/// forwards them byte-for-byte through the relay.
#[async_trait]
pub trait PeerTransport: Send {
    /// Create the local session description (sender side).
    async fn create_offer(&mut self) -> Result<serde_json::Value, EndpointError>;

    /// Apply the remote answer (sender side).
    async fn accept_answer(&mut self, answer: serde_json::Value) -> Result<(), EndpointError>;

    /// Apply the remote offer and produce the answer (receiver side).
    async fn accept_offer(
        &mut self,
        offer: serde_json::Value,
    ) -> Result<serde_json::Value, EndpointError>;

    /// Supply a remote reachability candidate. Best-effort.
    async fn add_remote_candidate(
        &mut self,
        candidate: serde_json::Value,
    ) -> Result<(), EndpointError>;

    /// Send an input payload (gesture deltas) over the established channel.
    async fn send_input(&mut self, payload: serde_json::Value) -> Result<(), EndpointError>;

    /// Sample transport health. Informational only.
    async fn stats(&mut self) -> TransportStats;

    /// Idempotent. Closing a transport that never opened is a no-op.
    async fn close(&mut self);
}

/// Events the transport reports back to the driving state machine, delivered
/// on a channel handed to the driver at construction.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A local reachability candidate to forward through the relay.
    LocalCandidate(serde_json::Value),
    /// The direct session formed.
    Connected,
    /// The direct session failed or was lost.
    Failed(String),
}

/// Passive health sample of the direct session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransportStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub bitrate_mbps: f64,
}
