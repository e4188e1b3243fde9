/// Errors the relay reports on a signaling connection. None of these are
/// fatal to the relay process; the connection stays open unless noted.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Registration carried an unrecognized role string.
    #[error("Invalid role. Must be \"sender\" or \"receiver\"")]
    InvalidRole,

    /// An answer or candidate referenced a session the relay doesn't know.
    #[error("Session not found")]
    SessionNotFound,

    /// A session-scoped message arrived from a connection that never
    /// registered, or registered the wrong role for that message.
    #[error("not registered: {0}")]
    NotRegistered(String),

    /// Undecodable frame. Logged and dropped, never forwarded.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The counterpart's outbound queue is closed or full. The message is
    /// silently dropped; late candidates legitimately end up here.
    #[error("peer unreachable")]
    PeerUnreachable,
}

/// Endpoint-side failure reasons, surfaced to the host application.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("screen capture failed: {0}")]
    Capture(String),

    #[error("signaling connection failed: {0}")]
    SignalingConnect(String),

    #[error("signaling protocol error: {0}")]
    Signaling(String),

    #[error("transport error: {0}")]
    Transport(String),
}
