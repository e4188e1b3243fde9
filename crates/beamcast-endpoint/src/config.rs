use beamcast_common::SessionId;

/// Configuration for an endpoint's connection attempt.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// WebSocket URL of the signaling relay.
    pub relay_url: String,
    /// Session to join. `None` generates a fresh id (sender side); the
    /// receiver must supply the id it was handed out-of-band.
    pub session_id: Option<SessionId>,
    /// Timeout for the relay connection attempt, in seconds.
    pub connect_timeout_secs: u64,
    /// Interval between transport-stats samples once connected, in seconds.
    pub stats_interval_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:8080".into(),
            session_id: None,
            connect_timeout_secs: 10,
            stats_interval_secs: 2,
        }
    }
}

impl EndpointConfig {
    /// Resolve the session id, generating one if the caller left it unset.
    pub fn session_id(&self) -> SessionId {
        self.session_id.clone().unwrap_or_default()
    }
}
