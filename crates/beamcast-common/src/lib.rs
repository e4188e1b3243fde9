pub mod errors;
pub mod id;
pub mod protocol;

pub use errors::{EndpointError, SignalError};
pub use id::{new_peer_id, PeerId, SessionId};
pub use protocol::{Role, SignalingMessage};
