//! Endpoint-side connection lifecycle for beamcast screen sharing.
//!
//! Two state machines drive the signaling handshake against the relay: the
//! initiator (screen-sharing sender) and the responder (touch-control
//! receiver). Screen capture and the real-time transport are external
//! collaborators reached only through the traits in [`transport`] — this
//! crate owns the handshake order, never the media.
//!
//! Each machine is a synchronous core (pure transition functions returning
//! actions) plus an async driver in [`driver`] that wires the core to the
//! relay WebSocket and the collaborators.

pub mod config;
pub mod driver;
pub mod events;
pub mod initiator;
pub mod responder;
pub mod transport;

pub use config::EndpointConfig;
pub use driver::{run_initiator, run_responder};
pub use events::{EndpointAction, EndpointEvent};
pub use initiator::{InitiatorMachine, InitiatorState};
pub use responder::{ResponderMachine, ResponderState};
pub use transport::{PeerTransport, ScreenSource, TransportEvent, TransportStats};
