//! Per-connection handler: assign a peer id, then pump frames between the
//! WebSocket and the routing core.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use beamcast_common::{PeerId, SignalingMessage};

use crate::router::{self, SharedState};

/// Handle a single WebSocket connection for its whole lifetime.
pub async fn handle_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    addr: SocketAddr,
    state: SharedState,
) {
    let (mut sink, mut stream) = ws.split();
    let peer_id = PeerId::new();

    // 1. Assign identity before anything else, registration included.
    let assigned = serde_json::to_string(&SignalingMessage::PeerAssigned {
        peer_id: peer_id.clone(),
    })
    .unwrap();
    if sink.send(Message::Text(assigned.into())).await.is_err() {
        return;
    }

    tracing::info!(peer = %peer_id, addr = %addr, "Connection accepted");

    // 2. Outbound queue. The router pushes into `tx` (fire-and-forget); this
    // task alone drains `rx` into the socket.
    let (tx, mut rx) = mpsc::channel::<String>(256);

    // 3. Pump loop.
    loop {
        tokio::select! {
            Some(frame) = rx.recv() => {
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<SignalingMessage>(&text) {
                            Ok(msg) => {
                                let mut guard = state.lock().await;
                                router::handle_message(&mut guard, &peer_id, &tx, msg);
                            }
                            Err(e) => {
                                // Malformed frames are logged and dropped;
                                // the connection stays open.
                                tracing::warn!(peer = %peer_id, error = %e, "Malformed message dropped");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %peer_id, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // 4. Cleanup: the transport's close is our only liveness signal.
    tracing::info!(peer = %peer_id, addr = %addr, "Connection closed");
    let mut guard = state.lock().await;
    router::handle_disconnect(&mut guard, &peer_id);
}
