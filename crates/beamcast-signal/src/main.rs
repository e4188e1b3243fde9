//! beamcast-signal: WebSocket signaling relay for screen-share sessions.
//!
//! Accepts connections, pairs them into sessions by session id, and forwards
//! offer/answer/candidate payloads between a sender and a receiver. The relay
//! never inspects payloads — once the direct session forms it is out of the
//! media path entirely.

mod connection;
mod registry;
mod router;
mod session;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::accept_async;

use crate::connection::handle_connection;
use crate::router::{RelayState, SharedState};

#[derive(Parser)]
#[command(name = "beamcast-signal", about = "Signaling relay for beamcast screen sharing")]
struct Args {
    /// Port to listen on (all interfaces).
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beamcast_signal=info".into()),
        )
        .init();

    let args = Args::parse();
    let state: SharedState = Arc::new(Mutex::new(RelayState::new()));

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind TCP listener");

    tracing::info!("beamcast-signal listening on {}", addr);

    // Periodic observation tick.
    let tick_state = state.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let guard = tick_state.lock().await;
            tracing::debug!(
                peers = guard.registry.count(),
                sessions = guard.sessions.count(),
                "Relay tick"
            );
        }
    });

    // Accept loop. A single connection's fault never affects others.
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    serve(stream, addr, state).await;
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}

/// Classify an inbound TCP connection: the liveness probe shares the listener
/// with the WebSocket upgrade, so peek at the request line first.
async fn serve(stream: TcpStream, addr: std::net::SocketAddr, state: SharedState) {
    let mut head = [0u8; 64];
    // The request line may arrive fragmented, so keep peeking while what we
    // have is still an incomplete prefix of the probe. A client that stalls
    // mid-prefix falls through to the WS handshake, which rejects it.
    for _ in 0..100 {
        match stream.peek(&mut head).await {
            Ok(0) => return,
            Ok(n) => {
                let seen = &head[..n];
                if seen.starts_with(b"GET /health") {
                    respond_health(stream, addr).await;
                    return;
                }
                if !b"GET /health".starts_with(seen) {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(peer = %addr, error = %e, "Peek failed");
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    match accept_async(stream).await {
        Ok(ws) => handle_connection(ws, addr, state).await,
        Err(e) => {
            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
        }
    }
}

async fn respond_health(mut stream: TcpStream, addr: std::net::SocketAddr) {
    const RESPONSE: &[u8] =
        b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK";
    if let Err(e) = stream.write_all(RESPONSE).await {
        tracing::debug!(peer = %addr, error = %e, "Health response failed");
    }
}
