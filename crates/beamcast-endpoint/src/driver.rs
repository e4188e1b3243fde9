//! Async drivers: connect to the relay, pump frames and transport events
//! through the machine cores, and tear the three resources down in order
//! (capture, relay connection, direct session) when the attempt ends.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use beamcast_common::{EndpointError, SignalingMessage};

use crate::config::EndpointConfig;
use crate::events::{EndpointAction, EndpointEvent};
use crate::initiator::InitiatorMachine;
use crate::responder::ResponderMachine;
use crate::transport::{PeerTransport, ScreenSource, TransportEvent};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = futures_util::stream::SplitSink<WsStream, Message>;
type WsSource = futures_util::stream::SplitStream<WsStream>;

/// Run one sender-side connection attempt to completion. Returns when the
/// attempt ends — shutdown, handshake failure, or transport loss. There is no
/// retry here; the caller starts over with a fresh session id if it wants.
pub async fn run_initiator<S, T>(
    config: EndpointConfig,
    mut source: S,
    mut transport: T,
    mut transport_rx: mpsc::Receiver<TransportEvent>,
    event_tx: mpsc::Sender<EndpointEvent>,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<(), EndpointError>
where
    S: ScreenSource,
    T: PeerTransport,
{
    let mut machine = InitiatorMachine::new(config.session_id());

    // Capture is the prerequisite gate: fail here and the relay is never
    // contacted.
    machine.begin_capture();
    if let Err(e) = source.acquire().await {
        tracing::warn!(error = %e, "Capture acquisition failed");
        emit_all(&event_tx, machine.close()).await;
        return Err(e);
    }
    machine.on_capture_acquired();

    let ws = match connect_relay(&config).await {
        Ok(ws) => ws,
        Err(e) => {
            source.release();
            emit_all(&event_tx, machine.close()).await;
            return Err(e);
        }
    };
    let (mut sink, mut stream) = ws.split();
    tracing::info!(session = %machine.session_id(), "Connected to relay");

    let result = drive_initiator(
        &config,
        &mut machine,
        &mut sink,
        &mut stream,
        &mut transport,
        &mut transport_rx,
        &event_tx,
        &mut shutdown_rx,
    )
    .await;

    // Teardown order: capture, relay connection, direct session. Each step
    // tolerates a resource that never opened.
    source.release();
    let _ = sink.close().await;
    transport.close().await;
    emit_all(&event_tx, machine.close()).await;
    result
}

/// Run one receiver-side connection attempt to completion. `gesture_rx`
/// carries opaque input payloads from the host UI; they are dropped until the
/// direct session is up.
pub async fn run_responder<T>(
    config: EndpointConfig,
    mut transport: T,
    mut transport_rx: mpsc::Receiver<TransportEvent>,
    mut gesture_rx: mpsc::Receiver<serde_json::Value>,
    event_tx: mpsc::Sender<EndpointEvent>,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<(), EndpointError>
where
    T: PeerTransport,
{
    let session_id = config
        .session_id
        .clone()
        .ok_or_else(|| EndpointError::Signaling("receiver requires a session id".into()))?;
    let mut machine = ResponderMachine::new(session_id);

    machine.begin_connect();
    let ws = match connect_relay(&config).await {
        Ok(ws) => ws,
        Err(e) => {
            emit_all(&event_tx, machine.close()).await;
            return Err(e);
        }
    };
    let (mut sink, mut stream) = ws.split();
    tracing::info!(session = %machine.session_id(), "Connected to relay");

    let result = drive_responder(
        &mut machine,
        &mut sink,
        &mut stream,
        &mut transport,
        &mut transport_rx,
        &mut gesture_rx,
        &event_tx,
        &mut shutdown_rx,
    )
    .await;

    let _ = sink.close().await;
    transport.close().await;
    emit_all(&event_tx, machine.close()).await;
    result
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
async fn drive_initiator<T: PeerTransport>(
    config: &EndpointConfig,
    machine: &mut InitiatorMachine,
    sink: &mut WsSink,
    stream: &mut WsSource,
    transport: &mut T,
    transport_rx: &mut mpsc::Receiver<TransportEvent>,
    event_tx: &mpsc::Sender<EndpointEvent>,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> Result<(), EndpointError> {
    let mut stats_tick =
        tokio::time::interval(Duration::from_secs(config.stats_interval_secs.max(1)));
    let mut relay_open = true;

    loop {
        tokio::select! {
            frame = stream.next(), if relay_open => {
                match read_frame(frame) {
                    FrameResult::Signal(msg) => {
                        let actions = machine.on_signal(msg);
                        apply_initiator(machine, actions.into(), transport, sink, event_tx).await?;
                    }
                    FrameResult::Ping(data) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    FrameResult::Closed => {
                        if machine.is_connected() {
                            // The direct session no longer needs the relay.
                            tracing::info!("Relay connection ended after connect");
                            relay_open = false;
                        } else {
                            return Err(EndpointError::Signaling("relay closed mid-handshake".into()));
                        }
                    }
                    FrameResult::Ignored => {}
                }
            }

            Some(event) = transport_rx.recv() => {
                let actions = machine.on_transport(event);
                apply_initiator(machine, actions.into(), transport, sink, event_tx).await?;
            }

            _ = stats_tick.tick(), if machine.is_connected() => {
                let stats = transport.stats().await;
                let _ = event_tx.send(EndpointEvent::Stats(stats)).await;
            }

            _ = shutdown_rx.recv() => {
                tracing::info!("Initiator shutting down");
                return Ok(());
            }

            else => return Ok(()),
        }

        if machine.is_closed() {
            return Ok(());
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn drive_responder<T: PeerTransport>(
    machine: &mut ResponderMachine,
    sink: &mut WsSink,
    stream: &mut WsSource,
    transport: &mut T,
    transport_rx: &mut mpsc::Receiver<TransportEvent>,
    gesture_rx: &mut mpsc::Receiver<serde_json::Value>,
    event_tx: &mpsc::Sender<EndpointEvent>,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> Result<(), EndpointError> {
    let mut relay_open = true;

    loop {
        // Biased so queued gestures are consumed before a transport state
        // change: a gesture that arrived before Connected must not be
        // forwarded as if it came after.
        tokio::select! {
            biased;

            frame = stream.next(), if relay_open => {
                match read_frame(frame) {
                    FrameResult::Signal(msg) => {
                        let actions = machine.on_signal(msg);
                        apply_responder(machine, actions.into(), transport, sink, event_tx).await?;
                    }
                    FrameResult::Ping(data) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    FrameResult::Closed => {
                        if machine.is_connected() {
                            tracing::info!("Relay connection ended after connect");
                            relay_open = false;
                        } else {
                            return Err(EndpointError::Signaling("relay closed mid-handshake".into()));
                        }
                    }
                    FrameResult::Ignored => {}
                }
            }

            Some(payload) = gesture_rx.recv() => {
                let actions = machine.on_gesture(payload);
                apply_responder(machine, actions.into(), transport, sink, event_tx).await?;
            }

            Some(event) = transport_rx.recv() => {
                let actions = machine.on_transport(event);
                apply_responder(machine, actions.into(), transport, sink, event_tx).await?;
            }

            _ = shutdown_rx.recv() => {
                tracing::info!("Responder shutting down");
                return Ok(());
            }

            else => return Ok(()),
        }

        if machine.is_closed() {
            return Ok(());
        }
    }
}

// ---------------------------------------------------------------------------
// Action application
// ---------------------------------------------------------------------------

async fn apply_initiator<T: PeerTransport>(
    machine: &mut InitiatorMachine,
    mut actions: VecDeque<EndpointAction>,
    transport: &mut T,
    sink: &mut WsSink,
    event_tx: &mpsc::Sender<EndpointEvent>,
) -> Result<(), EndpointError> {
    while let Some(action) = actions.pop_front() {
        match action {
            EndpointAction::SendSignal(msg) => send_signal(sink, &msg).await?,
            EndpointAction::CreateOffer => {
                let offer = transport.create_offer().await?;
                actions.extend(machine.on_offer_created(offer));
            }
            EndpointAction::AcceptAnswer(answer) => transport.accept_answer(answer).await?,
            EndpointAction::AddRemoteCandidate(candidate) => {
                // Best-effort, like the candidates themselves.
                if let Err(e) = transport.add_remote_candidate(candidate).await {
                    tracing::warn!(error = %e, "Failed to add remote candidate");
                }
            }
            EndpointAction::Emit(event) => {
                let _ = event_tx.send(event).await;
            }
            // Not produced by the initiator machine.
            EndpointAction::AcceptOffer(_) | EndpointAction::SendInput(_) => {}
        }
    }
    Ok(())
}

async fn apply_responder<T: PeerTransport>(
    machine: &mut ResponderMachine,
    mut actions: VecDeque<EndpointAction>,
    transport: &mut T,
    sink: &mut WsSink,
    event_tx: &mpsc::Sender<EndpointEvent>,
) -> Result<(), EndpointError> {
    while let Some(action) = actions.pop_front() {
        match action {
            EndpointAction::SendSignal(msg) => send_signal(sink, &msg).await?,
            EndpointAction::AcceptOffer(offer) => {
                let answer = transport.accept_offer(offer).await?;
                actions.extend(machine.on_answer_created(answer));
            }
            EndpointAction::AddRemoteCandidate(candidate) => {
                if let Err(e) = transport.add_remote_candidate(candidate).await {
                    tracing::warn!(error = %e, "Failed to add remote candidate");
                }
            }
            EndpointAction::SendInput(payload) => {
                if let Err(e) = transport.send_input(payload).await {
                    tracing::warn!(error = %e, "Failed to send input");
                }
            }
            EndpointAction::Emit(event) => {
                let _ = event_tx.send(event).await;
            }
            // Not produced by the responder machine.
            EndpointAction::CreateOffer | EndpointAction::AcceptAnswer(_) => {}
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// WebSocket plumbing
// ---------------------------------------------------------------------------

enum FrameResult {
    Signal(SignalingMessage),
    Ping(tokio_tungstenite::tungstenite::Bytes),
    Closed,
    Ignored,
}

fn read_frame(
    frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
) -> FrameResult {
    match frame {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<SignalingMessage>(&text) {
            Ok(msg) => FrameResult::Signal(msg),
            Err(e) => {
                tracing::debug!(error = %e, "Malformed frame from relay");
                FrameResult::Ignored
            }
        },
        Some(Ok(Message::Ping(data))) => FrameResult::Ping(data),
        Some(Ok(Message::Close(_))) | None => FrameResult::Closed,
        Some(Err(e)) => {
            tracing::debug!(error = %e, "WS error");
            FrameResult::Closed
        }
        _ => FrameResult::Ignored,
    }
}

async fn send_signal(sink: &mut WsSink, msg: &SignalingMessage) -> Result<(), EndpointError> {
    let frame = serde_json::to_string(msg).unwrap();
    sink.send(Message::Text(frame.into()))
        .await
        .map_err(|e| EndpointError::Signaling(e.to_string()))
}

async fn connect_relay(config: &EndpointConfig) -> Result<WsStream, EndpointError> {
    tracing::info!(url = %config.relay_url, "Connecting to relay...");
    match tokio::time::timeout(
        Duration::from_secs(config.connect_timeout_secs),
        connect_async(&config.relay_url),
    )
    .await
    {
        Ok(Ok((ws, _))) => Ok(ws),
        Ok(Err(e)) => Err(EndpointError::SignalingConnect(e.to_string())),
        Err(_) => Err(EndpointError::SignalingConnect(format!(
            "timeout after {}s",
            config.connect_timeout_secs
        ))),
    }
}

async fn emit_all(event_tx: &mpsc::Sender<EndpointEvent>, actions: Vec<EndpointAction>) {
    for action in actions {
        if let EndpointAction::Emit(event) = action {
            let _ = event_tx.send(event).await;
        }
    }
}
