//! Call WebSocket handler
//!
//! Each connection owns one [`Session`]. Inbound binary frames feed the
//! session's segmenter directly on this task. Session events go through a
//! separate forwarder task to the sender task that owns the socket's write
//! half, so a slow client never holds up inbound audio.

use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::core::events::SessionEvent;
use crate::core::session::Session;
use crate::errors::TransportError;
use crate::middleware::ClientIp;
use crate::state::AppState;

use super::messages::{CallIncomingMessage, CallMessageRoute, CallOutgoingMessage};

/// Buffer between the session and the socket writer
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Session events awaiting forwarding
const EVENT_BUFFER_SIZE: usize = 256;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Upgrade `GET /call` to a call session
pub async fn call_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    client_ip: Option<Extension<ClientIp>>,
) -> Response {
    let client_ip = client_ip.map(|Extension(ip)| ip);
    debug!(ip = ?client_ip, "Call WebSocket upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_call_socket(socket, state, client_ip))
}

async fn handle_call_socket(socket: WebSocket, app_state: Arc<AppState>, client_ip: Option<ClientIp>) {
    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<CallMessageRoute>(CHANNEL_BUFFER_SIZE);
    let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(EVENT_BUFFER_SIZE);

    let sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let should_close = matches!(route, CallMessageRoute::Close);

            let result = match route {
                CallMessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                CallMessageRoute::Audio(data) => sender.send(Message::Binary(data)).await,
                CallMessageRoute::Close => sender.send(Message::Close(None)).await,
            };

            if let Err(e) = result {
                let e = TransportError::WebSocket(e.to_string());
                debug!("Stopping call sender: {}", e);
                break;
            }

            if should_close {
                break;
            }
        }
    });

    let session_id = Uuid::new_v4().to_string();
    let settings = app_state.session_settings();
    let inbound_sample_rate = settings.inbound_format().sample_rate;
    let outbound_sample_rate = settings.outbound_format.sample_rate;
    let mut session = Session::new(
        session_id.clone(),
        settings,
        app_state.collaborators.clone(),
        event_tx,
    );
    let cancel = session.cancel_token();
    app_state.sessions.register(session.handle());

    info!(session_id = %session_id, ip = ?client_ip, "Call session established");

    let _ = message_tx
        .send(CallMessageRoute::Outgoing(CallOutgoingMessage::SessionCreated {
            session_id: session_id.clone(),
            inbound_sample_rate,
            outbound_sample_rate,
        }))
        .await;

    let forward_stop = CancellationToken::new();
    let forwarder = tokio::spawn(forward_events(
        session_id.clone(),
        event_rx,
        message_tx.clone(),
        cancel.clone(),
        forward_stop.clone(),
    ));

    loop {
        select! {
            _ = cancel.cancelled() => {
                info!(session_id = %session_id, "Call session cancelled by server");
                break;
            }
            msg_result = receiver.next() => {
                match msg_result {
                    Some(Ok(msg)) => {
                        if !process_call_message(msg, &mut session) {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, "Call WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(session_id = %session_id, "Call WebSocket closed by client");
                        break;
                    }
                }
            }
        }
    }

    session.close().await;
    app_state.sessions.remove(&session_id);
    if let Some(ClientIp(ip)) = client_ip {
        app_state.release_connection(ip);
    }

    forward_stop.cancel();
    if let Err(e) = forwarder.await {
        warn!(session_id = %session_id, "Call event forwarder failed: {}", e);
    }
    let _ = message_tx.send(CallMessageRoute::Close).await;
    drop(message_tx);
    if let Err(e) = sender_task.await {
        warn!(session_id = %session_id, "Call sender task failed: {}", e);
    }

    info!(session_id = %session_id, "Call session terminated");
}

/// Move session events to the socket writer until `stop` fires.
///
/// Cancels the session if the writer has gone away.
async fn forward_events(
    session_id: String,
    mut events: mpsc::Receiver<SessionEvent>,
    messages: mpsc::Sender<CallMessageRoute>,
    session_cancel: CancellationToken,
    stop: CancellationToken,
) {
    loop {
        let event = select! {
            biased;
            _ = stop.cancelled() => break,
            next = events.recv() => match next {
                Some(event) => event,
                None => return,
            },
        };
        let sent = select! {
            biased;
            _ = stop.cancelled() => break,
            sent = messages.send(CallMessageRoute::from(event)) => sent,
        };
        if sent.is_err() {
            debug!(session_id = %session_id, "{}", TransportError::Closed);
            session_cancel.cancel();
            return;
        }
    }

    // Anything emitted before close still reaches the caller if there is room
    while let Ok(event) = events.try_recv() {
        if messages.try_send(CallMessageRoute::from(event)).is_err() {
            break;
        }
    }
}

/// Apply one inbound message to the session. Returns `false` to end the call.
fn process_call_message(msg: Message, session: &mut Session) -> bool {
    match msg {
        Message::Binary(data) => {
            trace!(session_id = %session.id(), bytes = data.len(), "Inbound audio");
            session.ingest_audio(&data);
            true
        }
        Message::Text(text) => {
            let incoming: CallIncomingMessage = match serde_json::from_str(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(session_id = %session.id(), "Dropping malformed call message: {}", e);
                    return true;
                }
            };
            match incoming {
                CallIncomingMessage::EndUtterance => {
                    session.end_utterance();
                    true
                }
                CallIncomingMessage::Interrupt => {
                    session.interrupt();
                    true
                }
                CallIncomingMessage::Stop => {
                    info!(session_id = %session.id(), "Call stop requested");
                    false
                }
            }
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            debug!(session_id = %session.id(), "Call WebSocket close received");
            false
        }
    }
}
