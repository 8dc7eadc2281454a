//! WebSocket entrypoint and connection handler.
//!
//! Each connection gets a bounded outbound queue. The registry sees only a weak
//! handle to it, and every session bound by the connection is unbound when it closes.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::server::GatewayState;
use crate::session_registry::{ConnectionId, PushSender, SessionRegistry};
use crate::ws_protocol::{ControlCommand, ControlFrame, PushFrame};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: GatewayState) {
    let connection = ConnectionId::new();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<PushFrame>(state.outbound_buffer);
    info!(%connection, "WebSocket connection opened");

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.to_text())).await.is_err() {
                break;
            }
        }
    });

    let registry = state.registry.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_control_text(&text, connection, &tx, &registry).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    let removed = state.registry.unbind(connection).await;
    info!(%connection, unbound_sessions = removed, "WebSocket connection closed");
}

/// Apply one inbound text frame. Returns the session id if the frame bound one.
pub(crate) async fn handle_control_text(
    text: &str,
    connection: ConnectionId,
    tx: &PushSender,
    registry: &SessionRegistry,
) -> Option<String> {
    let Some(frame) = ControlFrame::parse(text) else {
        warn!(%connection, "Ignoring non-JSON control frame");
        return None;
    };
    match frame.command() {
        Some(ControlCommand::BindSession(session_id)) => {
            registry.bind(session_id.clone(), connection, tx).await;
            Some(session_id)
        }
        None => {
            debug!(%connection, action = %frame.action, "Ignoring control frame");
            None
        }
    }
}
