use crate::session::{ControlRequest, ViewerRegistry};
use crate::types::ClientMessage;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: ViewerRegistry,
    pub control: mpsc::Sender<ControlRequest>,
}

/// Handle WebSocket upgrade
pub async fn handle_websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Drive one viewer connection: forward broker messages out, route control
/// requests in. Malformed viewer messages are ignored without closing the
/// connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (viewer_id, mut outbound) = state.registry.register();
    info!("viewer {} connected", viewer_id);

    if state
        .control
        .send(ControlRequest::Connected { viewer: viewer_id })
        .await
        .is_err()
    {
        warn!("session broker unavailable, closing viewer {}", viewer_id);
        state.registry.remove(&viewer_id);
        return;
    }

    loop {
        tokio::select! {
            message = outbound.recv() => {
                let Some(message) = message else { break };
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("failed to serialize message for viewer {}: {}", viewer_id, e);
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::Text(json.into())).await {
                    debug!("send to viewer {} failed: {}", viewer_id, e);
                    break;
                }
            }
            incoming = receiver.next() => {
                let Some(Ok(message)) = incoming else { break };
                match message {
                    Message::Text(text) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Reset) => {
                                if state.control
                                    .send(ControlRequest::Reset { viewer: viewer_id })
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Ok(ClientMessage::StartAutoDetect) => {
                                if state.control
                                    .send(ControlRequest::StartAutoDetect { viewer: viewer_id })
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Err(_) => {
                                debug!("ignoring malformed message from viewer {}", viewer_id);
                            }
                        }
                    }
                    Message::Ping(data) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    state.registry.remove(&viewer_id);
    info!(
        "viewer {} disconnected ({} remaining)",
        viewer_id,
        state.registry.viewer_count()
    );
}
