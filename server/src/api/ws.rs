use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::AppState;

/// GET /ws - upgrade to the stream wire protocol
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Bridge one WebSocket to one stream-manager connection: outbound frames
/// are serialized as text messages, inbound text frames are control
/// messages. Closing the socket closes the connection and every
/// subscription it owns.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4().to_string();
    let streams = state.monitor.streams().clone();
    let mut outbound = streams.create_connection(&connection_id);
    info!(connection_id = %connection_id, "websocket connected");

    let (mut sink, mut source) = socket.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(err) => {
                        debug!("failed to serialize frame: {}", err);
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = source.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => streams.handle_message(&connection_id, &text),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // pings are answered by axum; binary is ignored
                    Some(Err(err)) => {
                        debug!(connection_id = %connection_id, "websocket error: {}", err);
                        break;
                    }
                }
            }
        }
    }

    streams.close_connection(&connection_id);
    info!(connection_id = %connection_id, "websocket disconnected");
}
