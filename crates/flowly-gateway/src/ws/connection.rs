use axum::{
    extract::{ws::Message, ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
};
use flowly_hub::{connection, Frame};
use futures_util::{future, SinkExt, StreamExt};
use std::sync::Arc;

use crate::app::AppState;

/// Axum handler: upgrades HTTP to WebSocket at GET /traffic.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| run_connection(socket, state))
}

/// Per-viewer lifetime: frames out as text messages, anything inbound only
/// keeps the read side alive until the viewer goes away.
async fn run_connection(socket: WebSocket, state: Arc<AppState>) {
    let (tx, rx) = socket.split();
    let sink = tx.with(|frame: Frame| {
        future::ready(Ok::<_, axum::Error>(Message::Text(frame.to_string().into())))
    });

    connection::serve(&state.hub, sink, rx, state.config.hub.queue_capacity).await;
}
