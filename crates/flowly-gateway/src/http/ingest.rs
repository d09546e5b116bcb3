//! Frame injection endpoint: POST /traffic
//!
//! The body must already be a complete broadcast frame, e.g.
//! `{"type":"traffic","pings":[...]}`. It is validated and then forwarded
//! to every viewer byte for byte.

use axum::{body::Bytes, extract::State, http::StatusCode};
use flowly_hub::{Broadcaster, Frame};
use flowly_protocol::Message;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::app::AppState;

/// POST /traffic: 204 on success, 400 with the parse error otherwise.
pub async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, (StatusCode, String)> {
    let (text, message) = Message::decode_text(&body).map_err(|e| {
        warn!(error = %e, bytes = body.len(), "rejected posted frame");
        (StatusCode::BAD_REQUEST, e.to_string())
    })?;

    debug!(kind = message.kind(), bytes = body.len(), "frame posted");
    state.hub.broadcast_raw(Frame::from(text)).await;
    Ok(StatusCode::NO_CONTENT)
}
