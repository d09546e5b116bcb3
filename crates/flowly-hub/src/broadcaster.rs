use async_trait::async_trait;
use flowly_protocol::{Message, ProtocolError};
use serde::Serialize;
use tracing::debug;

use crate::{error::Result, Frame};

/// The producer-facing side of the hub.
///
/// Producers (synthetic generator, log ingestion, HTTP posts) depend on this
/// trait instead of the hub itself, so they can be driven against a recording
/// fake in tests.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Submit one pre-encoded frame for fan-out to all current viewers.
    async fn broadcast_raw(&self, frame: Frame);

    /// Encode `message` as JSON and submit it.
    ///
    /// Fails without retry when encoding fails; the frame is not broadcast.
    async fn broadcast_object<T>(&self, message: &T) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let json = serde_json::to_string(message).map_err(ProtocolError::from)?;
        debug!(bytes = json.len(), "broadcasting object");
        self.broadcast_raw(Frame::from(json)).await;
        Ok(())
    }

    /// Encode a viewer [`Message`] and submit it.
    async fn broadcast_message(&self, message: &Message) -> Result<()> {
        let json = message.encode()?;
        debug!(kind = message.kind(), bytes = json.len(), "broadcasting message");
        self.broadcast_raw(Frame::from(json)).await;
        Ok(())
    }
}
