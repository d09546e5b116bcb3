use flowly_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced to callers of the hub.
#[derive(Debug, Error)]
pub enum HubError {
    /// The message could not be serialized into a frame; nothing was sent.
    #[error("failed to encode message: {0}")]
    Encode(#[from] ProtocolError),

    /// The hub control loop is no longer running.
    #[error("broadcast hub has stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, HubError>;
