use thiserror::Error;

/// A frame that could not be encoded or decoded.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not valid UTF-8")]
    NotUtf8,
}

/// An `"ip:port"` token that does not parse.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("colon not found in address '{0}'")]
    MissingColon(String),

    #[error("empty ip in address '{0}'")]
    EmptyIp(String),

    #[error("invalid port '{port}' in address '{input}'")]
    InvalidPort { input: String, port: String },
}
