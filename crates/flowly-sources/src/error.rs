use thiserror::Error;

/// Errors raised while consuming the external log.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Connecting, listing topics or opening the partition failed. Fatal at startup.
    #[error("could not connect to external log: {0}")]
    Connect(String),

    /// The feed returned an error for one fetch.
    #[error("error reading external log: {0}")]
    Source(String),

    /// One record did not match the configured schema.
    #[error("could not parse record: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unexpected record type '{0}'")]
    UnexpectedType(String),
}
