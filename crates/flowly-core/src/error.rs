use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowlyError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The external log could not be reached or opened at startup.
    #[error("External log error: {0}")]
    ExternalLog(String),
}

impl FlowlyError {
    /// Short error code string, used in log fields.
    pub fn code(&self) -> &'static str {
        match self {
            FlowlyError::Config(_) => "CONFIG_ERROR",
            FlowlyError::ExternalLog(_) => "EXTERNAL_LOG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowlyError>;
