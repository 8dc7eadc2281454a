use thiserror::Error;

/// Top-level error type for the cipherbus pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed submission or routing key. Rejected before any side effect.
    #[error("validation error: {0}")]
    Validation(String),

    /// The bus has no channel with this name.
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    /// The external compute step failed, timed out, or could not be launched.
    #[error("process failure: {0}")]
    ProcessFailure(String),

    /// A result arrived for a session with no live channel.
    #[error("session not bound: {0}")]
    SessionNotBound(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn process(message: impl Into<String>) -> Self {
        Self::ProcessFailure(message.into())
    }

    /// Whether this error is local to one job. Only bus-level errors take the process down.
    pub fn is_job_local(&self) -> bool {
        !matches!(self, Self::ChannelNotFound(_))
    }
}
