use cipherbus_core::PipelineError;
use cipherbus_routing::RoutingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    /// Publish or subscribe against a channel that was never declared.
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error(transparent)]
    Pattern(#[from] RoutingError),

    /// A subscriber queue had no room for a non-blocking publish.
    #[error("subscriber queue full for {0}")]
    Full(String),

    #[error("bus is shut down")]
    Closed,
}

impl From<BusError> for PipelineError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::ChannelNotFound(name) => PipelineError::ChannelNotFound(name),
            BusError::Pattern(e) => e.into(),
            BusError::Full(key) => {
                PipelineError::Other(anyhow::anyhow!("subscriber queue full for {key}"))
            }
            BusError::Closed => PipelineError::Other(anyhow::anyhow!("bus is shut down")),
        }
    }
}
