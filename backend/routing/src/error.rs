use cipherbus_core::PipelineError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// Wrong arity, wrong direction, or empty segments.
    #[error("invalid routing key '{key}': {reason}")]
    InvalidRoutingKey { key: String, reason: String },

    /// A value cannot be used as a key segment.
    #[error("invalid segment '{segment}': {reason}")]
    InvalidSegment { segment: String, reason: String },

    /// The key has the right shape but a segment does not parse.
    #[error("invalid {field} '{value}' in routing key")]
    InvalidField { field: &'static str, value: String },

    #[error("invalid topic pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl RoutingError {
    pub(crate) fn key(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRoutingKey {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn segment(segment: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSegment {
            segment: segment.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<RoutingError> for PipelineError {
    fn from(err: RoutingError) -> Self {
        PipelineError::Validation(err.to_string())
    }
}
