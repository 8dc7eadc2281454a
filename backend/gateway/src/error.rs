//! HTTP error mapping for gateway handlers.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cipherbus_bus::BusError;
use cipherbus_core::PipelineError;
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    /// 400: malformed submission.
    BadRequest(String),
    /// 503: the bus could not take the job.
    Unavailable(String),
    Internal(String),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(msg) => Self::BadRequest(msg),
            PipelineError::ChannelNotFound(_) => Self::Unavailable(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<BusError> for ApiError {
    fn from(err: BusError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::Unavailable(m) => {
                error!(error = %m, "Bus unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, m)
            }
            Self::Internal(m) => {
                error!(error = %m, "Internal gateway error");
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(json!({ "status": "error", "message": message }))).into_response()
    }
}
