//! Job submission endpoint.
//!
//! `POST /api/submit-job` validates the body, records a pending hint, publishes the
//! encoded job and acknowledges without waiting for the result.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use bytes::Bytes;
use cipherbus_core::{
    JobDescriptor, JobPayload, Mode, Operation, PendingJob, PipelineError, decode_image_data,
    strip_extension,
};
use cipherbus_logging::{EventLogger, PipelineEvent};
use cipherbus_routing::encode_job_key;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::server::GatewayState;

/// Submission body. Field aliases accept the names older clients send.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitJobRequest {
    #[serde(alias = "userId")]
    pub session_id: String,
    #[serde(alias = "imageName")]
    pub artifact_name: String,
    #[serde(alias = "base64Image")]
    pub image_data: String,
    pub operation: String,
    pub mode: String,
    #[serde(alias = "key")]
    pub crypto_key: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitJobResponse {
    pub status: String,
}

impl SubmitJobRequest {
    /// Check required fields and turn the body into a validated descriptor.
    pub fn into_descriptor(self) -> Result<JobDescriptor, PipelineError> {
        for (field, value) in [
            ("sessionId", &self.session_id),
            ("artifactName", &self.artifact_name),
            ("imageData", &self.image_data),
            ("operation", &self.operation),
            ("mode", &self.mode),
            ("cryptoKey", &self.crypto_key),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::validation(format!("{field} is required")));
            }
        }

        let descriptor = JobDescriptor {
            operation: self.operation.parse::<Operation>()?,
            mode: self.mode.parse::<Mode>()?,
            artifact_name: strip_extension(&self.artifact_name).to_string(),
            payload: decode_image_data(&self.image_data)?,
            session_id: self.session_id,
            crypto_key: self.crypto_key,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}

/// Handler for `POST /api/submit-job`
pub async fn submit_job(
    State(state): State<GatewayState>,
    body: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> Result<Json<SubmitJobResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let descriptor = request.into_descriptor().inspect_err(|e| {
        warn!(error = %e, "Rejected job submission");
    })?;
    publish_job(&state, &descriptor).await?;
    Ok(Json(SubmitJobResponse {
        status: "success".to_string(),
    }))
}

/// Encode and publish one job. The pending hint is dropped again if the bus refuses it.
///
/// Never waits on a busy dispatcher: a full job queue is refused with 503 instead.
pub async fn publish_job(state: &GatewayState, job: &JobDescriptor) -> Result<(), ApiError> {
    let key = encode_job_key(job).map_err(PipelineError::from)?;
    let payload = JobPayload::new(job.crypto_key.clone(), &job.payload).to_bytes()?;
    let payload_bytes = payload.len();

    state.pending.record(PendingJob::from(job)).await;

    let receipt = match state
        .bus
        .try_publish(&state.exchange, key.as_str(), Bytes::from(payload))
        .await
    {
        Ok(receipt) => receipt,
        Err(e) => {
            state.pending.complete(&job.session_id, &job.artifact_name).await;
            return Err(e.into());
        }
    };

    EventLogger::log_event(PipelineEvent::JobPublished {
        routing_key: key.as_str().to_string(),
        payload_bytes,
        deliveries: receipt.deliveries,
    });
    if receipt.is_routed() {
        info!(routing_key = %key, job = ?job, "Job published");
    } else {
        warn!(routing_key = %key, "Job published but no dispatcher is bound");
    }
    Ok(())
}
