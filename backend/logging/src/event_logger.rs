//! Pipeline Event Logger
//!
//! Structured job lifecycle and notification events, emitted under the
//! `pipeline_events` target so they can be routed to the NDJSON file.

use chrono::{DateTime, Utc};
use cipherbus_core::{JobEvent, JobStage};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    JobPublished {
        routing_key: String,
        payload_bytes: usize,
        deliveries: usize,
    },
    JobStage {
        job_id: String,
        routing_key: String,
        stage: JobStage,
        detail: String,
    },
    NotificationDelivered {
        routing_key: String,
        status: String,
    },
    NotificationDropped {
        routing_key: String,
        reason: String,
    },
}

impl From<&JobEvent> for PipelineEvent {
    fn from(event: &JobEvent) -> Self {
        let detail = match &event.detail {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self::JobStage {
            job_id: event.job_id.to_string(),
            routing_key: event.routing_key.clone(),
            stage: event.stage,
            detail,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventLogEntry {
    pub timestamp: DateTime<Utc>,
    pub event: PipelineEvent,
}

pub struct EventLogger;

impl EventLogger {
    /// Logs a pipeline event, scrubbing free-text fields first.
    pub fn log_event(mut event: PipelineEvent) -> EventLogEntry {
        match &mut event {
            PipelineEvent::JobStage { detail, .. } => {
                *detail = redact_sensitive_data(detail);
            }
            PipelineEvent::NotificationDropped { reason, .. } => {
                *reason = redact_sensitive_data(reason);
            }
            PipelineEvent::JobPublished { .. } | PipelineEvent::NotificationDelivered { .. } => {}
        }

        let entry = EventLogEntry {
            timestamp: Utc::now(),
            event,
        };

        info!(target: "pipeline_events", event = ?entry, "Pipeline event");
        entry
    }

    pub fn log_job_event(event: &JobEvent) -> EventLogEntry {
        Self::log_event(PipelineEvent::from(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipherbus_core::JobLifecycle;

    fn failed_with(detail: serde_json::Value) -> JobEvent {
        let mut job = JobLifecycle::received("send.u1.encrypt.CBC.photo");
        job.advance(JobStage::Failed, detail).unwrap()
    }

    #[test]
    fn job_events_carry_stage_and_routing_key() {
        let event = failed_with(serde_json::json!("exit code 2"));
        let entry = EventLogger::log_job_event(&event);
        match entry.event {
            PipelineEvent::JobStage {
                routing_key,
                stage,
                detail,
                ..
            } => {
                assert_eq!(routing_key, "send.u1.encrypt.CBC.photo");
                assert_eq!(stage, JobStage::Failed);
                assert_eq!(detail, "exit code 2");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn details_are_redacted() {
        let event = failed_with(serde_json::json!({"cryptoKey": "0123456789abcdef"}));
        let entry = EventLogger::log_job_event(&event);
        let rendered = serde_json::to_string(&entry).unwrap();
        assert!(!rendered.contains("0123456789abcdef"));
    }
}
