use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;

/// An immutable record of one job lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub id: Uuid,
    pub job_id: Uuid,
    pub routing_key: String,
    pub timestamp: DateTime<Utc>,
    pub stage: JobStage,
    pub detail: serde_json::Value,
}

/// Stages a job message passes through inside a dispatcher.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    /// The message was delivered by the bus
    Received,
    /// The routing key and payload decoded cleanly
    Validated,
    /// The external process was launched
    Dispatched,
    /// The process exited 0 and a success result went out
    Succeeded,
    /// Any failure; a failure result went out if the key was addressable
    Failed,
}

impl JobStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// `RECEIVED → VALIDATED → DISPATCHED → SUCCEEDED`, with `FAILED` reachable from any
    /// non-terminal stage.
    pub fn can_advance_to(&self, next: JobStage) -> bool {
        use JobStage::*;
        matches!(
            (*self, next),
            (Received, Validated)
                | (Validated, Dispatched)
                | (Dispatched, Succeeded)
                | (Received | Validated | Dispatched, Failed)
        )
    }
}

impl JobEvent {
    pub fn new(
        job_id: Uuid,
        routing_key: impl Into<String>,
        stage: JobStage,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            routing_key: routing_key.into(),
            timestamp: Utc::now(),
            stage,
            detail,
        }
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| format!("{:?}", self));
        write!(f, "{}", s)
    }
}

/// Tracks one job through its stages and records every transition.
#[derive(Debug)]
pub struct JobLifecycle {
    job_id: Uuid,
    routing_key: String,
    stage: JobStage,
    history: Vec<JobEvent>,
}

impl JobLifecycle {
    /// Starts in `Received`.
    pub fn received(routing_key: impl Into<String>) -> Self {
        let routing_key = routing_key.into();
        let job_id = Uuid::new_v4();
        let first = JobEvent::new(job_id, &routing_key, JobStage::Received, serde_json::Value::Null);
        Self {
            job_id,
            routing_key,
            stage: JobStage::Received,
            history: vec![first],
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn stage(&self) -> JobStage {
        self.stage
    }

    pub fn history(&self) -> &[JobEvent] {
        &self.history
    }

    /// Move to `next`, returning the recorded event.
    pub fn advance(
        &mut self,
        next: JobStage,
        detail: serde_json::Value,
    ) -> Result<JobEvent, PipelineError> {
        if !self.stage.can_advance_to(next) {
            return Err(PipelineError::Other(anyhow::anyhow!(
                "illegal job transition {} -> {} for {}",
                self.stage,
                next,
                self.routing_key
            )));
        }
        self.stage = next;
        let event = JobEvent::new(self.job_id, &self.routing_key, next, detail);
        self.history.push(event.clone());
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let job_id = Uuid::new_v4();
        let event = JobEvent::new(
            job_id,
            "send.u1.encrypt.CBC.photo",
            JobStage::Received,
            serde_json::json!({"bytes": 10}),
        );
        assert_eq!(event.job_id, job_id);
        assert_eq!(event.stage, JobStage::Received);
    }

    #[test]
    fn test_event_serialization() {
        let event = JobEvent::new(
            Uuid::new_v4(),
            "send.u1.encrypt.CBC.photo",
            JobStage::Dispatched,
            serde_json::json!({"cipher": "aes-128-cbc"}),
        );
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: JobEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.stage, JobStage::Dispatched);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(JobStage::Received.to_string(), "received");
        assert_eq!(JobStage::Succeeded.to_string(), "succeeded");
    }

    #[test]
    fn happy_path_transitions() {
        let mut job = JobLifecycle::received("send.u1.encrypt.CBC.photo");
        job.advance(JobStage::Validated, serde_json::Value::Null).unwrap();
        job.advance(JobStage::Dispatched, serde_json::Value::Null).unwrap();
        job.advance(JobStage::Succeeded, serde_json::Value::Null).unwrap();
        assert!(job.stage().is_terminal());
        assert_eq!(job.history().len(), 4);
    }

    #[test]
    fn failure_reachable_from_any_live_stage() {
        for stages in [
            vec![],
            vec![JobStage::Validated],
            vec![JobStage::Validated, JobStage::Dispatched],
        ] {
            let mut job = JobLifecycle::received("k");
            for s in stages {
                job.advance(s, serde_json::Value::Null).unwrap();
            }
            assert!(job.advance(JobStage::Failed, serde_json::Value::Null).is_ok());
        }
    }

    #[test]
    fn terminal_stages_are_final() {
        let mut job = JobLifecycle::received("k");
        job.advance(JobStage::Failed, serde_json::Value::Null).unwrap();
        assert!(job.advance(JobStage::Failed, serde_json::Value::Null).is_err());
        assert!(job.advance(JobStage::Validated, serde_json::Value::Null).is_err());
    }

    #[test]
    fn cannot_skip_dispatch() {
        let mut job = JobLifecycle::received("k");
        assert!(job.advance(JobStage::Succeeded, serde_json::Value::Null).is_err());
    }
}
