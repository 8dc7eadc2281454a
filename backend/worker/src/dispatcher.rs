//! Job dispatcher.
//!
//! Each job message moves `RECEIVED → VALIDATED → DISPATCHED → SUCCEEDED | FAILED`.
//! Every job whose key names a session and artifact gets exactly one result
//! message. Keys too malformed to address are logged and dropped.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use cipherbus_bus::{Delivery, MessageHandler, TopicBus};
use cipherbus_core::{
    JobDescriptor, JobLifecycle, JobPayload, JobResult, JobStage, PipelineError,
};
use cipherbus_logging::EventLogger;
use cipherbus_routing::{decode_job_key, reply_address, JobKey, RoutingKey};
use cipherbus_storage::{StorageClient, StoredImage};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::artifacts;
use crate::compute::{ComputeInvocation, ComputeRunner};

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Channel results are published on.
    pub exchange: String,
    pub work_dir: PathBuf,
    /// Jobs running at once in this dispatcher.
    pub max_concurrent_jobs: usize,
    pub keep_artifacts: bool,
}

/// How one job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded {
        result_key: String,
        artifact: String,
    },
    /// `result_key` is `None` when the job key was unaddressable and nothing was published.
    Failed {
        result_key: Option<String>,
        reason: String,
    },
}

#[derive(Clone)]
pub struct Dispatcher {
    bus: Arc<dyn TopicBus>,
    runner: Arc<dyn ComputeRunner>,
    storage: Option<Arc<dyn StorageClient>>,
    settings: Arc<DispatcherSettings>,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        bus: Arc<dyn TopicBus>,
        runner: Arc<dyn ComputeRunner>,
        storage: Option<Arc<dyn StorageClient>>,
        settings: DispatcherSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_jobs.max(1)));
        Self {
            bus,
            runner,
            storage,
            settings: Arc::new(settings),
            permits,
        }
    }

    /// Drive one job message to a terminal stage.
    pub async fn process(&self, delivery: &Delivery) -> JobOutcome {
        let mut lifecycle = JobLifecycle::received(&delivery.routing_key);
        if let Some(event) = lifecycle.history().first() {
            EventLogger::log_job_event(event);
        }

        let job = match validate(delivery) {
            Ok(job) => job,
            Err(e) => return self.fail(&mut lifecycle, &delivery.routing_key, e).await,
        };
        record(&mut lifecycle, JobStage::Validated, json!(null));

        let input = match artifacts::input_path(
            &self.settings.work_dir,
            &job.session_id,
            lifecycle.job_id(),
            &job.artifact_name,
        ) {
            Ok(path) => path,
            Err(e) => return self.fail(&mut lifecycle, &delivery.routing_key, e).await,
        };
        let invocation = ComputeInvocation {
            artifact_path: input.clone(),
            operation: job.operation,
            mode: job.mode,
            crypto_key: job.crypto_key.clone(),
        };

        let result = self.execute(&mut lifecycle, &job, &invocation).await;
        if !self.settings.keep_artifacts {
            artifacts::cleanup(&input).await;
        }

        match result {
            Ok(artifact) => self.succeed(&mut lifecycle, &job, artifact).await,
            Err(e) => self.fail(&mut lifecycle, &delivery.routing_key, e).await,
        }
    }

    /// Write the input, run the program, hand the output to storage.
    /// Returns the final artifact name.
    async fn execute(
        &self,
        lifecycle: &mut JobLifecycle,
        job: &JobDescriptor,
        invocation: &ComputeInvocation,
    ) -> Result<String, PipelineError> {
        artifacts::write_input(&invocation.artifact_path, &job.payload).await?;
        record(
            lifecycle,
            JobStage::Dispatched,
            json!({ "input": invocation.artifact_path.display().to_string() }),
        );

        let result = self.runner.run(invocation).await?;
        if !result.is_success() {
            return Err(PipelineError::process(
                result
                    .error_message
                    .unwrap_or_else(|| format!("compute exited with code {}", result.exit_code)),
            ));
        }

        let output = result
            .output_artifact_path
            .unwrap_or_else(|| invocation.expected_output());
        let bytes = artifacts::read_output(&output).await?;
        let artifact = artifacts::output_file_name(&job.artifact_name, job.operation);

        self.store(job, &artifact, &bytes).await;
        Ok(artifact)
    }

    /// Upload failures are logged only; the client is told about completion anyway.
    async fn store(&self, job: &JobDescriptor, artifact: &str, bytes: &[u8]) {
        let Some(storage) = &self.storage else {
            debug!(artifact, "Storage disabled, skipping upload");
            return;
        };
        let image = StoredImage {
            user_id: job.session_id.clone(),
            operation: job.operation,
            mode: job.mode,
            image_name: artifact.to_string(),
            img_base64: STANDARD.encode(bytes),
        };
        if let Err(e) = storage.store(&image).await {
            let err = PipelineError::from(e);
            warn!(session_id = %job.session_id, artifact, error = %err, "Artifact not persisted");
        }
    }

    async fn succeed(
        &self,
        lifecycle: &mut JobLifecycle,
        job: &JobDescriptor,
        artifact: String,
    ) -> JobOutcome {
        record(lifecycle, JobStage::Succeeded, json!({ "artifact": artifact }));
        let key = match JobKey::from(job).result_key() {
            Ok(key) => key,
            Err(e) => {
                error!(error = %e, "Cannot address result of a validated job");
                return JobOutcome::Failed {
                    result_key: None,
                    reason: e.to_string(),
                };
            }
        };
        self.publish_result(&key, &JobResult::Success(artifact.clone()))
            .await;
        info!(result_key = %key, %artifact, "Job succeeded");
        JobOutcome::Succeeded {
            result_key: key.as_str().to_string(),
            artifact,
        }
    }

    async fn fail(
        &self,
        lifecycle: &mut JobLifecycle,
        routing_key: &str,
        err: PipelineError,
    ) -> JobOutcome {
        let reason = err.to_string();
        record(lifecycle, JobStage::Failed, json!(reason));

        let Some(key) = reply_address(routing_key).and_then(|r| r.encode().ok()) else {
            warn!(routing_key, %reason, "Unaddressable job dropped without a result");
            return JobOutcome::Failed {
                result_key: None,
                reason,
            };
        };
        self.publish_result(&key, &JobResult::Error(reason.clone()))
            .await;
        if err.is_job_local() {
            warn!(routing_key, result_key = %key, %reason, "Job failed");
        } else {
            error!(routing_key, result_key = %key, %reason, "Job failed on a bus error");
        }
        JobOutcome::Failed {
            result_key: Some(key.as_str().to_string()),
            reason,
        }
    }

    async fn publish_result(&self, key: &RoutingKey, result: &JobResult) {
        let payload = match result.to_bytes() {
            Ok(p) => p,
            Err(e) => {
                error!(result_key = %key, error = %e, "Cannot encode result");
                return;
            }
        };
        match self
            .bus
            .publish(&self.settings.exchange, key.as_str(), Bytes::from(payload))
            .await
        {
            Ok(receipt) if !receipt.is_routed() => {
                warn!(result_key = %key, "Result published but no notifier is bound");
            }
            Ok(_) => debug!(result_key = %key, status = result.status(), "Result published"),
            Err(e) => error!(result_key = %key, error = %e, "Failed to publish result"),
        }
    }
}

/// Decode key and payload into a checked descriptor.
fn validate(delivery: &Delivery) -> Result<JobDescriptor, PipelineError> {
    let key = decode_job_key(&delivery.routing_key)?;
    let payload = JobPayload::from_bytes(&delivery.payload)?;
    let job = JobDescriptor {
        session_id: key.session_id,
        operation: key.operation,
        mode: key.mode,
        artifact_name: key.artifact_name,
        payload: payload.image_bytes()?,
        crypto_key: payload.crypto_key,
    };
    job.validate()?;
    Ok(job)
}

fn record(lifecycle: &mut JobLifecycle, stage: JobStage, detail: serde_json::Value) {
    match lifecycle.advance(stage, detail) {
        Ok(event) => {
            EventLogger::log_job_event(&event);
        }
        Err(e) => error!(error = %e, "Job lifecycle violated"),
    }
}

/// Each delivery runs on its own task once a permit is free, so a slow job never
/// holds up the subscription.
#[async_trait]
impl MessageHandler for Dispatcher {
    fn name(&self) -> &str {
        "dispatcher"
    }

    async fn handle(&self, delivery: Delivery) -> anyhow::Result<()> {
        let permit = self.permits.clone().acquire_owned().await?;
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let _permit = permit;
            dispatcher.process(&delivery).await;
        });
        Ok(())
    }
}
