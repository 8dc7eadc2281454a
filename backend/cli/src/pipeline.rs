//! Wires gateway, bus, dispatchers and storage into one running pipeline.

use anyhow::{Context, Result};
use cipherbus_bus::{spawn_consumer, TopicBus};
use cipherbus_config::PipelineConfig;
use cipherbus_gateway::{GatewayState, PendingJobs, ResultNotifier};
use cipherbus_routing::TopicPattern;
use cipherbus_storage::{HttpStorageClient, StorageClient};
use cipherbus_worker::{ComputeRunner, Dispatcher, DispatcherSettings, ProcessRunner};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Subscriber group shared by every dispatcher replica.
pub const DISPATCHER_GROUP: &str = "dispatchers";

pub struct Pipeline {
    pub state: GatewayState,
    pub consumers: Vec<JoinHandle<()>>,
}

impl Pipeline {
    pub fn shutdown(self) {
        for consumer in self.consumers {
            consumer.abort();
        }
    }
}

/// Runner for the configured external program.
pub fn process_runner(config: &PipelineConfig) -> Arc<dyn ComputeRunner> {
    Arc::new(ProcessRunner::new(
        config.worker.program.clone(),
        config.worker.launcher_args.clone(),
        config.worker.timeout(),
    ))
}

/// HTTP storage client, or `None` when storage is disabled.
pub fn storage_client(config: &PipelineConfig) -> Result<Option<Arc<dyn StorageClient>>> {
    if !config.storage.enabled {
        return Ok(None);
    }
    let client = HttpStorageClient::new(&config.storage.url, config.storage.request_timeout())
        .context("Failed to build storage client")?;
    Ok(Some(Arc::new(client)))
}

/// Declare the exchange and start the notifier and every dispatcher replica.
///
/// Failing to declare or bind is fatal; nothing is started in that case.
pub async fn assemble(
    config: &PipelineConfig,
    bus: Arc<dyn TopicBus>,
    runner: Arc<dyn ComputeRunner>,
    storage: Option<Arc<dyn StorageClient>>,
) -> Result<Pipeline> {
    let exchange = config.bus.exchange.as_str();
    bus.declare_channel(exchange)
        .await
        .with_context(|| format!("Failed to declare exchange '{exchange}'"))?;

    let state = GatewayState::new(
        bus.clone(),
        exchange,
        PendingJobs::new(config.gateway.pending_job_capacity),
        config.gateway.outbound_buffer,
    );

    let results = bus
        .subscribe(exchange, TopicPattern::results().as_str())
        .await
        .context("Failed to bind result notifier")?;
    let notifier = ResultNotifier::new(
        state.registry.clone(),
        state.pending.clone(),
        config.gateway.ws_send_timeout(),
    );

    let replicas = config.worker.replicas.max(1);
    let mut job_subscriptions = Vec::with_capacity(replicas);
    for _ in 0..replicas {
        let subscription = bus
            .subscribe_group(exchange, TopicPattern::jobs().as_str(), DISPATCHER_GROUP)
            .await
            .context("Failed to bind dispatcher")?;
        job_subscriptions.push(subscription);
    }

    let mut consumers = vec![spawn_consumer(results, Arc::new(notifier))];
    for subscription in job_subscriptions {
        let dispatcher = Dispatcher::new(
            bus.clone(),
            runner.clone(),
            storage.clone(),
            DispatcherSettings {
                exchange: exchange.to_string(),
                work_dir: config.worker.work_dir.clone(),
                max_concurrent_jobs: config.worker.max_concurrent_jobs,
                keep_artifacts: config.worker.keep_artifacts,
            },
        );
        consumers.push(spawn_consumer(subscription, Arc::new(dispatcher)));
    }

    info!(
        exchange,
        replicas,
        storage = storage.is_some(),
        "Pipeline assembled"
    );
    Ok(Pipeline { state, consumers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use bytes::Bytes;
    use cipherbus_bus::InMemoryTopicBus;
    use cipherbus_core::{ComputeResult, JobPayload, JobResult, PipelineError};
    use cipherbus_gateway::{gateway_router, ConnectionId, PushFrame, PushStatus};
    use cipherbus_storage::{StorageError, StoredImage};
    use cipherbus_worker::ComputeInvocation;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::sync::{mpsc, Mutex};
    use tower::ServiceExt;

    struct FakeRunner {
        exit_code: i32,
        calls: Mutex<Vec<ComputeInvocation>>,
    }

    #[async_trait]
    impl ComputeRunner for FakeRunner {
        async fn run(&self, inv: &ComputeInvocation) -> Result<ComputeResult, PipelineError> {
            self.calls.lock().await.push(inv.clone());
            if self.exit_code != 0 {
                return Ok(ComputeResult::failure(
                    self.exit_code,
                    format!("compute exited with code {}", self.exit_code),
                ));
            }
            tokio::fs::write(inv.expected_output(), b"CIPHERTEXT")
                .await
                .map_err(|e| PipelineError::process(e.to_string()))?;
            Ok(ComputeResult::success(inv.expected_output()))
        }
    }

    #[derive(Default)]
    struct RecordingStorage {
        stored: Mutex<Vec<StoredImage>>,
    }

    #[async_trait]
    impl StorageClient for RecordingStorage {
        async fn store(&self, image: &StoredImage) -> Result<(), StorageError> {
            self.stored.lock().await.push(image.clone());
            Ok(())
        }
    }

    struct Fixture {
        pipeline: Pipeline,
        bus: InMemoryTopicBus,
        runner: Arc<FakeRunner>,
        storage: Arc<RecordingStorage>,
        work_dir: PathBuf,
    }

    async fn fixture(exit_code: i32) -> Fixture {
        let mut config = PipelineConfig::default();
        config.worker.work_dir =
            std::env::temp_dir().join(format!("cipherbus-e2e-{}", uuid::Uuid::new_v4()));
        config.worker.replicas = 2;
        let bus = InMemoryTopicBus::new();
        let runner = Arc::new(FakeRunner {
            exit_code,
            calls: Mutex::new(Vec::new()),
        });
        let storage = Arc::new(RecordingStorage::default());
        let pipeline = assemble(
            &config,
            Arc::new(bus.clone()),
            runner.clone(),
            Some(storage.clone() as Arc<dyn StorageClient>),
        )
        .await
        .unwrap();
        Fixture {
            pipeline,
            bus,
            runner,
            storage,
            work_dir: config.worker.work_dir,
        }
    }

    /// The registry only holds a weak sender, so the caller keeps `tx` alive.
    async fn bind(
        state: &GatewayState,
        session_id: &str,
    ) -> (mpsc::Sender<PushFrame>, mpsc::Receiver<PushFrame>) {
        let (tx, rx) = mpsc::channel(8);
        state.registry.bind(session_id, ConnectionId::new(), &tx).await;
        (tx, rx)
    }

    async fn submit(state: &GatewayState, body: serde_json::Value) -> StatusCode {
        let app = gateway_router(state.clone(), 1024 * 1024);
        let request = Request::builder()
            .method("POST")
            .uri("/api/submit-job")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        app.oneshot(request).await.unwrap().status()
    }

    fn photo_job() -> serde_json::Value {
        serde_json::json!({
            "sessionId": "u1",
            "artifactName": "photo.bmp",
            "operation": "encrypt",
            "mode": "CBC",
            "cryptoKey": "k",
            "imageData": STANDARD.encode(b"BM\x00\x01"),
        })
    }

    async fn next_frame(rx: &mut mpsc::Receiver<PushFrame>) -> PushFrame {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("push frame arrives")
            .expect("channel open")
    }

    #[tokio::test]
    async fn successful_job_reaches_the_bound_session() {
        let f = fixture(0).await;
        let (_tx, mut rx) = bind(&f.pipeline.state, "u1").await;

        assert_eq!(submit(&f.pipeline.state, photo_job()).await, StatusCode::OK);

        let frame = next_frame(&mut rx).await;
        assert_eq!(frame, PushFrame::success("photo_output.bin"));
        assert_eq!(frame.to_text(), "success,photo_output.bin");

        let calls = f.runner.calls.lock().await;
        assert_eq!(calls.len(), 1);
        let input = &calls[0].artifact_path;
        assert_eq!(input.file_name().unwrap(), "photo.bmp");
        assert!(input.starts_with(f.work_dir.join("u1")));
        assert_eq!(f.storage.stored.lock().await.len(), 1);
        assert!(f.pipeline.state.pending.is_empty().await);

        let _ = std::fs::remove_dir_all(&f.work_dir);
        f.pipeline.shutdown();
    }

    #[tokio::test]
    async fn failed_compute_pushes_error_and_skips_storage() {
        let f = fixture(2).await;
        let (_tx, mut rx) = bind(&f.pipeline.state, "u1").await;

        assert_eq!(submit(&f.pipeline.state, photo_job()).await, StatusCode::OK);

        let frame = next_frame(&mut rx).await;
        assert_eq!(frame.status, PushStatus::Error);
        assert!(frame.data.contains("code 2"));
        assert!(f.storage.stored.lock().await.is_empty());

        let _ = std::fs::remove_dir_all(&f.work_dir);
        f.pipeline.shutdown();
    }

    #[tokio::test]
    async fn result_for_unbound_session_is_dropped_quietly() {
        let f = fixture(0).await;
        let (_tx, mut bound) = bind(&f.pipeline.state, "u1").await;

        let payload = JobResult::Success("photo_output.bin".into()).to_bytes().unwrap();
        let receipt = f
            .bus
            .publish("pictures", "receive.u2.photo", Bytes::from(payload))
            .await
            .unwrap();
        assert_eq!(receipt.deliveries, 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(bound.try_recv().is_err(), "other sessions see nothing");
        assert!(f.pipeline.consumers.iter().all(|c| !c.is_finished()));
        f.pipeline.shutdown();
    }

    #[tokio::test]
    async fn short_job_key_never_reaches_compute() {
        let f = fixture(0).await;
        let (_tx, mut rx) = bind(&f.pipeline.state, "u1").await;

        let payload = JobPayload::new("k", b"BM").to_bytes().unwrap();
        let receipt = f
            .bus
            .publish("pictures", "send.u1.encrypt", Bytes::from(payload))
            .await
            .unwrap();
        assert!(!receipt.is_routed());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(f.runner.calls.lock().await.is_empty());
        assert!(rx.try_recv().is_err());
        f.pipeline.shutdown();
    }

    #[tokio::test]
    async fn replicas_share_the_job_stream() {
        let f = fixture(0).await;
        let (_tx, mut rx) = bind(&f.pipeline.state, "u1").await;

        for name in ["a", "b", "c", "d"] {
            let mut job = photo_job();
            job["artifactName"] = serde_json::json!(name);
            assert_eq!(submit(&f.pipeline.state, job).await, StatusCode::OK);
        }

        let mut names = Vec::new();
        for _ in 0..4 {
            names.push(next_frame(&mut rx).await.data);
        }
        names.sort();
        assert_eq!(
            names,
            vec!["a_output.bin", "b_output.bin", "c_output.bin", "d_output.bin"]
        );
        assert_eq!(f.runner.calls.lock().await.len(), 4);

        let _ = std::fs::remove_dir_all(&f.work_dir);
        f.pipeline.shutdown();
    }

    #[tokio::test]
    async fn zero_replicas_still_start_one_dispatcher() {
        let mut config = PipelineConfig::default();
        config.worker.replicas = 0;
        let bus = InMemoryTopicBus::new();
        let runner = Arc::new(FakeRunner {
            exit_code: 0,
            calls: Mutex::new(Vec::new()),
        });
        let pipeline = assemble(&config, Arc::new(bus.clone()), runner, None)
            .await
            .unwrap();
        assert_eq!(pipeline.consumers.len(), 2);
        pipeline.shutdown();
    }

    #[test]
    fn storage_disabled_means_no_client() {
        let mut config = PipelineConfig::default();
        config.storage.enabled = false;
        assert!(storage_client(&config).unwrap().is_none());
        config.storage.enabled = true;
        assert!(storage_client(&config).unwrap().is_some());
    }
}
