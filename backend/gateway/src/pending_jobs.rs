//! Pending-job hints.
//!
//! Records which jobs the gateway has published and not yet seen a result for.
//! Used for health output and logs only; routing keys carry all the correlation.

use cipherbus_core::PendingJob;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

type PendingKey = (String, String);

/// Bounded map of (session id, artifact name) to the job last submitted under it.
#[derive(Clone)]
pub struct PendingJobs {
    inner: Arc<RwLock<HashMap<PendingKey, PendingJob>>>,
    capacity: usize,
}

impl PendingJobs {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Remember a job. At capacity the oldest hint is evicted first.
    pub async fn record(&self, job: PendingJob) {
        let key = (job.session_id.clone(), job.artifact_name.clone());
        let mut map = self.inner.write().await;

        if !map.contains_key(&key) && map.len() >= self.capacity {
            let oldest = map
                .iter()
                .min_by_key(|(_, j)| j.submitted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                map.remove(&oldest);
                debug!(
                    session_id = %oldest.0,
                    artifact = %oldest.1,
                    map_size = map.len(),
                    "Evicted pending job hint due to capacity limit"
                );
            }
        }

        map.insert(key, job);
    }

    /// Forget a job once its result came back.
    pub async fn complete(&self, session_id: &str, artifact_name: &str) -> Option<PendingJob> {
        self.inner
            .write()
            .await
            .remove(&(session_id.to_string(), artifact_name.to_string()))
    }

    pub async fn for_session(&self, session_id: &str) -> Vec<PendingJob> {
        let mut jobs: Vec<PendingJob> = self
            .inner
            .read()
            .await
            .values()
            .filter(|j| j.session_id == session_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.submitted_at);
        jobs
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
