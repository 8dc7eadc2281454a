//! In-memory artifact store with upsert semantics.

use cipherbus_core::{Mode, Operation};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::client::StoredImage;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RecordKey {
    user_id: String,
    image_name: String,
    operation: Operation,
    mode: Mode,
}

#[derive(Debug, Clone)]
struct Record {
    img_base64: String,
    revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Artifacts keyed by (user, image name, operation, mode).
#[derive(Clone, Default)]
pub struct ImageStore {
    records: Arc<RwLock<HashMap<RecordKey, Record>>>,
    revision: Arc<AtomicU64>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, image: &StoredImage) -> UpsertOutcome {
        let key = RecordKey {
            user_id: image.user_id.clone(),
            image_name: image.image_name.clone(),
            operation: image.operation,
            mode: image.mode,
        };
        let record = Record {
            img_base64: image.img_base64.clone(),
            revision: self.revision.fetch_add(1, Ordering::Relaxed),
        };
        match self.records.write().await.insert(key, record) {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        }
    }

    /// Most recently written artifact with this name for this user.
    pub async fn find(&self, user_id: &str, image_name: &str) -> Option<String> {
        self.records
            .read()
            .await
            .iter()
            .filter(|(k, _)| k.user_id == user_id && k.image_name == image_name)
            .max_by_key(|(_, r)| r.revision)
            .map(|(_, r)| r.img_base64.clone())
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
