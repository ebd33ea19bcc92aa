use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use super::error::StorageError;
use super::traits::{StorageObject, StorageVerifier};

/// In-process object storage view for local runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    objects: RwLock<HashMap<String, StorageObject>>,
    stalled: RwLock<HashSet<String>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an object as uploaded.
    pub fn put(&self, object_id: impl Into<String>, size: i64, md5: Option<&str>) {
        let object_id = object_id.into();
        let object = StorageObject::present(object_id.clone(), size, md5.map(str::to_string));
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(object_id, object);
        }
    }

    pub fn remove(&self, object_id: &str) {
        if let Ok(mut objects) = self.objects.write() {
            objects.remove(object_id);
        }
    }

    /// Make every `stat` of this object hang, simulating an unresponsive backend.
    pub fn stall(&self, object_id: impl Into<String>) {
        if let Ok(mut stalled) = self.stalled.write() {
            stalled.insert(object_id.into());
        }
    }

    fn is_stalled(&self, object_id: &str) -> bool {
        self.stalled
            .read()
            .map(|s| s.contains(object_id))
            .unwrap_or(false)
    }
}

#[async_trait]
impl StorageVerifier for InMemoryStorage {
    async fn stat(&self, object_id: &str) -> Result<StorageObject, StorageError> {
        if self.is_stalled(object_id) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let objects = self
            .objects
            .read()
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        Ok(objects
            .get(object_id)
            .cloned()
            .unwrap_or_else(|| StorageObject::missing(object_id)))
    }
}
