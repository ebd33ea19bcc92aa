use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::StorageError;
use crate::retry::RetryPolicy;

/// What object storage currently holds for one object id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageObject {
    pub object_id: String,
    pub exists: bool,
    /// Size in bytes, when known.
    pub size: Option<i64>,
    /// Hex encoded MD5, when storage recorded one.
    pub md5: Option<String>,
}

impl StorageObject {
    pub fn missing(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            exists: false,
            size: None,
            md5: None,
        }
    }

    pub fn present(object_id: impl Into<String>, size: i64, md5: Option<String>) -> Self {
        Self {
            object_id: object_id.into(),
            exists: true,
            size: Some(size),
            md5,
        }
    }
}

/// Read-only view of the object storage service.
#[async_trait]
pub trait StorageVerifier: Send + Sync {
    /// Report existence, size and checksum of an object.
    ///
    /// An object storage has never seen is `Ok` with `exists == false`, not an error.
    async fn stat(&self, object_id: &str) -> Result<StorageObject, StorageError>;
}

/// Call [`StorageVerifier::stat`] with a per-attempt timeout, retrying transient failures with
/// exponential backoff. The last error is returned once the budget is spent.
pub async fn stat_with_retry(
    verifier: &dyn StorageVerifier,
    object_id: &str,
    policy: &RetryPolicy,
) -> Result<StorageObject, StorageError> {
    let mut attempt: u8 = 0;
    loop {
        let result = match tokio::time::timeout(policy.timeout, verifier.stat(object_id)).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout {
                object_id: object_id.to_string(),
                after: policy.timeout,
            }),
        };

        match result {
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.backoff(attempt);
                warn!(
                    object_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Storage stat failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}
