use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::error::StorageError;
use super::traits::{StorageObject, StorageVerifier};
use crate::config::StorageAppConfig;

/// Object storage metadata returned by the download endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadMeta {
    object_id: Option<String>,
    object_size: Option<i64>,
    object_md5: Option<String>,
}

/// [`StorageVerifier`] backed by the object storage HTTP API.
///
/// Existence is answered by `GET {url}/upload/{id}` (plain `true`/`false` body); size and
/// checksum by `GET {url}/download/{id}?offset=0&length=-1`.
pub struct HttpStorageVerifier {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpStorageVerifier {
    pub fn new(config: &StorageAppConfig) -> Result<Self, StorageError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            timeout,
        })
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let req = self.client.get(url);
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn map_err(&self, object_id: &str, err: reqwest::Error) -> StorageError {
        if err.is_timeout() {
            StorageError::Timeout {
                object_id: object_id.to_string(),
                after: self.timeout,
            }
        } else {
            StorageError::Transport(err.to_string())
        }
    }

    async fn is_uploaded(&self, object_id: &str) -> Result<bool, StorageError> {
        let url = format!("{}/upload/{}", self.base_url, object_id);
        let resp = self
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_err(object_id, e))?;
        if !resp.status().is_success() {
            return Err(StorageError::Transport(format!(
                "upload status for {object_id} returned {}",
                resp.status()
            )));
        }
        let body = resp.text().await.map_err(|e| self.map_err(object_id, e))?;
        match body.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(StorageError::InvalidResponse(format!(
                "expected true or false for {object_id}, got '{other}'"
            ))),
        }
    }
}

#[async_trait]
impl StorageVerifier for HttpStorageVerifier {
    async fn stat(&self, object_id: &str) -> Result<StorageObject, StorageError> {
        if !self.is_uploaded(object_id).await? {
            debug!(object_id, "Object not uploaded");
            return Ok(StorageObject::missing(object_id));
        }

        let url = format!("{}/download/{}", self.base_url, object_id);
        let resp = self
            .get(&url)
            .query(&[("offset", "0"), ("length", "-1")])
            .send()
            .await
            .map_err(|e| self.map_err(object_id, e))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(StorageObject::missing(object_id));
        }
        if !resp.status().is_success() {
            return Err(StorageError::Transport(format!(
                "download metadata for {object_id} returned {}",
                resp.status()
            )));
        }

        let meta: DownloadMeta = resp
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;

        if let Some(returned) = meta.object_id.as_deref() {
            if returned != object_id {
                return Err(StorageError::InvalidResponse(format!(
                    "asked for {object_id}, storage answered for {returned}"
                )));
            }
        }

        Ok(StorageObject {
            object_id: object_id.to_string(),
            exists: true,
            size: meta.object_size,
            md5: meta.object_md5,
        })
    }
}
