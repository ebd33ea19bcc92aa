use serde::Deserialize;

/// App-level object storage configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageAppConfig {
    /// Base URL of the object storage service. Default: "http://localhost:8087".
    #[serde(default = "default_storage_url")]
    pub url: String,
    /// Bearer token sent with every request. Default: none.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Per-request timeout in milliseconds. Default: 5000.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after a timeout or transport error. Default: 2.
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    /// Default: 200.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Default: 2000.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_storage_url() -> String {
    "http://localhost:8087".into()
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_max_retries() -> u8 {
    2
}
fn default_backoff_base_ms() -> u64 {
    200
}
fn default_backoff_max_ms() -> u64 {
    2000
}

impl Default for StorageAppConfig {
    fn default() -> Self {
        Self {
            url: default_storage_url(),
            auth_token: None,
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}
