//! Application configuration loaded once at startup.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Compiled-in document shown until the user configures another one.
pub const DEFAULT_CV_URL: &str = "assets/cv/cv.pdf";

/// Collection prefix for uploaded documents.
pub const DEFAULT_COLLECTION_PREFIX: &str = "cv";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding `cv-vault.db`.
    pub data_dir: PathBuf,
    pub default_url: String,
    /// Root that relative document URLs resolve against.
    pub assets_dir: PathBuf,
    pub download_dir: PathBuf,
    pub remote: Option<RemoteConfig>,
    pub retry: RetryPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            default_url: DEFAULT_CV_URL.to_string(),
            assets_dir: PathBuf::from("."),
            download_dir: PathBuf::from("downloads"),
            remote: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("cv-vault.db")
    }
}

/// S3-compatible bucket the upload pipeline publishes to.
///
/// With `account_id` set and no `endpoint`, the Cloudflare R2 endpoint for that
/// account is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Public domain serving the bucket, e.g. `cdn.example.com`.
    #[serde(default)]
    pub public_domain: Option<String>,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_url_expiry")]
    pub url_expiry_secs: u64,
}

fn default_region() -> String {
    "auto".to_string()
}

fn default_prefix() -> String {
    DEFAULT_COLLECTION_PREFIX.to_string()
}

fn default_url_expiry() -> u64 {
    3600
}

impl RemoteConfig {
    pub fn endpoint_url(&self) -> Option<String> {
        match (&self.endpoint, &self.account_id) {
            (Some(endpoint), _) => Some(endpoint.trim_end_matches('/').to_string()),
            (None, Some(account_id)) => {
                Some(format!("https://{}.r2.cloudflarestorage.com", account_id))
            }
            (None, None) => None,
        }
    }
}

/// Bounded retry schedule for transient upload failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub step_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 2000,
            step_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows attempt `attempt_index` (0-based).
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        Duration::from_millis(
            self.base_delay_ms
                .saturating_add(u64::from(attempt_index).saturating_mul(self.step_delay_ms)),
        )
    }

    pub fn allows_retry(&self, attempt_index: u32) -> bool {
        attempt_index < self.max_retries
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}
