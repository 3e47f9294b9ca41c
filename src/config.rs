//! Configuration types for jsoc-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// JSOC export endpoint (requests and status lookups)
pub const DEFAULT_EXPORT_URL: &str = "http://jsoc.stanford.edu/cgi-bin/ajax/jsoc_fetch";

/// Base URL that staged export directories are served from
pub const DEFAULT_BASE_DOWNLOAD_URL: &str = "http://jsoc.stanford.edu";

/// Main configuration for [`JsocClient`](crate::JsocClient)
///
/// Every field has a default, so `ClientConfig::default()` talks to the public
/// JSOC service and downloads into `./downloads`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Export endpoint for `exp_request` and `exp_status` calls
    #[serde(default = "default_export_url")]
    pub export_url: String,

    /// Base URL joined with the `dir` of a staged export to form file URLs
    #[serde(default = "default_base_download_url")]
    pub base_download_url: String,

    /// Download directory (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum simultaneous file transfers (default: 5)
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Sleep between passes of the wait loop (default: 10 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Maximum number of full poll passes before giving up (None = wait forever)
    #[serde(default)]
    pub max_poll_passes: Option<u32>,

    /// Per-request HTTP timeout (None = rely on the transport's own behavior)
    #[serde(default, with = "optional_duration_serde")]
    pub request_timeout: Option<Duration>,

    /// Retry policy for individual file transfers
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            export_url: default_export_url(),
            base_download_url: default_base_download_url(),
            download_dir: default_download_dir(),
            max_connections: default_max_connections(),
            poll_interval: default_poll_interval(),
            max_poll_passes: None,
            request_timeout: None,
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Check the configuration for values the client cannot work with
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.export_url)
            .map_err(|e| Error::config("export_url", format!("not a valid URL: {}", e)))?;
        url::Url::parse(&self.base_download_url)
            .map_err(|e| Error::config("base_download_url", format!("not a valid URL: {}", e)))?;

        if self.max_connections == 0 {
            return Err(Error::config("max_connections", "must be at least 1"));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::config("poll_interval", "must be greater than zero"));
        }
        if self.max_poll_passes == Some(0) {
            return Err(Error::config(
                "max_poll_passes",
                "must be at least 1 when set",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                "must be at least 1.0",
            ));
        }
        Ok(())
    }
}

/// Retry configuration for transient file-transfer failures
///
/// Export submission and status checks are never retried.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

fn default_export_url() -> String {
    DEFAULT_EXPORT_URL.to_string()
}

fn default_base_download_url() -> String {
    DEFAULT_BASE_DOWNLOAD_URL.to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_max_connections() -> usize {
    5
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
