//! Configuration types for cfdi-dl

use crate::error::{Error, Result};
use crate::types::RequestKind;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Remote gateway connection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the mass-download gateway (default: "http://127.0.0.1:8080")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Endpoint paths, relative to `base_url`
    #[serde(default)]
    pub endpoints: EndpointConfig,

    /// Timeout for a single HTTP call (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            endpoints: EndpointConfig::default(),
            timeout: default_request_timeout(),
        }
    }
}

/// Endpoint paths of the four remote operations
///
/// Issued and received submissions are distinct remote contracts, so each has
/// its own path.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Submit a request for issued invoices
    #[serde(default = "default_submit_issued_path")]
    pub submit_issued: String,

    /// Submit a request for received invoices
    #[serde(default = "default_submit_received_path")]
    pub submit_received: String,

    /// Query the state of a request
    #[serde(default = "default_verify_path")]
    pub verify: String,

    /// Download a package
    #[serde(default = "default_download_path")]
    pub download: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            submit_issued: default_submit_issued_path(),
            submit_received: default_submit_received_path(),
            verify: default_verify_path(),
            download: default_download_path(),
        }
    }
}

/// How a date range is turned into remote requests
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Longest sub-range, in days, sent in a single request (default: 7)
    ///
    /// The service rejects requests whose window is too large, so the range is
    /// split before anything is submitted.
    #[serde(default = "default_max_days")]
    pub max_days: u32,

    /// Pause between consecutive submissions (default: 2 seconds)
    #[serde(default = "default_submit_delay", with = "duration_serde")]
    pub submit_delay: Duration,

    /// What the requests ask for (default: metadata)
    #[serde(default)]
    pub request_kind: RequestKind,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_days: default_max_days(),
            submit_delay: default_submit_delay(),
            request_kind: RequestKind::default(),
        }
    }
}

/// Polling engine limits
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Maximum number of verification rounds (default: 30)
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Pause between rounds while requests are still pending (default: 60 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            interval: default_poll_interval(),
        }
    }
}

/// Retry configuration for transient transport failures within a single call
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

impl RetryConfig {
    /// A configuration that never retries
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

/// Main configuration for [`BulkDownloader`](crate::BulkDownloader)
///
/// Every field has a default, so a configuration file only needs to name the
/// taxpayer:
///
/// ```
/// let config: cfdi_dl::Config = serde_json::from_str(r#"{"rfc": "xaxx010101000"}"#).unwrap();
/// assert_eq!(config.batch.max_days, 7);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Taxpayer identifier (RFC) the requests are made for
    #[serde(default)]
    pub rfc: String,

    /// Directory where packages are written (default: "SAT_Descargas")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Remote gateway settings
    #[serde(default)]
    pub service: ServiceConfig,

    /// Date-range splitting and submission pacing
    #[serde(default)]
    pub batch: BatchConfig,

    /// Polling limits
    #[serde(default)]
    pub polling: PollingConfig,

    /// Per-call retry policy for transport failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Re-authenticate when the token expires within this window (default: 30 seconds)
    #[serde(default = "default_token_refresh_margin", with = "duration_serde")]
    pub token_refresh_margin: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rfc: String::new(),
            output_dir: default_output_dir(),
            service: ServiceConfig::default(),
            batch: BatchConfig::default(),
            polling: PollingConfig::default(),
            retry: RetryConfig::default(),
            token_refresh_margin: default_token_refresh_margin(),
        }
    }
}

impl Config {
    /// Create a configuration for a taxpayer with every other setting defaulted
    pub fn for_rfc(rfc: impl Into<String>) -> Self {
        Self {
            rfc: rfc.into(),
            ..Default::default()
        }
    }

    /// Taxpayer identifier, trimmed and uppercased
    pub fn normalized_rfc(&self) -> String {
        self.rfc.trim().to_uppercase()
    }

    /// Check the settings that would otherwise fail in the middle of a run
    pub fn validate(&self) -> Result<()> {
        if self.normalized_rfc().is_empty() {
            return Err(Error::config("rfc", "taxpayer RFC is required"));
        }
        if self.batch.max_days == 0 {
            return Err(Error::config("batch.max_days", "must be at least 1"));
        }
        if self.polling.max_rounds == 0 {
            return Err(Error::config("polling.max_rounds", "must be at least 1"));
        }
        url::Url::parse(&self.service.base_url).map_err(|e| {
            Error::config(
                "service.base_url",
                format!("invalid URL {:?}: {}", self.service.base_url, e),
            )
        })?;
        Ok(())
    }
}

// Default value functions
fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_submit_issued_path() -> String {
    "solicita-descarga/emitidos".to_string()
}

fn default_submit_received_path() -> String {
    "solicita-descarga/recibidos".to_string()
}

fn default_verify_path() -> String {
    "verifica-solicitud".to_string()
}

fn default_download_path() -> String {
    "descarga-masiva".to_string()
}

fn default_max_days() -> u32 {
    crate::period::DEFAULT_MAX_DAYS
}

fn default_submit_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_rounds() -> u32 {
    30
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("SAT_Descargas")
}

fn default_token_refresh_margin() -> Duration {
    Duration::from_secs(30)
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

// Duration serialization helper
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
