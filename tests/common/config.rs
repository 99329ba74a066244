//! Test configuration helpers: configs pointed at a mock gateway, and live
//! gateway settings loaded from `.env`

use chrono::Utc;
use std::path::Path;
use std::time::Duration;
use cfdi_dl::{Config, RetryConfig, Token};

/// Taxpayer used against the mock gateway
pub const TEST_RFC: &str = "AAA010101AAA";

/// Error type for test configuration
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for a gateway at `base_url`, writing into `output_dir`
///
/// Pacing is shrunk to milliseconds and retries to a single quick attempt so
/// a whole run finishes in well under a second.
pub fn mock_gateway_config(base_url: &str, output_dir: &Path) -> Config {
    let mut config = Config::for_rfc(TEST_RFC);
    config.output_dir = output_dir.to_path_buf();
    config.service.base_url = base_url.to_string();
    config.service.timeout = Duration::from_secs(5);
    config.batch.submit_delay = Duration::from_millis(5);
    config.polling.interval = Duration::from_millis(20);
    config.polling.max_rounds = 5;
    config.retry = RetryConfig {
        max_attempts: 1,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config
}

/// A token the mock gateway accepts
pub fn test_token() -> Token {
    Token::new("integration-token", Utc::now() + chrono::Duration::minutes(10))
}

/// Live gateway settings
pub struct LiveSettings {
    /// Gateway base URL
    pub base_url: String,
    /// Taxpayer RFC
    pub rfc: String,
    /// Token obtained from the authentication service
    pub token: Token,
}

/// Load live gateway settings from environment variables
///
/// Required environment variables:
/// - `SAT_GATEWAY_URL` - Gateway base URL
/// - `SAT_RFC` - Taxpayer RFC
/// - `SAT_TOKEN` - Token issued by the authentication service
///
/// Optional environment variables:
/// - `SAT_TOKEN_MINUTES` - Remaining token lifetime in minutes (default: 5)
pub fn load_live_settings() -> Result<LiveSettings, ConfigError> {
    dotenvy::dotenv().ok();

    let base_url = std::env::var("SAT_GATEWAY_URL")
        .map_err(|_| ConfigError("SAT_GATEWAY_URL not set in environment".to_string()))?;

    let rfc = std::env::var("SAT_RFC")
        .map_err(|_| ConfigError("SAT_RFC not set in environment".to_string()))?;

    let token = std::env::var("SAT_TOKEN")
        .map_err(|_| ConfigError("SAT_TOKEN not set in environment".to_string()))?;

    let minutes: i64 = std::env::var("SAT_TOKEN_MINUTES")
        .ok()
        .and_then(|m| m.parse().ok())
        .unwrap_or(5);

    Ok(LiveSettings {
        base_url,
        rfc,
        token: Token::new(token, Utc::now() + chrono::Duration::minutes(minutes)),
    })
}

/// Check if live gateway settings are available
pub fn has_live_settings() -> bool {
    dotenvy::dotenv().ok();
    std::env::var("SAT_GATEWAY_URL").is_ok()
        && std::env::var("SAT_RFC").is_ok()
        && std::env::var("SAT_TOKEN").is_ok()
}

/// Skip test if live gateway settings are not available
#[macro_export]
macro_rules! skip_if_no_live_settings {
    () => {
        if !$crate::common::has_live_settings() {
            eprintln!("Skipping test: SAT gateway settings not found in .env");
            return;
        }
    };
}
