//! # cfdi-dl
//!
//! Bulk download of CFDI invoices through the SAT mass-download web service.
//!
//! ## How a run works
//!
//! - The requested period is cut into windows of at most `batch.max_days`
//!   days, since the service bounds how much a single request may cover.
//! - One download request is submitted per window, spaced by
//!   `batch.submit_delay`.
//! - Accepted requests are verified in rounds until the service reports a
//!   verdict. Ready requests have their packages downloaded immediately, in
//!   the order listed; packages already on disk are not fetched again.
//! - The run ends with a [`RunSummary`]: counters, one outcome per request and
//!   the archives present in the output directory.
//!
//! Signing the authentication challenge with the taxpayer's FIEL is left to
//! the host application, which plugs it in as an [`Authenticator`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use cfdi_dl::{BulkDownloader, Config, DateRange, Direction, StaticTokenAuthenticator, Token};
//! use chrono::{NaiveDate, Utc};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::for_rfc("XAXX010101000");
//!     config.service.base_url = "https://gateway.example.com".to_string();
//!
//!     let downloader = BulkDownloader::new(config)?;
//!     let token = Token::new("token-from-the-auth-service", Utc::now() + chrono::Duration::minutes(5));
//!
//!     let cancel = CancellationToken::new();
//!     cfdi_dl::cancel_on_signal(cancel.clone());
//!
//!     let range = DateRange::new(
//!         NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!         NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
//!     )?;
//!     let summary = downloader
//!         .run(range, Direction::Received, StaticTokenAuthenticator::new(token), &cancel)
//!         .await?;
//!
//!     println!("{:?}", summary.stats);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Tokens, authenticators and token renewal
pub mod auth;
/// Configuration types
pub mod config;
/// Run orchestration
pub mod downloader;
/// Error types
pub mod error;
/// Package retrieval
pub mod fetcher;
/// Date range splitting
pub mod period;
/// Request polling state machine
pub mod poller;
/// Retry logic with exponential backoff
pub mod retry;
/// Remote service port and HTTP adapter
pub mod service;
/// Request submission
pub mod submitter;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use auth::{Authenticator, Session, StaticTokenAuthenticator, Token};
pub use config::{BatchConfig, Config, EndpointConfig, PollingConfig, RetryConfig, ServiceConfig};
pub use downloader::BulkDownloader;
pub use error::{AuthError, Error, FetchError, Result, SubmitError, VerifyError};
pub use service::{HttpSatService, SatService};
pub use types::{
    ArchiveEntry, DateRange, Direction, FetchOutcome, PendingRequest, PollReport, RequestId,
    RequestKind, RequestOutcome, RequestState, Resolution, RunStats, RunSummary,
};

/// Cancel `token` when the process receives a termination signal
///
/// Spawns a task that waits for the signal; the task ends once the token is
/// cancelled, whichever way that happens. A run in progress then stops at its
/// next suspension point and still returns its summary.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Must be called from within a Tokio runtime.
pub fn cancel_on_signal(token: tokio_util::sync::CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = wait_for_signal() => {
                tracing::warn!("interrupt received, stopping after the current step");
                token.cancel();
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "could not register every signal handler");
            only.recv().await;
            tracing::info!("received termination signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C"),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
