//! Bulk download orchestration
//!
//! [`BulkDownloader`] wires the stages of a run together:
//! - [`period`](crate::period) splits the requested range into windows
//! - [`Submitter`](crate::submitter::Submitter) registers one request per window
//! - [`PollingEngine`](crate::poller::PollingEngine) waits for verdicts and
//!   fetches packages
//!
//! The run itself lives in [`run`].

mod run;

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::service::{HttpSatService, SatService};

/// Entry point for a bulk download run (cloneable, all state is shared)
#[derive(Clone)]
pub struct BulkDownloader {
    /// Validated configuration
    pub(crate) config: Arc<Config>,
    /// Remote service, shared with every stage
    pub(crate) service: Arc<dyn SatService>,
}

impl BulkDownloader {
    /// Create a downloader talking to the HTTP gateway named in `config`
    ///
    /// # Errors
    ///
    /// [`Error::Config`](crate::Error::Config) when the configuration is
    /// invalid, [`Error::Network`](crate::Error::Network) when the HTTP client
    /// cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let service = HttpSatService::new(&config.service)?;
        Ok(Self {
            config: Arc::new(config),
            service: Arc::new(service),
        })
    }

    /// Create a downloader over any [`SatService`] implementation
    pub fn with_service(config: Config, service: Arc<dyn SatService>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            service,
        })
    }

    /// The configuration this downloader runs with
    pub fn config(&self) -> &Config {
        &self.config
    }
}
