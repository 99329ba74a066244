//! Package retrieval
//!
//! A package is written once, to `<output_dir>/<package_id>.zip`, and never
//! fetched again while that file exists.

use base64::Engine;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::auth::Token;
use crate::config::RetryConfig;
use crate::error::FetchError;
use crate::retry::with_retry;
use crate::service::SatService;
use crate::types::{FetchOutcome, RunStats};
use crate::utils::{count_documents, package_path, write_atomically};

/// Downloads and persists result packages for one taxpayer
pub struct PackageFetcher {
    service: Arc<dyn SatService>,
    rfc: String,
    retry: RetryConfig,
}

impl PackageFetcher {
    /// Create a fetcher
    pub fn new(service: Arc<dyn SatService>, rfc: impl Into<String>, retry: RetryConfig) -> Self {
        Self {
            service,
            rfc: rfc.into(),
            retry,
        }
    }

    /// Fetch one package into `output_dir`
    ///
    /// Surrounding whitespace in `package_id` is dropped; the trimmed id is
    /// both requested and used as the file name. Returns
    /// [`FetchOutcome::AlreadyPresent`] without contacting the service when
    /// the package file already exists. Otherwise the payload is decoded and
    /// written atomically; on any error no file is left behind. Retries of a
    /// failed download stop once `cancel` fires.
    pub async fn fetch(
        &self,
        package_id: &str,
        token: &Token,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchError> {
        let package_id = package_id.trim();
        let path = package_path(output_dir, package_id)?;

        if tokio::fs::try_exists(&path).await? {
            tracing::info!(package_id, path = %path.display(), "package already present, skipping");
            return Ok(FetchOutcome::AlreadyPresent { path });
        }

        tokio::fs::create_dir_all(output_dir).await?;

        tracing::debug!(package_id, "downloading package");
        let response = with_retry(&self.retry, cancel, || {
            self.service.download(token, &self.rfc, package_id)
        })
        .await?;

        let payload = match response.payload_base64.as_deref().map(str::trim) {
            Some(payload) if !payload.is_empty() => payload,
            _ => {
                return Err(FetchError::NoPayload {
                    code: response.status_code,
                    message: response.message,
                });
            }
        };

        // Some gateways wrap long base64 lines
        let compact: String = payload.split_ascii_whitespace().collect();
        let data = base64::engine::general_purpose::STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| FetchError::Decode(format!("package {package_id}: {e}")))?;

        write_atomically(&path, &data).await?;

        let documents = count_documents(&data);
        tracing::info!(
            package_id,
            path = %path.display(),
            bytes = data.len(),
            documents = ?documents,
            "package saved"
        );

        Ok(FetchOutcome::Downloaded {
            path,
            bytes: data.len() as u64,
            documents,
        })
    }

    /// Fetch a package and record the result in `stats`
    ///
    /// Successes (including already-present packages) count as downloaded,
    /// and known document counts are added. Failures are logged and counted
    /// as errors. Returns whether the package is now on disk.
    pub async fn fetch_counted(
        &self,
        package_id: &str,
        token: &Token,
        output_dir: &Path,
        stats: &mut RunStats,
        cancel: &CancellationToken,
    ) -> bool {
        match self.fetch(package_id, token, output_dir, cancel).await {
            Ok(outcome) => {
                stats.packages_downloaded += 1;
                if let FetchOutcome::Downloaded {
                    documents: Some(count),
                    ..
                } = outcome
                {
                    stats.documents_extracted += count as u64;
                }
                true
            }
            Err(e) => {
                stats.errors += 1;
                tracing::warn!(
                    package_id,
                    error = %e,
                    code = e.error_code(),
                    "package download failed"
                );
                false
            }
        }
    }
}
