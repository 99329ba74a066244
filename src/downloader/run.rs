//! A single bulk download run

use tokio_util::sync::CancellationToken;

use super::BulkDownloader;
use crate::auth::{Authenticator, Session};
use crate::error::Result;
use crate::period;
use crate::poller::PollingEngine;
use crate::submitter::Submitter;
use crate::types::{DateRange, Direction, PollReport, Resolution, RunStats, RunSummary};
use crate::utils::list_archives;

impl BulkDownloader {
    /// Download every package for `range` and `direction`
    ///
    /// Authenticates, splits the range, submits one request per window, polls
    /// until every request resolves (or rounds run out, or `cancel` fires) and
    /// lists what ended up in the output directory.
    ///
    /// Per-request failures are counted in [`RunSummary::stats`] rather than
    /// returned. An interruption is not an error either: the summary comes
    /// back with `report.cancelled` set. When a later token renewal fails the
    /// run stops there, keeps what it downloaded, records the remaining
    /// requests as [`Resolution::Aborted`] and sets `report.aborted`.
    ///
    /// # Errors
    ///
    /// [`Error::Auth`](crate::Error::Auth) when the first token cannot be
    /// obtained, and [`Error::Io`](crate::Error::Io) when the output directory
    /// cannot be created or listed.
    pub async fn run<A: Authenticator>(
        &self,
        range: DateRange,
        direction: Direction,
        authenticator: A,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let config = &self.config;
        let rfc = config.normalized_rfc();
        let output_dir = config.output_dir.clone();

        tokio::fs::create_dir_all(&output_dir).await?;

        let mut session = Session::new(authenticator, config.token_refresh_margin);
        let mut stats = RunStats::default();

        // Fail before submitting anything if the identity is refused
        session.token().await?;

        let windows = period::split(range, config.batch.max_days);
        tracing::info!(
            rfc = %rfc,
            range = %range,
            direction = %direction,
            kind = config.batch.request_kind.as_str(),
            windows = windows.len(),
            output_dir = %output_dir.display(),
            "starting bulk download"
        );

        let submitter = Submitter::new(
            self.service.clone(),
            rfc.clone(),
            config.batch.request_kind,
            config.batch.submit_delay,
            config.retry.clone(),
        );
        let batch = submitter
            .submit_all(&windows, direction, &mut session, &mut stats, cancel)
            .await;
        let pending = batch.accepted;

        let report = if let Some(reason) = batch.aborted {
            let mut report = PollReport {
                cancelled: cancel.is_cancelled(),
                aborted: Some(reason),
                ..PollReport::default()
            };
            report.record_unresolved(pending, Resolution::Aborted);
            report
        } else if pending.is_empty() {
            tracing::warn!("no request was accepted, nothing to poll");
            PollReport {
                cancelled: cancel.is_cancelled(),
                ..PollReport::default()
            }
        } else {
            let engine = PollingEngine::new(
                self.service.clone(),
                rfc,
                output_dir.clone(),
                &config.polling,
                config.retry.clone(),
            );
            engine.run(pending, &mut session, &mut stats, cancel).await
        };

        let archives = list_archives(&output_dir)?;

        tracing::info!(
            requests_sent = stats.requests_sent,
            packages_downloaded = stats.packages_downloaded,
            documents_extracted = stats.documents_extracted,
            errors = stats.errors,
            archives = archives.len(),
            rounds = report.rounds,
            cancelled = report.cancelled,
            "bulk download finished"
        );
        if let Some(reason) = &report.aborted {
            tracing::error!(
                reason = %reason,
                unresolved = report.unresolved().count(),
                "run stopped early, no token could be obtained"
            );
        }
        for archive in &archives {
            tracing::debug!(path = %archive.path.display(), size_bytes = archive.size_bytes, "archive");
        }

        Ok(RunSummary {
            stats,
            report,
            output_dir,
            archives,
        })
    }
}
