//! Polling engine
//!
//! Drives accepted requests to a verdict. Each round verifies every request
//! still in the working set, in submission order:
//!
//! - ready requests have their packages fetched on the spot, in the order the
//!   service listed them, and leave the set
//! - empty and rejected requests leave the set with their outcome recorded
//! - everything else (accepted, in progress, unknown codes, transient
//!   verification failures) waits for the next round
//!
//! The engine stops when the set is empty, after the configured number of
//! rounds, when cancelled, or when the session cannot renew its token.
//! Requests still waiting at that point are recorded as
//! [`Resolution::Exhausted`], [`Resolution::Cancelled`] or
//! [`Resolution::Aborted`], so every request handed to [`PollingEngine::run`]
//! ends up in the report exactly once.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::auth::{Authenticator, Session, Token};
use crate::config::{PollingConfig, RetryConfig};
use crate::error::VerifyError;
use crate::fetcher::PackageFetcher;
use crate::service::SatService;
use crate::types::{PendingRequest, PollReport, RequestOutcome, RequestState, Resolution, RunStats};

/// Polls requests until they resolve and fetches their packages
pub struct PollingEngine {
    service: Arc<dyn SatService>,
    fetcher: PackageFetcher,
    rfc: String,
    output_dir: PathBuf,
    max_rounds: u32,
    interval: Duration,
}

impl PollingEngine {
    /// Create an engine writing packages into `output_dir`
    ///
    /// `retry` applies to each package download, not to verification: a
    /// failed verification simply waits for the next round.
    pub fn new(
        service: Arc<dyn SatService>,
        rfc: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        polling: &PollingConfig,
        retry: RetryConfig,
    ) -> Self {
        let rfc = rfc.into();
        Self {
            fetcher: PackageFetcher::new(service.clone(), rfc.clone(), retry),
            service,
            rfc,
            output_dir: output_dir.into(),
            max_rounds: polling.max_rounds,
            interval: polling.interval,
        }
    }

    /// Poll `pending` until every request is resolved, rounds run out, or
    /// `cancel` fires
    ///
    /// Failures are recorded in `stats` and the report. A failed token renewal
    /// ends polling with `report.aborted` set; packages fetched before it stay
    /// counted.
    pub async fn run<A: Authenticator>(
        &self,
        pending: Vec<PendingRequest>,
        session: &mut Session<A>,
        stats: &mut RunStats,
        cancel: &CancellationToken,
    ) -> PollReport {
        let mut working = pending;
        let mut report = PollReport::default();

        while !working.is_empty() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if report.rounds >= self.max_rounds {
                break;
            }

            if report.rounds > 0 {
                tracing::debug!(
                    seconds = self.interval.as_secs(),
                    pending = working.len(),
                    "waiting before next round"
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        report.cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }

            let token = match session.token().await {
                Ok(token) => token,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        pending = working.len(),
                        "token renewal failed, polling stopped"
                    );
                    report.aborted = Some(e.to_string());
                    break;
                }
            };
            report.rounds += 1;
            tracing::info!(
                round = report.rounds,
                max_rounds = self.max_rounds,
                pending = working.len(),
                "polling round"
            );

            let mut waiting = Vec::with_capacity(working.len());
            let mut queue = working.into_iter();
            while let Some(mut request) = queue.next() {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    waiting.push(request);
                    waiting.extend(queue.by_ref());
                    break;
                }

                match self.poll_one(&mut request, &token, stats, cancel).await {
                    Some(resolution) => report.outcomes.push(RequestOutcome {
                        request_id: request.id,
                        range: request.range,
                        resolution,
                    }),
                    None => waiting.push(request),
                }
            }
            working = waiting;

            if report.cancelled {
                break;
            }
        }

        if !working.is_empty() {
            let resolution = if report.aborted.is_some() {
                Resolution::Aborted
            } else if report.cancelled {
                tracing::warn!(pending = working.len(), "polling interrupted");
                Resolution::Cancelled
            } else {
                tracing::warn!(
                    pending = working.len(),
                    rounds = report.rounds,
                    "round limit reached with requests still pending"
                );
                Resolution::Exhausted
            };
            report.record_unresolved(working, resolution);
        }

        tracing::info!(
            rounds = report.rounds,
            resolved = report.outcomes.iter().filter(|o| o.resolution.is_verdict()).count(),
            cancelled = report.cancelled,
            aborted = report.aborted.is_some(),
            "polling finished"
        );
        report
    }

    /// Verify one request; `Some` when it left the working set
    async fn poll_one(
        &self,
        request: &mut PendingRequest,
        token: &Token,
        stats: &mut RunStats,
        cancel: &CancellationToken,
    ) -> Option<Resolution> {
        let response = match self.service.verify(token, &self.rfc, &request.id).await {
            Ok(response) => response,
            Err(VerifyError::Transient(msg)) => {
                tracing::warn!(request_id = %request.id, error = %msg, "verification failed, will retry next round");
                return None;
            }
            Err(e @ VerifyError::Rejected { .. }) => {
                stats.errors += 1;
                tracing::error!(request_id = %request.id, error = %e, "verification rejected");
                return Some(Resolution::Rejected {
                    reason: e.to_string(),
                });
            }
        };

        let state = match response.state_code {
            Some(code) => {
                RequestState::from_state_code(code, response.package_ids, &response.message)
            }
            None => RequestState::Unknown,
        };

        if state.label() != request.state.label() {
            tracing::info!(
                request_id = %request.id,
                from = request.state.label(),
                state = state.label(),
                "request state changed"
            );
        }

        match state {
            RequestState::Ready(packages) => {
                tracing::info!(
                    request_id = %request.id,
                    packages = packages.len(),
                    "request ready"
                );
                for package_id in &packages {
                    self.fetcher
                        .fetch_counted(package_id, token, &self.output_dir, stats, cancel)
                        .await;
                }
                Some(Resolution::Downloaded { packages })
            }
            RequestState::Empty => {
                tracing::info!(request_id = %request.id, range = %request.range, "request finished without documents");
                Some(Resolution::Empty)
            }
            RequestState::Rejected(reason) => {
                stats.errors += 1;
                tracing::error!(request_id = %request.id, reason = %reason, "request rejected");
                Some(Resolution::Rejected { reason })
            }
            RequestState::Unknown => {
                tracing::warn!(
                    request_id = %request.id,
                    state_code = ?response.state_code,
                    message = %response.message,
                    "unrecognised request state"
                );
                request.state = RequestState::Unknown;
                None
            }
            state => {
                request.state = state;
                None
            }
        }
    }
}
