//! Request submission
//!
//! One remote request is registered per sub-range. Issued and received
//! invoices go through different service contracts, each represented by a
//! [`RequestVariant`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::auth::{Authenticator, Session, Token};
use crate::config::RetryConfig;
use crate::error::SubmitError;
use crate::retry::with_retry;
use crate::service::{IssuedQuery, ReceivedQuery, SatService, SubmitQuery, SubmitResponse};
use crate::types::{DateRange, Direction, PendingRequest, RequestKind, RunStats};

/// One of the two submission contracts
#[async_trait]
pub trait RequestVariant: Send + Sync {
    /// Which invoices this contract queries
    fn direction(&self) -> Direction;

    /// Register a request through this contract
    async fn submit(
        &self,
        service: &dyn SatService,
        token: &Token,
        query: SubmitQuery,
    ) -> Result<SubmitResponse, SubmitError>;
}

/// Requests for invoices the taxpayer issued, filtered by issuer RFC
#[derive(Debug, Clone, Copy)]
pub struct IssuedRequests;

/// Requests for invoices the taxpayer received, filtered by receiver RFC
#[derive(Debug, Clone, Copy)]
pub struct ReceivedRequests;

#[async_trait]
impl RequestVariant for IssuedRequests {
    fn direction(&self) -> Direction {
        Direction::Issued
    }

    async fn submit(
        &self,
        service: &dyn SatService,
        token: &Token,
        query: SubmitQuery,
    ) -> Result<SubmitResponse, SubmitError> {
        let issuer_rfc = query.taxpayer_id.clone();
        service
            .submit_issued(token, &IssuedQuery { query, issuer_rfc })
            .await
    }
}

#[async_trait]
impl RequestVariant for ReceivedRequests {
    fn direction(&self) -> Direction {
        Direction::Received
    }

    async fn submit(
        &self,
        service: &dyn SatService,
        token: &Token,
        query: SubmitQuery,
    ) -> Result<SubmitResponse, SubmitError> {
        let receiver_rfc = query.taxpayer_id.clone();
        service
            .submit_received(token, &ReceivedQuery {
                query,
                receiver_rfc,
            })
            .await
    }
}

impl Direction {
    /// The submission contract for this direction
    pub fn variant(self) -> &'static dyn RequestVariant {
        match self {
            Direction::Issued => &IssuedRequests,
            Direction::Received => &ReceivedRequests,
        }
    }
}

/// What [`Submitter::submit_all`] registered
#[derive(Debug, Default)]
pub struct SubmitBatch {
    /// Accepted requests, in submission order
    pub accepted: Vec<PendingRequest>,
    /// Why submission stopped early, when a token renewal failed
    pub aborted: Option<String>,
}

/// Registers download requests for a taxpayer
pub struct Submitter {
    service: Arc<dyn SatService>,
    rfc: String,
    kind: RequestKind,
    delay: Duration,
    retry: RetryConfig,
}

impl Submitter {
    /// Create a submitter
    ///
    /// `delay` is the pause inserted before every submission but the first.
    pub fn new(
        service: Arc<dyn SatService>,
        rfc: impl Into<String>,
        kind: RequestKind,
        delay: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            service,
            rfc: rfc.into(),
            kind,
            delay,
            retry,
        }
    }

    /// Register one request for `range`
    ///
    /// Transport failures are retried per the retry policy until `cancel`
    /// fires. An answer without a request id is returned as
    /// [`SubmitError::NoRequestId`] right away. `stats.requests_sent` is
    /// incremented on success.
    pub async fn submit(
        &self,
        range: DateRange,
        direction: Direction,
        token: &Token,
        stats: &mut RunStats,
        cancel: &CancellationToken,
    ) -> Result<PendingRequest, SubmitError> {
        let variant = direction.variant();
        let query = SubmitQuery::new(&self.rfc, range, self.kind);

        let response = with_retry(&self.retry, cancel, || {
            variant.submit(self.service.as_ref(), token, query.clone())
        })
        .await?;

        match response.request_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => {
                stats.requests_sent += 1;
                Ok(PendingRequest::accepted(id.into(), range))
            }
            _ => Err(SubmitError::NoRequestId {
                code: response.status_code,
                message: response.message,
            }),
        }
    }

    /// Register one request per range, in order
    ///
    /// Failed submissions are logged and counted in `stats.errors`; the rest
    /// of the batch continues. Stops early, returning what was registered so
    /// far, when `cancel` fires or when no token can be obtained (the latter
    /// sets [`SubmitBatch::aborted`]).
    pub async fn submit_all<A: Authenticator>(
        &self,
        ranges: &[DateRange],
        direction: Direction,
        session: &mut Session<A>,
        stats: &mut RunStats,
        cancel: &CancellationToken,
    ) -> SubmitBatch {
        let total = ranges.len();
        let mut batch = SubmitBatch {
            accepted: Vec::with_capacity(total),
            aborted: None,
        };

        for (i, range) in ranges.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(submitted = i, total, "submission interrupted");
                break;
            }

            if i > 0 && !self.delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::warn!(submitted = i, total, "submission interrupted");
                        break;
                    }
                    _ = tokio::time::sleep(self.delay) => {}
                }
            }

            let token = match session.token().await {
                Ok(token) => token,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        submitted = i,
                        total,
                        "token renewal failed, submission stopped"
                    );
                    batch.aborted = Some(e.to_string());
                    break;
                }
            };

            tracing::info!(
                index = i + 1,
                total,
                range = %range,
                direction = %direction,
                "submitting download request"
            );

            match self.submit(*range, direction, &token, stats, cancel).await {
                Ok(request) => {
                    tracing::info!(request_id = %request.id, range = %range, "request accepted");
                    batch.accepted.push(request);
                }
                Err(e) => {
                    stats.errors += 1;
                    tracing::warn!(
                        range = %range,
                        error = %e,
                        code = e.error_code(),
                        "request not accepted"
                    );
                }
            }
        }

        batch
    }
}
