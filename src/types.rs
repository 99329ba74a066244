//! Core types for cfdi-dl

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Identifier the service assigns to an accepted download request
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Create a new RequestId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive range of calendar days
///
/// Invariant: `start <= end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Create a range, rejecting `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::Config {
                message: format!("range start {start} is after end {end}"),
                key: None,
            });
        }
        Ok(Self { start, end })
    }

    /// Create a range from two bounds given in either order
    pub fn normalized(a: NaiveDate, b: NaiveDate) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            tracing::warn!(start = %a, end = %b, "range bounds reversed, swapping");
            Self { start: b, end: a }
        }
    }

    /// A range covering exactly one day
    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// First day of the range
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the range (inclusive)
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days covered, counting both bounds
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} → {}", self.start, self.end)
    }
}

/// Which side of the invoice the taxpayer is on
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Invoices the taxpayer issued (sales)
    Issued,
    /// Invoices the taxpayer received (purchases, default)
    #[default]
    Received,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Issued => write!(f, "issued"),
            Direction::Received => write!(f, "received"),
        }
    }
}

/// What a request asks the service to produce
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Summary listing of matching invoices (fast, default)
    #[default]
    Metadata,
    /// Full XML invoice documents
    Cfdi,
}

impl RequestKind {
    /// Value sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Metadata => "Metadata",
            RequestKind::Cfdi => "CFDI",
        }
    }
}

/// State of a download request as reported by the service
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestState {
    /// Registered, not yet being processed
    Accepted,
    /// Being processed by the service
    InProgress,
    /// Finished; packages can be downloaded in this order
    Ready(Vec<String>),
    /// Finished without matching documents
    Empty,
    /// Refused or failed on the service side
    Rejected(String),
    /// A state code outside the known table
    Unknown,
}

impl RequestState {
    /// Classify a verification answer
    ///
    /// | code | state |
    /// |------|-------|
    /// | 1 | Accepted |
    /// | 2 | InProgress |
    /// | 3 | Ready (Empty when no packages) |
    /// | 4, 5 | Rejected |
    /// | other | Unknown |
    pub fn from_state_code(code: i32, package_ids: Vec<String>, message: &str) -> Self {
        match code {
            1 => RequestState::Accepted,
            2 => RequestState::InProgress,
            3 if package_ids.is_empty() => RequestState::Empty,
            3 => RequestState::Ready(package_ids),
            4 | 5 => RequestState::Rejected(format!("state {code}: {message}")),
            _ => RequestState::Unknown,
        }
    }

    /// Whether the request has reached a final verdict
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Ready(_) | RequestState::Empty | RequestState::Rejected(_)
        )
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            RequestState::Accepted => "accepted",
            RequestState::InProgress => "in_progress",
            RequestState::Ready(_) => "ready",
            RequestState::Empty => "empty",
            RequestState::Rejected(_) => "rejected",
            RequestState::Unknown => "unknown",
        }
    }
}

/// A request the service accepted and that has not reached a verdict yet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingRequest {
    /// Service-assigned identifier
    pub id: RequestId,
    /// Sub-range the request covers
    pub range: DateRange,
    /// Last known state
    pub state: RequestState,
}

impl PendingRequest {
    /// A freshly submitted request
    pub fn accepted(id: RequestId, range: DateRange) -> Self {
        Self {
            id,
            range,
            state: RequestState::Accepted,
        }
    }
}

/// Counters accumulated over one run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Requests the service accepted
    pub requests_sent: u64,
    /// Packages written to disk or found already present
    pub packages_downloaded: u64,
    /// XML documents counted inside downloaded packages
    pub documents_extracted: u64,
    /// Failed submissions, rejected requests, and failed downloads
    pub errors: u64,
}

/// Result of a successful package fetch
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The package was downloaded and written
    Downloaded {
        /// Where the package was written
        path: PathBuf,
        /// Decoded size in bytes
        bytes: u64,
        /// Number of XML documents inside, when the archive could be read
        documents: Option<usize>,
    },
    /// A file for this package already existed; nothing was fetched
    AlreadyPresent {
        /// The existing file
        path: PathBuf,
    },
}

impl FetchOutcome {
    /// Path of the package on disk
    pub fn path(&self) -> &PathBuf {
        match self {
            FetchOutcome::Downloaded { path, .. } | FetchOutcome::AlreadyPresent { path } => path,
        }
    }
}

/// Final entry recorded for a request in the outcome log
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The request was ready; these packages were processed
    Downloaded {
        /// Package ids in the order they were fetched
        packages: Vec<String>,
    },
    /// The request produced no documents
    Empty,
    /// The service refused the request, or refused to report on it
    Rejected {
        /// Reason reported by the service
        reason: String,
    },
    /// Still pending when the round limit was reached
    Exhausted,
    /// Still pending when the run was interrupted
    Cancelled,
    /// Still pending when no fresh token could be obtained
    Aborted,
}

impl Resolution {
    /// Whether the service gave a verdict (as opposed to the engine giving up)
    pub fn is_verdict(&self) -> bool {
        !matches!(
            self,
            Resolution::Exhausted | Resolution::Cancelled | Resolution::Aborted
        )
    }
}

/// One line of the outcome log
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestOutcome {
    /// Request this outcome belongs to
    pub request_id: RequestId,
    /// Sub-range the request covered
    pub range: DateRange,
    /// How the request ended
    pub resolution: Resolution,
}

/// What the polling engine did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollReport {
    /// One entry per polled request, in the order they left the working set
    pub outcomes: Vec<RequestOutcome>,
    /// Rounds actually run
    pub rounds: u32,
    /// Whether polling stopped because of an interruption
    pub cancelled: bool,
    /// Why the run stopped early, when a token renewal failed
    pub aborted: Option<String>,
}

impl PollReport {
    /// Requests the engine gave up on without a verdict
    pub fn unresolved(&self) -> impl Iterator<Item = &RequestOutcome> {
        self.outcomes.iter().filter(|o| !o.resolution.is_verdict())
    }

    /// Record requests that leave without a verdict
    pub(crate) fn record_unresolved(&mut self, requests: Vec<PendingRequest>, resolution: Resolution) {
        for request in requests {
            tracing::warn!(
                request_id = %request.id,
                range = %request.range,
                state = request.state.label(),
                "request left unresolved"
            );
            self.outcomes.push(RequestOutcome {
                request_id: request.id,
                range: request.range,
                resolution: resolution.clone(),
            });
        }
    }

    /// Outcome recorded for a request, if any
    pub fn outcome_of(&self, id: &RequestId) -> Option<&RequestOutcome> {
        self.outcomes.iter().find(|o| &o.request_id == id)
    }
}

/// A package archive found in the output directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// File path
    pub path: PathBuf,
    /// Size in bytes
    pub size_bytes: u64,
}

/// Everything a host needs to report at the end of a run
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// Counters accumulated over the run
    pub stats: RunStats,
    /// Polling engine report
    pub report: PollReport,
    /// Where packages were written
    pub output_dir: PathBuf,
    /// Package archives present in the output directory, sorted by name
    pub archives: Vec<ArchiveEntry>,
}
