//! Shared test helpers: an in-memory [`SatService`] with scripted answers.

use async_trait::async_trait;
use base64::Engine;
use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::auth::{Authenticator, Token};
use crate::error::{AuthError, FetchError, SubmitError, VerifyError};
use crate::service::{
    DownloadResponse, IssuedQuery, ReceivedQuery, SatService, SubmitResponse, VerifyResponse,
};
use crate::types::{Direction, RequestId};

pub(crate) fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// A token valid for the next hour
pub(crate) fn token() -> Token {
    Token::new("test-token", Utc::now() + chrono::Duration::hours(1))
}

/// Authenticator that grants a fixed number of tokens, then refuses
///
/// Each token expires within [`Self::MARGIN`], so a session using that margin
/// re-authenticates on every request for a token.
pub(crate) struct RationedAuthenticator {
    remaining: AtomicU32,
    calls: AtomicU32,
}

impl RationedAuthenticator {
    pub(crate) const MARGIN: Duration = Duration::from_secs(30);

    pub(crate) fn new(grants: u32) -> Self {
        Self {
            remaining: AtomicU32::new(grants),
            calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for RationedAuthenticator {
    async fn authenticate(&self) -> Result<Token, AuthError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let granted = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if !granted {
            return Err(AuthError::Rejected("certificate revoked".into()));
        }
        Ok(Token::new(
            format!("rationed-{n}"),
            Utc::now() + chrono::Duration::seconds(10),
        ))
    }
}

/// Fake gateway
///
/// Submissions are answered from a FIFO script. Verifications are scripted
/// per request id; once a request's script runs out it keeps reporting
/// state 2 (in progress). Downloads serve registered package bytes, after
/// any scripted failures for that package.
#[derive(Default)]
pub(crate) struct ScriptedService {
    submits: Mutex<VecDeque<Result<SubmitResponse, SubmitError>>>,
    verifies: Mutex<HashMap<String, VecDeque<Result<VerifyResponse, VerifyError>>>>,
    packages: Mutex<HashMap<String, Vec<u8>>>,
    download_failures: Mutex<HashMap<String, VecDeque<FetchError>>>,
    submit_calls: Mutex<Vec<(Direction, NaiveDate, NaiveDate)>>,
    verify_calls: Mutex<Vec<String>>,
    download_calls: Mutex<Vec<String>>,
}

impl ScriptedService {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A submission answer carrying `id`
    pub(crate) fn accepted(id: &str) -> SubmitResponse {
        SubmitResponse {
            status_code: "5000".into(),
            message: "Solicitud Aceptada".into(),
            request_id: Some(id.into()),
        }
    }

    /// A verification answer with the given state code and packages
    pub(crate) fn state(code: i32, packages: &[&str]) -> VerifyResponse {
        VerifyResponse {
            status_code: "5000".into(),
            message: "Solicitud Aceptada".into(),
            state_code: Some(code),
            package_ids: packages.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub(crate) fn push_submit(&self, answer: Result<SubmitResponse, SubmitError>) {
        self.submits.lock().unwrap().push_back(answer);
    }

    pub(crate) fn push_verify(&self, request_id: &str, answer: Result<VerifyResponse, VerifyError>) {
        self.verifies
            .lock()
            .unwrap()
            .entry(request_id.to_string())
            .or_default()
            .push_back(answer);
    }

    pub(crate) fn add_package(&self, package_id: &str, bytes: Vec<u8>) {
        self.packages
            .lock()
            .unwrap()
            .insert(package_id.to_string(), bytes);
    }

    pub(crate) fn push_download_failure(&self, package_id: &str, error: FetchError) {
        self.download_failures
            .lock()
            .unwrap()
            .entry(package_id.to_string())
            .or_default()
            .push_back(error);
    }

    pub(crate) fn submit_calls(&self) -> Vec<(Direction, NaiveDate, NaiveDate)> {
        self.submit_calls.lock().unwrap().clone()
    }

    pub(crate) fn verify_calls(&self) -> Vec<String> {
        self.verify_calls.lock().unwrap().clone()
    }

    pub(crate) fn download_calls(&self) -> Vec<String> {
        self.download_calls.lock().unwrap().clone()
    }

    fn next_submit(
        &self,
        direction: Direction,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<SubmitResponse, SubmitError> {
        self.submit_calls
            .lock()
            .unwrap()
            .push((direction, start, end));
        self.submits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SubmitError::Transport("no scripted answer".into())))
    }
}

#[async_trait]
impl SatService for ScriptedService {
    async fn submit_issued(
        &self,
        _token: &Token,
        query: &IssuedQuery,
    ) -> Result<SubmitResponse, SubmitError> {
        assert_eq!(query.issuer_rfc, query.query.taxpayer_id);
        self.next_submit(Direction::Issued, query.query.start_date, query.query.end_date)
    }

    async fn submit_received(
        &self,
        _token: &Token,
        query: &ReceivedQuery,
    ) -> Result<SubmitResponse, SubmitError> {
        assert_eq!(query.receiver_rfc, query.query.taxpayer_id);
        self.next_submit(
            Direction::Received,
            query.query.start_date,
            query.query.end_date,
        )
    }

    async fn verify(
        &self,
        _token: &Token,
        _taxpayer_id: &str,
        request_id: &RequestId,
    ) -> Result<VerifyResponse, VerifyError> {
        self.verify_calls
            .lock()
            .unwrap()
            .push(request_id.to_string());
        self.verifies
            .lock()
            .unwrap()
            .get_mut(request_id.as_str())
            .and_then(|script| script.pop_front())
            .unwrap_or_else(|| Ok(Self::state(2, &[])))
    }

    async fn download(
        &self,
        _token: &Token,
        _taxpayer_id: &str,
        package_id: &str,
    ) -> Result<DownloadResponse, FetchError> {
        self.download_calls
            .lock()
            .unwrap()
            .push(package_id.to_string());

        if let Some(error) = self
            .download_failures
            .lock()
            .unwrap()
            .get_mut(package_id)
            .and_then(|queue| queue.pop_front())
        {
            return Err(error);
        }

        match self.packages.lock().unwrap().get(package_id) {
            Some(bytes) => Ok(DownloadResponse {
                status_code: "5000".into(),
                message: "Solicitud Aceptada".into(),
                payload_base64: Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            }),
            None => Ok(DownloadResponse {
                status_code: "5004".into(),
                message: "No se encontró la información".into(),
                payload_base64: None,
            }),
        }
    }
}
