//! Error types for cfdi-dl
//!
//! This module provides the error taxonomy for the library:
//! - [`Error`] for fatal, run-level failures (configuration, authentication)
//! - Per-stage errors ([`SubmitError`], [`VerifyError`], [`FetchError`]) that the
//!   batch converts into counter increments and log lines instead of aborting
//! - Machine-readable error codes for structured logging

use thiserror::Error;

/// Result type alias for cfdi-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for cfdi-dl
///
/// Only conditions that make the rest of the run pointless surface as an [`Error`]:
/// an invalid configuration or the impossibility of obtaining a token.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "rfc")
        key: Option<String>,
    },

    /// No token could be obtained from the authenticator
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Machine-readable error code, used as a structured log field
    pub fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Auth(AuthError::Rejected(_)) => "auth_rejected",
            Error::Auth(AuthError::Transport(_)) => "auth_transport",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
        }
    }
}

/// Authentication failures
#[derive(Debug, Error)]
pub enum AuthError {
    /// The authority refused the signing identity (bad certificate, revoked, wrong password)
    #[error("credentials rejected: {0}")]
    Rejected(String),

    /// The authentication service could not be reached
    #[error("authentication service unreachable: {0}")]
    Transport(String),
}

/// Failure to register a download request for one sub-range
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The service answered but did not assign a request identifier
    #[error("no request id returned (code={code}, message={message})")]
    NoRequestId {
        /// Status code reported by the service
        code: String,
        /// Message reported by the service
        message: String,
    },

    /// The request never produced a usable answer
    #[error("submission transport failure: {0}")]
    Transport(String),
}

/// Failure to query the state of a pending request
///
/// The two kinds are handled very differently by the polling engine: a
/// transient fault keeps the request for the next round, a rejection is final.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Network error, timeout, or a response that could not be parsed
    #[error("transient verification failure: {0}")]
    Transient(String),

    /// The service refused to report on the request
    #[error("verification rejected (code={code}, message={message})")]
    Rejected {
        /// Status code reported by the service
        code: String,
        /// Message reported by the service
        message: String,
    },
}

/// Failure to retrieve or persist one package
#[derive(Debug, Error)]
pub enum FetchError {
    /// The service answered without payload data
    #[error("no payload returned (code={code}, message={message})")]
    NoPayload {
        /// Status code reported by the service
        code: String,
        /// Message reported by the service
        message: String,
    },

    /// The package id cannot be used as a file name
    #[error("invalid package id: {0:?}")]
    InvalidPackageId(String),

    /// The payload was not valid base64
    #[error("failed to decode payload: {0}")]
    Decode(String),

    /// The request never produced a usable answer
    #[error("download transport failure: {0}")]
    Transport(String),

    /// Writing the package to disk failed
    #[error("failed to persist package: {0}")]
    Io(#[from] std::io::Error),
}

impl SubmitError {
    /// Machine-readable error code
    pub fn error_code(&self) -> &str {
        match self {
            SubmitError::NoRequestId { .. } => "no_request_id",
            SubmitError::Transport(_) => "submit_transport",
        }
    }
}

impl VerifyError {
    /// Machine-readable error code
    pub fn error_code(&self) -> &str {
        match self {
            VerifyError::Transient(_) => "verify_transient",
            VerifyError::Rejected { .. } => "verify_rejected",
        }
    }
}

impl FetchError {
    /// Machine-readable error code
    pub fn error_code(&self) -> &str {
        match self {
            FetchError::NoPayload { .. } => "no_payload",
            FetchError::InvalidPackageId(_) => "invalid_package_id",
            FetchError::Decode(_) => "decode_error",
            FetchError::Transport(_) => "fetch_transport",
            FetchError::Io(_) => "io_error",
        }
    }
}
