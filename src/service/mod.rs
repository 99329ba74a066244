//! Remote mass-download service
//!
//! The service exposes four operations: two submission contracts (issued and
//! received invoices are separate services, not one parameterised call), a
//! verification call, and a package download. [`SatService`] is the seam the
//! rest of the crate talks to; [`HttpSatService`] is the production adapter.

mod http;

pub use http::HttpSatService;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::auth::Token;
use crate::error::{FetchError, SubmitError, VerifyError};
use crate::types::{DateRange, RequestId, RequestKind};

/// Fields shared by both submission contracts
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuery {
    /// Taxpayer making the request
    pub taxpayer_id: String,
    /// First day requested
    pub start_date: NaiveDate,
    /// Last day requested (inclusive)
    pub end_date: NaiveDate,
    /// Metadata listing or full documents
    pub request_kind: &'static str,
}

impl SubmitQuery {
    /// Build the common part of a submission for one sub-range
    pub fn new(taxpayer_id: &str, range: DateRange, kind: RequestKind) -> Self {
        Self {
            taxpayer_id: taxpayer_id.to_string(),
            start_date: range.start(),
            end_date: range.end(),
            request_kind: kind.as_str(),
        }
    }
}

/// Submission for invoices the taxpayer issued, filtered by issuer RFC
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedQuery {
    /// Common fields
    #[serde(flatten)]
    pub query: SubmitQuery,
    /// Issuer filter
    pub issuer_rfc: String,
}

/// Submission for invoices the taxpayer received, filtered by receiver RFC
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedQuery {
    /// Common fields
    #[serde(flatten)]
    pub query: SubmitQuery,
    /// Receiver filter
    pub receiver_rfc: String,
}

/// Answer to a submission
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    /// Service status code
    #[serde(default, deserialize_with = "lenient::string")]
    pub status_code: String,
    /// Service message
    #[serde(default, deserialize_with = "lenient::string")]
    pub message: String,
    /// Identifier of the registered request, when one was registered
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Answer to a verification
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Service status code
    #[serde(default, deserialize_with = "lenient::string")]
    pub status_code: String,
    /// Service message
    #[serde(default, deserialize_with = "lenient::string")]
    pub message: String,
    /// Request state code, when reported
    #[serde(default, deserialize_with = "lenient::optional_i32")]
    pub state_code: Option<i32>,
    /// Packages available for download, in service order
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub package_ids: Vec<String>,
}

/// Answer to a package download
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    /// Service status code
    #[serde(default, deserialize_with = "lenient::string")]
    pub status_code: String,
    /// Service message
    #[serde(default, deserialize_with = "lenient::string")]
    pub message: String,
    /// Package bytes, base64-encoded
    #[serde(default)]
    pub payload_base64: Option<String>,
}

/// The remote operations the batch depends on
#[async_trait]
pub trait SatService: Send + Sync {
    /// Register a request for issued invoices
    async fn submit_issued(
        &self,
        token: &Token,
        query: &IssuedQuery,
    ) -> Result<SubmitResponse, SubmitError>;

    /// Register a request for received invoices
    async fn submit_received(
        &self,
        token: &Token,
        query: &ReceivedQuery,
    ) -> Result<SubmitResponse, SubmitError>;

    /// Ask for the state of a registered request
    async fn verify(
        &self,
        token: &Token,
        taxpayer_id: &str,
        request_id: &RequestId,
    ) -> Result<VerifyResponse, VerifyError>;

    /// Download one package
    async fn download(
        &self,
        token: &Token,
        taxpayer_id: &str,
        package_id: &str,
    ) -> Result<DownloadResponse, FetchError>;
}

#[async_trait]
impl<T: SatService + ?Sized> SatService for std::sync::Arc<T> {
    async fn submit_issued(
        &self,
        token: &Token,
        query: &IssuedQuery,
    ) -> Result<SubmitResponse, SubmitError> {
        (**self).submit_issued(token, query).await
    }

    async fn submit_received(
        &self,
        token: &Token,
        query: &ReceivedQuery,
    ) -> Result<SubmitResponse, SubmitError> {
        (**self).submit_received(token, query).await
    }

    async fn verify(
        &self,
        token: &Token,
        taxpayer_id: &str,
        request_id: &RequestId,
    ) -> Result<VerifyResponse, VerifyError> {
        (**self).verify(token, taxpayer_id, request_id).await
    }

    async fn download(
        &self,
        token: &Token,
        taxpayer_id: &str,
        package_id: &str,
    ) -> Result<DownloadResponse, FetchError> {
        (**self).download(token, taxpayer_id, package_id).await
    }
}

// Gateways are inconsistent about numbers versus strings for codes
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => String::new(),
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    pub fn optional_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Vec<String>>::deserialize(deserializer)?
            .unwrap_or_default()
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect())
    }
}
