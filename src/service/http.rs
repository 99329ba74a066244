//! HTTP adapter for the mass-download gateway

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{
    DownloadResponse, IssuedQuery, ReceivedQuery, SatService, SubmitResponse, VerifyResponse,
};
use crate::auth::Token;
use crate::config::{EndpointConfig, ServiceConfig};
use crate::error::{Error, FetchError, Result, SubmitError, VerifyError};
use crate::types::RequestId;

/// Why a call produced no usable answer
#[derive(Debug)]
enum CallError {
    /// Network failure, gateway error, or an unreadable body
    Transient(String),
    /// The gateway answered with a client error
    Refused { code: String, message: String },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyBody<'a> {
    taxpayer_id: &'a str,
    request_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadBody<'a> {
    taxpayer_id: &'a str,
    package_id: &'a str,
}

/// [`SatService`] over JSON/HTTP
///
/// Each operation is a `POST` to `<base_url>/<endpoint>` carrying the token in
/// the authority's `WRAP access_token="..."` authorization scheme.
#[derive(Clone, Debug)]
pub struct HttpSatService {
    client: reqwest::Client,
    base_url: String,
    endpoints: EndpointConfig,
}

impl HttpSatService {
    /// Build an adapter from the service settings
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        url::Url::parse(&config.base_url).map_err(|e| {
            Error::config(
                "service.base_url",
                format!("invalid URL {:?}: {}", config.base_url, e),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            endpoints: config.endpoints.clone(),
        })
    }

    fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post<B, R>(&self, path: &str, token: &Token, body: &B) -> std::result::Result<R, CallError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.endpoint_url(path);
        tracing::debug!(url = %url, "calling gateway");

        let response = self
            .client
            .post(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("WRAP access_token=\"{}\"", token.value()),
            )
            .json(body)
            .send()
            .await
            .map_err(|e| CallError::Transient(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CallError::Transient(format!("gateway returned {status}")));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CallError::Refused {
                code: status.as_u16().to_string(),
                message,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| CallError::Transient(format!("malformed response from {url}: {e}")))
    }

    async fn submit<B: Serialize + Sync>(
        &self,
        path: &str,
        token: &Token,
        body: &B,
    ) -> std::result::Result<SubmitResponse, SubmitError> {
        self.post(path, token, body).await.map_err(|e| match e {
            CallError::Transient(msg) => SubmitError::Transport(msg),
            CallError::Refused { code, message } => SubmitError::NoRequestId { code, message },
        })
    }
}

#[async_trait]
impl SatService for HttpSatService {
    async fn submit_issued(
        &self,
        token: &Token,
        query: &IssuedQuery,
    ) -> std::result::Result<SubmitResponse, SubmitError> {
        self.submit(&self.endpoints.submit_issued, token, query).await
    }

    async fn submit_received(
        &self,
        token: &Token,
        query: &ReceivedQuery,
    ) -> std::result::Result<SubmitResponse, SubmitError> {
        self.submit(&self.endpoints.submit_received, token, query)
            .await
    }

    async fn verify(
        &self,
        token: &Token,
        taxpayer_id: &str,
        request_id: &RequestId,
    ) -> std::result::Result<VerifyResponse, VerifyError> {
        let body = VerifyBody {
            taxpayer_id,
            request_id: request_id.as_str(),
        };
        self.post(&self.endpoints.verify, token, &body)
            .await
            .map_err(|e| match e {
                CallError::Transient(msg) => VerifyError::Transient(msg),
                CallError::Refused { code, message } => VerifyError::Rejected { code, message },
            })
    }

    async fn download(
        &self,
        token: &Token,
        taxpayer_id: &str,
        package_id: &str,
    ) -> std::result::Result<DownloadResponse, FetchError> {
        let body = DownloadBody {
            taxpayer_id,
            package_id,
        };
        self.post(&self.endpoints.download, token, &body)
            .await
            .map_err(|e| match e {
                CallError::Transient(msg) => FetchError::Transport(msg),
                CallError::Refused { code, message } => FetchError::NoPayload { code, message },
            })
    }
}
