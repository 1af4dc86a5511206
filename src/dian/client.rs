use std::future::Future;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use url::Url;

use super::config::{ConfigError, DianConfig};
use super::response::{AuthorityResponse, ErrorBody};
use crate::core::{FiscalError, Rejection, SoftwareIdentity, TransientError};

/// Failure of a single authority call, already classified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Outcome unknown or server-side trouble; safe to retry.
    #[error(transparent)]
    Transient(#[from] TransientError),
    /// The authority refused the request itself (HTTP 4xx).
    #[error(transparent)]
    Rejected(#[from] Rejection),
}

impl From<ClientError> for FiscalError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Transient(t) => FiscalError::TransientNetwork(t),
            ClientError::Rejected(r) => FiscalError::AuthorityRejection(r),
        }
    }
}

/// The two authority endpoints.
///
/// Implementations classify failures but never retry; retry policy belongs
/// to the pipeline.
pub trait AuthorityClient: Send + Sync {
    /// `POST validateDocument` with the signed document.
    fn submit(
        &self,
        software: &SoftwareIdentity,
        signed_xml: &[u8],
    ) -> impl Future<Output = Result<AuthorityResponse, ClientError>> + Send;

    /// `GET documentStatus/{track_id}`.
    fn status(
        &self,
        software: &SoftwareIdentity,
        track_id: &str,
    ) -> impl Future<Output = Result<AuthorityResponse, ClientError>> + Send;
}

/// [`AuthorityClient`] over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpAuthorityClient {
    http: Client,
    config: DianConfig,
    submit_url: Url,
}

impl HttpAuthorityClient {
    pub fn new(config: DianConfig) -> Result<Self, ConfigError> {
        if config.base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidUrl(
                config.base_url.to_string(),
                "not a base URL".to_string(),
            ));
        }
        let submit_url = config
            .submit_url()
            .map_err(|e| ConfigError::InvalidUrl(config.base_url.to_string(), e.to_string()))?;
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self {
            http,
            config,
            submit_url,
        })
    }

    pub fn config(&self) -> &DianConfig {
        &self.config
    }

    fn request(&self, builder: reqwest::RequestBuilder, software: &SoftwareIdentity) -> reqwest::RequestBuilder {
        builder
            .header("software-id", software.software_id())
            .header("technical-key", software.technical_key())
    }
}

impl AuthorityClient for HttpAuthorityClient {
    async fn submit(
        &self,
        software: &SoftwareIdentity,
        signed_xml: &[u8],
    ) -> Result<AuthorityResponse, ClientError> {
        tracing::debug!(url = %self.submit_url, bytes = signed_xml.len(), "submitting document");
        let request = self
            .request(self.http.post(self.submit_url.clone()), software)
            .header(CONTENT_TYPE, "application/xml")
            .body(signed_xml.to_vec());
        read_response(request.send().await).await
    }

    async fn status(
        &self,
        software: &SoftwareIdentity,
        track_id: &str,
    ) -> Result<AuthorityResponse, ClientError> {
        let url = self
            .config
            .status_url(track_id)
            .map_err(|e| TransientError::new(format!("cannot build status URL: {e}")))?;
        tracing::debug!(url = %url, "querying document status");
        read_response(self.request(self.http.get(url), software).send().await).await
    }
}

async fn read_response(
    sent: Result<reqwest::Response, reqwest::Error>,
) -> Result<AuthorityResponse, ClientError> {
    let response = sent.map_err(|e| TransientError::new(format!("transport error: {e}")))?;
    let status = response.status();
    let body = response.bytes().await.map_err(|e| {
        TransientError::with_status(format!("cannot read response body: {e}"), status.as_u16())
    })?;
    classify(status, &body)
}

/// Map an HTTP status and body to a response or a classified failure.
pub(crate) fn classify(status: StatusCode, body: &[u8]) -> Result<AuthorityResponse, ClientError> {
    let code = status.as_u16();
    if status.is_success() {
        // The request may have been processed; only a retry can tell.
        return serde_json::from_slice(body).map_err(|e| {
            TransientError::with_status(format!("undecodable response: {e}"), code).into()
        });
    }
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        return Err(TransientError::with_status(format!("HTTP {code}"), code).into());
    }
    if status.is_client_error() {
        let body: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
        return Err(body.into_rejection(code).into());
    }
    Err(TransientError::with_status(format!("unexpected HTTP {code}"), code).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dian::AuthorityStatus;

    #[test]
    fn classify_statuses() {
        let ok = classify(StatusCode::OK, br#"{"status":"SUCCESS","trackId":"T1"}"#).unwrap();
        assert_eq!(ok.status, AuthorityStatus::Success);

        for code in [408u16, 429, 500, 502, 503] {
            let status = StatusCode::from_u16(code).unwrap();
            match classify(status, b"") {
                Err(ClientError::Transient(t)) => assert_eq!(t.http_status, Some(code)),
                other => panic!("{code}: {other:?}"),
            }
        }

        let body = br#"{"errors":[{"code":"CUST-404","message":"customer not found"}]}"#;
        match classify(StatusCode::BAD_REQUEST, body) {
            Err(ClientError::Rejected(r)) => {
                assert_eq!(r.errors[0].code, "CUST-404");
                assert_eq!(r.http_status, Some(400));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn undecodable_success_is_transient() {
        assert!(matches!(
            classify(StatusCode::OK, b"<html>gateway</html>"),
            Err(ClientError::Transient(_))
        ));
    }

    #[test]
    fn plain_text_4xx_gets_synthetic_code() {
        match classify(StatusCode::UNAUTHORIZED, b"nope") {
            Err(ClientError::Rejected(r)) => assert_eq!(r.errors[0].code, "HTTP-401"),
            other => panic!("{other:?}"),
        }
    }
}
