use serde::{Deserialize, Serialize};

use crate::core::{AuthorityErrorDetail, Rejection};

/// Status field of submission and status responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorityStatus {
    Success,
    Error,
    /// The fingerprint was already received; carries the original track id.
    Duplicate,
    Pending,
    RetryLater,
    /// Any status this client does not know; treated as not yet final.
    #[serde(other)]
    Unknown,
}

/// JSON body returned by `validateDocument` and `documentStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorityResponse {
    pub status: AuthorityStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub track_id: Option<String>,
    #[serde(default)]
    pub errors: Option<Vec<AuthorityErrorDetail>>,
}

impl AuthorityResponse {
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }

    /// Track id, ignoring blank values.
    pub fn track_id(&self) -> Option<&str> {
        self.track_id.as_deref().filter(|id| !id.trim().is_empty())
    }

    pub fn into_rejection(self, http_status: Option<u16>) -> Rejection {
        let message = match self.message {
            Some(m) if !m.trim().is_empty() => m,
            _ => "document rejected".to_string(),
        };
        Rejection {
            message,
            errors: self.errors.unwrap_or_default(),
            http_status,
        }
    }
}

/// Error body of a 4xx response; every field is optional.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Option<Vec<AuthorityErrorDetail>>,
}

impl ErrorBody {
    /// Rejection for an HTTP client error, with a synthetic `HTTP-{status}`
    /// entry when the body lists no error codes.
    pub fn into_rejection(self, http_status: u16) -> Rejection {
        let message = self
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("HTTP {http_status}"));
        let errors = match self.errors {
            Some(errors) if !errors.is_empty() => errors,
            _ => vec![AuthorityErrorDetail {
                code: format!("HTTP-{http_status}"),
                message: message.clone(),
            }],
        };
        Rejection {
            message,
            errors,
            http_status: Some(http_status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_submission_response() {
        let json = r#"{"status":"DUPLICATE","message":"already received","trackId":"TRK-9","errors":null}"#;
        let resp: AuthorityResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.status, AuthorityStatus::Duplicate);
        assert_eq!(resp.track_id(), Some("TRK-9"));
        assert_eq!(resp.message(), "already received");
    }

    #[test]
    fn tolerates_missing_fields_and_new_statuses() {
        let resp: AuthorityResponse = serde_json::from_str(r#"{"status":"IN_REVIEW"}"#).unwrap();
        assert_eq!(resp.status, AuthorityStatus::Unknown);
        assert_eq!(resp.track_id(), None);
        let resp: AuthorityResponse =
            serde_json::from_str(r#"{"status":"RETRY_LATER","trackId":" "}"#).unwrap();
        assert_eq!(resp.status, AuthorityStatus::RetryLater);
        assert_eq!(resp.track_id(), None);
    }

    #[test]
    fn error_body_without_codes_gets_synthetic_entry() {
        let rejection = ErrorBody::default().into_rejection(422);
        assert_eq!(rejection.errors[0].code, "HTTP-422");
        assert_eq!(rejection.http_status, Some(422));
    }
}
