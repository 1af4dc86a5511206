use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::document::DocumentState;

/// Failures raised while fiscalizing a document.
///
/// Components return these typed failures; only the pipeline decides whether
/// a failure is retried, surfaced, or treated as fatal, based on [`kind`](Self::kind).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FiscalError {
    /// Malformed or incomplete invoice input. Never retried.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Credential problem while signing. Requires operator remediation.
    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),

    /// Connectivity or server-side failure; retried with backoff.
    #[error("transient network failure: {0}")]
    TransientNetwork(#[from] TransientError),

    /// Business-level rejection by the tax authority.
    #[error("rejected by authority: {0}")]
    AuthorityRejection(#[from] Rejection),

    /// Status never reached a terminal state within the polling window.
    #[error("status of {track_id} still pending after {waited:?}")]
    Timeout { track_id: String, waited: Duration },

    /// A step was requested that the document's lifecycle does not allow.
    #[error("invalid transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: DocumentState,
        to: DocumentState,
    },

    /// The document store could not persist or load a document.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FiscalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Signing(_) => ErrorKind::Signing,
            Self::TransientNetwork(_) => ErrorKind::TransientNetwork,
            Self::AuthorityRejection(_) => ErrorKind::AuthorityRejection,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Store(_) => ErrorKind::Store,
        }
    }
}

/// Discriminant of [`FiscalError`], stored in a document's `last_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    Signing,
    TransientNetwork,
    AuthorityRejection,
    Timeout,
    InvalidTransition,
    Store,
}

impl ErrorKind {
    /// Only transient network failures are retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork)
    }
}

/// A single invoice validation failure, naming the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dot-separated path to the invalid field (e.g. "lines.2.quantity").
    pub field: String,
    /// Human-readable error description.
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// A required field that is absent or blank.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(field, "required field is missing")
    }
}

/// Credential-related signing failures, plus structural problems with the
/// document handed to the signer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SigningError {
    #[error("certificate expired")]
    CertificateExpired { not_after: DateTime<Utc> },

    #[error("certificate not yet valid")]
    CertificateNotYetValid { not_before: DateTime<Utc> },

    #[error("invalid credential")]
    InvalidCredential { reason: String },

    /// The document lacks the reserved extension block or is not well-formed.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// Digest or signature mismatch during verification.
    #[error("signature verification failed: {0}")]
    Verification(String),
}

impl SigningError {
    pub(crate) fn invalid_credential(reason: impl Into<String>) -> Self {
        Self::InvalidCredential {
            reason: reason.into(),
        }
    }
}

/// Transient failure talking to the authority.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransientError {
    pub message: String,
    /// HTTP status, when the failure came with a response.
    pub http_status: Option<u16>,
}

impl TransientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            http_status: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            http_status: Some(status),
        }
    }
}

/// Failure reported by a document store backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("document store failure: {0}")]
pub struct StoreError(pub String);

/// Authority rejection with its structured error codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message} {}", format_codes(.errors))]
pub struct Rejection {
    pub message: String,
    pub errors: Vec<AuthorityErrorDetail>,
    pub http_status: Option<u16>,
}

/// One `{code, message}` entry of an authority response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityErrorDetail {
    pub code: String,
    pub message: String,
}

fn format_codes(errors: &[AuthorityErrorDetail]) -> String {
    let codes: Vec<&str> = errors.iter().map(|e| e.code.as_str()).collect();
    format!("[{}]", codes.join(", "))
}
