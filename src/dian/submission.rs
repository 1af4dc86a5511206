use std::sync::Arc;

use super::client::AuthorityClient;
use super::response::AuthorityStatus;
use crate::core::{FiscalError, SoftwareIdentity, TransientError};

/// A submission the authority has taken responsibility for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub track_id: String,
    /// The authority had already received this fingerprint.
    pub duplicate: bool,
}

/// Sends a signed document once and classifies the result.
///
/// `DUPLICATE` is a success like `SUCCESS`: the authority keys invoices by
/// fingerprint, so resubmitting after an ambiguous failure is safe.
#[derive(Debug)]
pub struct SubmissionClient<C> {
    client: Arc<C>,
}

impl<C> Clone for SubmissionClient<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<C: AuthorityClient> SubmissionClient<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// One attempt. `known_track_id` is the id of an earlier attempt, used
    /// when a duplicate response omits it.
    pub async fn submit_once(
        &self,
        software: &SoftwareIdentity,
        signed_xml: &[u8],
        known_track_id: Option<&str>,
    ) -> Result<SubmissionOutcome, FiscalError> {
        let response = self.client.submit(software, signed_xml).await?;
        match response.status {
            AuthorityStatus::Success => match response.track_id() {
                Some(id) => Ok(SubmissionOutcome {
                    track_id: id.to_string(),
                    duplicate: false,
                }),
                None => Err(TransientError::new("success response without track id").into()),
            },
            AuthorityStatus::Duplicate => {
                match response.track_id().or(known_track_id) {
                    Some(id) => Ok(SubmissionOutcome {
                        track_id: id.to_string(),
                        duplicate: true,
                    }),
                    None => Err(TransientError::new(
                        "duplicate response without track id and no earlier submission known",
                    )
                    .into()),
                }
            }
            AuthorityStatus::Error => Err(response.into_rejection(None).into()),
            AuthorityStatus::RetryLater | AuthorityStatus::Pending | AuthorityStatus::Unknown => {
                let message = match response.message() {
                    "" => format!("authority answered {:?}", response.status),
                    m => m.to_string(),
                };
                Err(TransientError::new(message).into())
            }
        }
    }
}
