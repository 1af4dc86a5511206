use std::sync::Arc;

use tokio::time::Instant;

use super::cancel::Cancellation;
use super::client::{AuthorityClient, ClientError};
use super::config::PollPolicy;
use super::response::AuthorityStatus;
use crate::core::{FiscalError, Rejection, SoftwareIdentity};

/// How status tracking ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Accepted { polls: u32 },
    Rejected { rejection: Rejection, polls: u32 },
    /// Stopped waiting; the document is still pending at the authority.
    Cancelled { polls: u32 },
}

/// Polls `documentStatus` until the authority reaches a verdict.
#[derive(Debug)]
pub struct StatusTracker<C> {
    client: Arc<C>,
    policy: PollPolicy,
}

impl<C> Clone for StatusTracker<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            policy: self.policy,
        }
    }
}

impl<C: AuthorityClient> StatusTracker<C> {
    pub fn new(client: Arc<C>, policy: PollPolicy) -> Self {
        Self { client, policy }
    }

    /// Poll with backoff until `SUCCESS` or `ERROR`.
    ///
    /// Transient failures count as "still pending". Fails with
    /// [`FiscalError::Timeout`] once the overall deadline passes, or with
    /// [`FiscalError::AuthorityRejection`] when the status query itself is
    /// refused (the document's own verdict is still unknown then).
    pub async fn track(
        &self,
        software: &SoftwareIdentity,
        track_id: &str,
        cancel: &mut Cancellation,
    ) -> Result<TrackOutcome, FiscalError> {
        let started = Instant::now();
        let deadline = started + self.policy.overall_timeout;
        let timeout = || FiscalError::Timeout {
            track_id: track_id.to_string(),
            waited: started.elapsed(),
        };
        let mut polls = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Ok(TrackOutcome::Cancelled { polls });
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timeout());
            }

            polls += 1;
            let polled = tokio::time::timeout(remaining, self.client.status(software, track_id))
                .await
                .map_err(|_| timeout())?;
            match polled {
                Ok(response) => match response.status {
                    AuthorityStatus::Success => {
                        tracing::info!(track_id, polls, "authority accepted document");
                        return Ok(TrackOutcome::Accepted { polls });
                    }
                    AuthorityStatus::Error => {
                        let rejection = response.into_rejection(None);
                        tracing::warn!(track_id, polls, %rejection, "authority rejected document");
                        return Ok(TrackOutcome::Rejected { rejection, polls });
                    }
                    status => {
                        tracing::debug!(track_id, polls, ?status, "document still pending");
                    }
                },
                Err(ClientError::Transient(e)) => {
                    tracing::warn!(track_id, polls, error = %e, "status query failed, still pending");
                }
                Err(ClientError::Rejected(r)) => {
                    tracing::error!(track_id, polls, rejection = %r, "status query refused");
                    return Err(r.into());
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let delay = self.policy.backoff.delay(polls).min(remaining);
            if !cancel.sleep(delay).await {
                return Ok(TrackOutcome::Cancelled { polls });
            }
        }
    }
}
