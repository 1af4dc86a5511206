//! Orchestration of one document through its lifecycle.
//!
//! ```text
//! Draft -> Fingerprinted -> Assembled -> Signed -> Submitted -> Accepted
//!   |            |              |          |  \          |  \
//!   v            v              v          v   Rejected  v   Rejected
//! Error        Error          Error      Error         Error
//! ```
//!
//! The pipeline is the only code that mutates a [`FiscalDocument`]. Each
//! committed transition is saved to the [`DocumentStore`] before the next
//! step starts, and only the pipeline decides whether a failure is retried
//! (transient network trouble during submission), terminal (`Rejected`), or
//! needs an operator (`Error`).

mod store;

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;

pub use crate::dian::{CancelHandle, Cancellation, cancellation};
pub use store::{DocumentStore, InMemoryDocumentStore};

use crate::core::*;
use crate::dian::{
    AuthorityClient, DianConfig, StatusTracker, SubmissionClient, TrackOutcome,
};
use crate::ubl;
use crate::xades::DocumentSigner;

/// Background resolution started when a run is cancelled after the document
/// may already have reached the authority.
pub type TrackingHandle = JoinHandle<Result<FiscalDocument, FiscalError>>;

/// Result of [`FiscalDocumentPipeline::run`].
#[derive(Debug)]
pub enum RunOutcome {
    /// The document reached `Accepted`, `Rejected` or `Error`.
    Finished(FiscalDocument),
    /// Stopped at the last committed state.
    ///
    /// When the authority may already have the document, `tracking` follows
    /// it to a verdict in the background and commits the result to the
    /// store: a `Submitted` document is polled, a `Signed` one with failed
    /// attempts is resubmitted unchanged to learn its track id first. The
    /// `document` here is the state at cancellation time.
    Cancelled {
        document: FiscalDocument,
        tracking: Option<TrackingHandle>,
    },
}

impl RunOutcome {
    pub fn document(&self) -> &FiscalDocument {
        match self {
            Self::Finished(document) | Self::Cancelled { document, .. } => document,
        }
    }

    pub fn into_document(self) -> FiscalDocument {
        match self {
            Self::Finished(document) | Self::Cancelled { document, .. } => document,
        }
    }
}

/// Drives documents from `Draft` to a final state.
///
/// One pipeline serves many documents concurrently; the signer, the
/// authority client and the store are shared through `Arc`s. A single
/// document is owned by the run processing it, so no two steps of the same
/// document ever overlap.
pub struct FiscalDocumentPipeline<S, C, D> {
    signer: Arc<S>,
    client: Arc<C>,
    store: Arc<D>,
    config: DianConfig,
}

impl<S, C, D> Clone for FiscalDocumentPipeline<S, C, D> {
    fn clone(&self) -> Self {
        Self {
            signer: Arc::clone(&self.signer),
            client: Arc::clone(&self.client),
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S, C, D> FiscalDocumentPipeline<S, C, D>
where
    S: DocumentSigner + 'static,
    C: AuthorityClient + 'static,
    D: DocumentStore + 'static,
{
    pub fn new(signer: Arc<S>, client: Arc<C>, config: DianConfig, store: Arc<D>) -> Self {
        Self {
            signer,
            client,
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<D> {
        &self.store
    }

    pub fn config(&self) -> &DianConfig {
        &self.config
    }

    /// Create a `Draft` document for `input` and run it.
    pub async fn start(
        &self,
        id: DocumentId,
        input: &InvoiceInput,
        cancel: Cancellation,
    ) -> Result<RunOutcome, FiscalError> {
        let document = FiscalDocument::new(id);
        self.store.save(&document)?;
        self.run(document, input, cancel).await
    }

    /// Load a stored document and continue it; the operator restart path
    /// for documents in `Error`.
    pub async fn resume(
        &self,
        id: &DocumentId,
        input: &InvoiceInput,
        cancel: Cancellation,
    ) -> Result<RunOutcome, FiscalError> {
        let document = self
            .store
            .load(id)?
            .ok_or_else(|| StoreError(format!("document {id} not found")))?;
        self.run(document, input, cancel).await
    }

    /// Advance `document` from its current state as far as possible.
    ///
    /// A document in `Error` continues from its last successful state: a
    /// `Signed` one is submitted again, a `Submitted` one is only polled
    /// again with its existing track id. Terminal documents are refused.
    pub async fn run(
        &self,
        mut document: FiscalDocument,
        input: &InvoiceInput,
        mut cancel: Cancellation,
    ) -> Result<RunOutcome, FiscalError> {
        let state = document.state();
        if state.is_terminal() {
            return Err(FiscalError::InvalidTransition {
                from: state,
                to: state,
            });
        }
        if state == DocumentState::Error {
            document.reopen()?;
            tracing::info!(
                document_id = %document.id(),
                resume = %document.state(),
                attempts = document.submission_attempts(),
                "restarting document"
            );
            self.store.save(&document)?;
        }

        loop {
            let state = document.state();
            if cancel.is_cancelled() && !state.is_terminal() && state != DocumentState::Error {
                return Ok(self.cancelled(document));
            }
            match state {
                DocumentState::Draft => self.fingerprint(&mut document, input)?,
                DocumentState::Fingerprinted => self.assemble(&mut document, input)?,
                DocumentState::Assembled => self.sign(&mut document)?,
                DocumentState::Signed => {
                    if !self.submit(&mut document, &mut cancel).await? {
                        return Ok(self.cancelled(document));
                    }
                }
                DocumentState::Submitted => {
                    if !self.track(&mut document, &mut cancel).await? {
                        return Ok(self.cancelled(document));
                    }
                }
                DocumentState::Accepted | DocumentState::Rejected | DocumentState::Error => {
                    return Ok(RunOutcome::Finished(document));
                }
            }
        }
    }

    fn fingerprint(
        &self,
        document: &mut FiscalDocument,
        input: &InvoiceInput,
    ) -> Result<(), FiscalError> {
        let fingerprinted = compute_fingerprint(input).and_then(|fingerprint| {
            if input.software_id.trim().is_empty() {
                return Err(ValidationError::missing("software_id"));
            }
            Ok(fingerprint)
        });
        match fingerprinted {
            Ok(fingerprint) => {
                document.set_fingerprint(fingerprint, input.software_identity())?;
                commit(self.store.as_ref(), document, DocumentState::Fingerprinted)
            }
            Err(e) => fail(self.store.as_ref(), document, DocumentState::Error, e.into()),
        }
    }

    fn assemble(
        &self,
        document: &mut FiscalDocument,
        input: &InvoiceInput,
    ) -> Result<(), FiscalError> {
        let fingerprint = document
            .fingerprint()
            .cloned()
            .ok_or(FiscalError::InvalidTransition {
                from: document.state(),
                to: DocumentState::Assembled,
            })?;
        let assembled = compute_fingerprint(input).and_then(|current| {
            if current != fingerprint {
                return Err(ValidationError::new(
                    "fingerprint",
                    "invoice changed since it was fingerprinted",
                ));
            }
            ubl::assemble(input, &fingerprint)
        });
        match assembled {
            Ok(xml) => {
                document.set_raw_xml(xml)?;
                commit(self.store.as_ref(), document, DocumentState::Assembled)
            }
            Err(e) => fail(self.store.as_ref(), document, DocumentState::Error, e.into()),
        }
    }

    fn sign(&self, document: &mut FiscalDocument) -> Result<(), FiscalError> {
        let signed = match document.raw_xml() {
            Some(raw) => self.signer.sign(raw, Utc::now()),
            None => {
                return Err(FiscalError::InvalidTransition {
                    from: document.state(),
                    to: DocumentState::Signed,
                });
            }
        };
        match signed {
            Ok(xml) => {
                document.set_signed_xml(xml)?;
                commit(self.store.as_ref(), document, DocumentState::Signed)
            }
            Err(e) => fail(self.store.as_ref(), document, DocumentState::Error, e.into()),
        }
    }

    /// Submission with retries. `Ok(false)` when cancelled during a backoff.
    async fn submit(
        &self,
        document: &mut FiscalDocument,
        cancel: &mut Cancellation,
    ) -> Result<bool, FiscalError> {
        let (software, signed_xml) = match (document.software(), document.signed_xml()) {
            (Some(software), Some(xml)) => (software.clone(), xml.to_vec()),
            _ => {
                return Err(FiscalError::InvalidTransition {
                    from: document.state(),
                    to: DocumentState::Submitted,
                });
            }
        };
        let policy = self.config.submission;
        let submission = SubmissionClient::new(Arc::clone(&self.client));
        let mut failures = 0u32;

        loop {
            let result = submission
                .submit_once(&software, &signed_xml, document.track_id())
                .await;
            match result {
                Ok(outcome) => {
                    if outcome.duplicate {
                        tracing::info!(
                            document_id = %document.id(),
                            track_id = %outcome.track_id,
                            "authority already had this fingerprint"
                        );
                    }
                    document.set_track_id(outcome.track_id)?;
                    commit(self.store.as_ref(), document, DocumentState::Submitted)?;
                    return Ok(true);
                }
                Err(e) if e.kind().is_retryable() => {
                    failures += 1;
                    document.record_attempt();
                    document.record_error(&e);
                    if failures >= policy.max_attempts {
                        tracing::error!(
                            document_id = %document.id(),
                            attempts = document.submission_attempts(),
                            error = %e,
                            "giving up on submission"
                        );
                        fail(self.store.as_ref(), document, DocumentState::Error, e)?;
                        return Ok(true);
                    }
                    self.store.save(document)?;
                    let delay = policy.backoff.delay(failures);
                    tracing::warn!(
                        document_id = %document.id(),
                        attempt = failures,
                        max_attempts = policy.max_attempts,
                        ?delay,
                        error = %e,
                        "submission failed, retrying"
                    );
                    if !cancel.sleep(delay).await {
                        return Ok(false);
                    }
                }
                Err(e @ FiscalError::AuthorityRejection(_)) => {
                    fail(self.store.as_ref(), document, DocumentState::Rejected, e)?;
                    return Ok(true);
                }
                Err(e) => {
                    fail(self.store.as_ref(), document, DocumentState::Error, e)?;
                    return Ok(true);
                }
            }
        }
    }

    /// Status tracking. `Ok(false)` when cancelled between polls.
    async fn track(
        &self,
        document: &mut FiscalDocument,
        cancel: &mut Cancellation,
    ) -> Result<bool, FiscalError> {
        let (software, track_id) = tracking_inputs(document)?;
        let tracker = StatusTracker::new(Arc::clone(&self.client), self.config.polling);
        let outcome = tracker.track(&software, &track_id, cancel).await;
        match settle(self.store.as_ref(), document, outcome)? {
            Settled::Done => Ok(true),
            Settled::Cancelled => Ok(false),
        }
    }

    fn cancelled(&self, document: FiscalDocument) -> RunOutcome {
        tracing::info!(
            document_id = %document.id(),
            state = %document.state(),
            "run cancelled"
        );
        let tracking = match document.state() {
            DocumentState::Submitted => Some(self.detach_tracking(document.clone())),
            // A failed attempt may still have been received.
            DocumentState::Signed if document.submission_attempts() > 0 => {
                Some(self.detach_resolution(document.clone()))
            }
            _ => None,
        };
        RunOutcome::Cancelled { document, tracking }
    }

    /// Resubmit the same signed bytes until the authority answers, then
    /// track the answer to a verdict. A `DUPLICATE` reply carries the track
    /// id of the attempt that got through.
    fn detach_resolution(&self, mut document: FiscalDocument) -> TrackingHandle {
        let pipeline = self.clone();
        tokio::spawn(async move {
            tracing::info!(
                document_id = %document.id(),
                attempts = document.submission_attempts(),
                "resolving submission in background"
            );
            let mut never = Cancellation::never();
            pipeline.submit(&mut document, &mut never).await?;
            if document.state() == DocumentState::Submitted {
                pipeline.track(&mut document, &mut never).await?;
            }
            Ok::<_, FiscalError>(document)
        })
    }

    /// The authority may accept a submitted document regardless of local
    /// cancellation, so it is tracked to a verdict in the background.
    fn detach_tracking(&self, mut document: FiscalDocument) -> TrackingHandle {
        let tracker = StatusTracker::new(Arc::clone(&self.client), self.config.polling);
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let (software, track_id) = tracking_inputs(&document)?;
            tracing::info!(document_id = %document.id(), %track_id, "tracking detached");
            let mut never = Cancellation::never();
            let outcome = tracker.track(&software, &track_id, &mut never).await;
            settle(store.as_ref(), &mut document, outcome)?;
            Ok::<_, FiscalError>(document)
        })
    }
}

enum Settled {
    Done,
    Cancelled,
}

fn tracking_inputs(document: &FiscalDocument) -> Result<(SoftwareIdentity, String), FiscalError> {
    match (document.software(), document.track_id()) {
        (Some(software), Some(track_id)) => Ok((software.clone(), track_id.to_string())),
        _ => Err(FiscalError::InvalidTransition {
            from: document.state(),
            to: DocumentState::Accepted,
        }),
    }
}

/// Commit the result of status tracking.
fn settle<D: DocumentStore + ?Sized>(
    store: &D,
    document: &mut FiscalDocument,
    outcome: Result<TrackOutcome, FiscalError>,
) -> Result<Settled, FiscalError> {
    match outcome {
        Ok(TrackOutcome::Accepted { .. }) => {
            commit(store, document, DocumentState::Accepted)?;
            Ok(Settled::Done)
        }
        Ok(TrackOutcome::Rejected { rejection, .. }) => {
            fail(store, document, DocumentState::Rejected, rejection.into())?;
            Ok(Settled::Done)
        }
        Ok(TrackOutcome::Cancelled { .. }) => Ok(Settled::Cancelled),
        Err(e) => {
            fail(store, document, DocumentState::Error, e)?;
            Ok(Settled::Done)
        }
    }
}

fn commit<D: DocumentStore + ?Sized>(
    store: &D,
    document: &mut FiscalDocument,
    to: DocumentState,
) -> Result<(), FiscalError> {
    let from = document.state();
    document.transition(to)?;
    tracing::info!(document_id = %document.id(), %from, %to, "state committed");
    store.save(document)?;
    Ok(())
}

/// Move to `Error` or `Rejected` and record why.
fn fail<D: DocumentStore + ?Sized>(
    store: &D,
    document: &mut FiscalDocument,
    to: DocumentState,
    error: FiscalError,
) -> Result<(), FiscalError> {
    let from = document.state();
    document.transition(to)?;
    document.record_error(&error);
    if to == DocumentState::Rejected {
        tracing::warn!(
            document_id = %document.id(),
            %from,
            track_id = document.track_id().unwrap_or_default(),
            kind = ?error.kind(),
            %error,
            "document rejected"
        );
    } else {
        tracing::error!(
            document_id = %document.id(),
            %from,
            track_id = document.track_id().unwrap_or_default(),
            kind = ?error.kind(),
            %error,
            "document needs attention"
        );
    }
    store.save(document)?;
    Ok(())
}
