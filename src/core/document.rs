use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{ErrorKind, FiscalError};
use super::fingerprint::Fingerprint;
use super::types::SoftwareIdentity;

/// Lifecycle state of a [`FiscalDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentState {
    Draft,
    Fingerprinted,
    Assembled,
    Signed,
    Submitted,
    Accepted,
    Rejected,
    Error,
}

impl DocumentState {
    /// `Accepted` and `Rejected` are final; nothing may change afterwards.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: DocumentState) -> bool {
        use DocumentState::*;
        matches!(
            (self, next),
            (Draft, Fingerprinted | Error)
                | (Fingerprinted, Assembled | Error)
                | (Assembled, Signed | Error)
                | (Signed, Submitted | Rejected | Error)
                | (Submitted, Accepted | Rejected | Error)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Fingerprinted => "fingerprinted",
            Self::Assembled => "assembled",
            Self::Signed => "signed",
            Self::Submitted => "submitted",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identifier of a fiscal document, one per invoice version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last recorded failure of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// One committed state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: DocumentState,
    pub to: DocumentState,
    pub at: DateTime<Utc>,
}

/// The signed, authority-submitted representation of one invoice.
///
/// Only the pipeline mutates a document; everyone else sees it through the
/// getters or a [`DocumentSnapshot`]. Artifacts (`fingerprint`, `raw_xml`,
/// `signed_xml`, `track_id`) are write-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiscalDocument {
    id: DocumentId,
    state: DocumentState,
    resume_state: DocumentState,
    fingerprint: Option<Fingerprint>,
    software: Option<SoftwareIdentity>,
    raw_xml: Option<Vec<u8>>,
    signed_xml: Option<Vec<u8>>,
    track_id: Option<String>,
    submission_attempts: u32,
    last_error: Option<LastError>,
    created_at: DateTime<Utc>,
    last_transition_at: DateTime<Utc>,
    history: Vec<Transition>,
}

impl FiscalDocument {
    /// A new document in `Draft`.
    pub fn new(id: DocumentId) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: DocumentState::Draft,
            resume_state: DocumentState::Draft,
            fingerprint: None,
            software: None,
            raw_xml: None,
            signed_xml: None,
            track_id: None,
            submission_attempts: 0,
            last_error: None,
            created_at: now,
            last_transition_at: now,
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn state(&self) -> DocumentState {
        self.state
    }

    /// State a restarted run continues from: the current state, or for a
    /// document in `Error`, the last state that was successfully reached.
    pub fn resume_state(&self) -> DocumentState {
        if self.state == DocumentState::Error {
            self.resume_state
        } else {
            self.state
        }
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    pub fn software(&self) -> Option<&SoftwareIdentity> {
        self.software.as_ref()
    }

    pub fn raw_xml(&self) -> Option<&[u8]> {
        self.raw_xml.as_deref()
    }

    pub fn signed_xml(&self) -> Option<&[u8]> {
        self.signed_xml.as_deref()
    }

    pub fn track_id(&self) -> Option<&str> {
        self.track_id.as_deref()
    }

    pub fn submission_attempts(&self) -> u32 {
        self.submission_attempts
    }

    pub fn last_error(&self) -> Option<&LastError> {
        self.last_error.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_transition_at(&self) -> DateTime<Utc> {
        self.last_transition_at
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            id: self.id.clone(),
            state: self.state,
            fingerprint: self.fingerprint.clone(),
            track_id: self.track_id.clone(),
            submission_attempts: self.submission_attempts,
            last_error: self.last_error.clone(),
            created_at: self.created_at,
            last_transition_at: self.last_transition_at,
        }
    }

    // ── Mutators (pipeline only) ────────────────────────────────────────

    /// Commit a state change. Progressing to a non-error state clears
    /// `last_error`.
    pub(crate) fn transition(&mut self, to: DocumentState) -> Result<(), FiscalError> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(FiscalError::InvalidTransition { from, to });
        }
        let now = Utc::now();
        if to != DocumentState::Error {
            self.last_error = None;
            self.resume_state = to;
        }
        self.state = to;
        self.last_transition_at = now;
        self.history.push(Transition { from, to, at: now });
        Ok(())
    }

    /// Leave `Error` so a run can continue from [`resume_state`](Self::resume_state).
    /// Artifacts, attempts and history are kept.
    pub(crate) fn reopen(&mut self) -> Result<(), FiscalError> {
        if self.state != DocumentState::Error {
            return Ok(());
        }
        let to = self.resume_state;
        let now = Utc::now();
        self.state = to;
        self.last_transition_at = now;
        self.history.push(Transition {
            from: DocumentState::Error,
            to,
            at: now,
        });
        Ok(())
    }

    pub(crate) fn record_error(&mut self, error: &FiscalError) {
        self.last_error = Some(LastError {
            kind: error.kind(),
            message: error.to_string(),
            at: Utc::now(),
        });
    }

    pub(crate) fn record_attempt(&mut self) {
        self.submission_attempts += 1;
    }

    pub(crate) fn set_fingerprint(
        &mut self,
        fingerprint: Fingerprint,
        software: SoftwareIdentity,
    ) -> Result<(), FiscalError> {
        self.guard_write(self.fingerprint.is_none(), DocumentState::Fingerprinted)?;
        self.fingerprint = Some(fingerprint);
        self.software = Some(software);
        Ok(())
    }

    pub(crate) fn set_raw_xml(&mut self, xml: Vec<u8>) -> Result<(), FiscalError> {
        self.guard_write(
            self.fingerprint.is_some() && self.raw_xml.is_none(),
            DocumentState::Assembled,
        )?;
        self.raw_xml = Some(xml);
        Ok(())
    }

    pub(crate) fn set_signed_xml(&mut self, xml: Vec<u8>) -> Result<(), FiscalError> {
        self.guard_write(
            self.raw_xml.is_some() && self.signed_xml.is_none(),
            DocumentState::Signed,
        )?;
        self.signed_xml = Some(xml);
        Ok(())
    }

    /// First successful submission sets the track id; later ones must agree.
    pub(crate) fn set_track_id(&mut self, track_id: String) -> Result<(), FiscalError> {
        match &self.track_id {
            Some(existing) if *existing != track_id => {
                tracing::warn!(
                    document_id = %self.id,
                    known = %existing,
                    received = %track_id,
                    "authority returned a different track id, keeping the first"
                );
                Ok(())
            }
            Some(_) => Ok(()),
            None => {
                self.guard_write(self.signed_xml.is_some(), DocumentState::Submitted)?;
                self.track_id = Some(track_id);
                Ok(())
            }
        }
    }

    fn guard_write(&self, allowed: bool, target: DocumentState) -> Result<(), FiscalError> {
        if self.state.is_terminal() || !allowed {
            return Err(FiscalError::InvalidTransition {
                from: self.state,
                to: target,
            });
        }
        Ok(())
    }
}

/// Read-only view of a document for operator screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub id: DocumentId,
    pub state: DocumentState,
    pub fingerprint: Option<Fingerprint>,
    pub track_id: Option<String>,
    pub submission_attempts: u32,
    pub last_error: Option<LastError>,
    pub created_at: DateTime<Utc>,
    pub last_transition_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ValidationError;
    use DocumentState::*;

    const ALL: [DocumentState; 8] = [
        Draft,
        Fingerprinted,
        Assembled,
        Signed,
        Submitted,
        Accepted,
        Rejected,
        Error,
    ];

    #[test]
    fn final_and_error_states_have_no_exits() {
        for to in ALL {
            assert!(!Accepted.can_transition_to(to));
            assert!(!Rejected.can_transition_to(to));
            assert!(!Error.can_transition_to(to));
        }
    }

    #[test]
    fn forward_path_is_allowed() {
        let path = [Draft, Fingerprinted, Assembled, Signed, Submitted, Accepted];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?}", pair);
        }
        assert!(!Submitted.can_transition_to(Submitted));
        assert!(Signed.can_transition_to(Rejected));
        assert!(!Signed.can_transition_to(Accepted));
        assert!(!Draft.can_transition_to(Signed));
        assert!(!Assembled.can_transition_to(Fingerprinted));
    }

    #[test]
    fn transition_records_history_and_clears_error() {
        let mut doc = FiscalDocument::new(DocumentId::new("INV-001"));
        doc.record_error(&ValidationError::missing("x").into());
        doc.transition(Fingerprinted).unwrap();
        assert!(doc.last_error().is_none());
        assert_eq!(doc.history().len(), 1);
        assert_eq!(doc.history()[0].from, Draft);

        let err = doc.transition(Signed).unwrap_err();
        assert!(matches!(err, FiscalError::InvalidTransition { from: Fingerprinted, to: Signed }));
        assert_eq!(doc.state(), Fingerprinted);
    }

    #[test]
    fn error_remembers_resume_state() {
        let mut doc = FiscalDocument::new(DocumentId::new("INV-002"));
        doc.transition(Fingerprinted).unwrap();
        doc.transition(Error).unwrap();
        assert_eq!(doc.state(), Error);
        assert_eq!(doc.resume_state(), Fingerprinted);
        doc.reopen().unwrap();
        assert_eq!(doc.state(), Fingerprinted);
    }

    #[test]
    fn artifacts_are_write_once_and_ordered() {
        let mut doc = FiscalDocument::new(DocumentId::new("INV-003"));
        assert!(doc.set_raw_xml(b"<x/>".to_vec()).is_err(), "xml before fingerprint");
        let fp = crate::core::fingerprint_from_fields(&crate::core::FingerprintFields {
            invoice_number: "1",
            issue_date: "2024",
            total: rust_decimal::Decimal::ONE,
            tax_amount: rust_decimal::Decimal::ZERO,
            customer_tax_id: "2",
            technical_key: "3",
            software_pin: "4",
        })
        .unwrap();
        let sw = SoftwareIdentity::new("sw", "tk");
        doc.set_fingerprint(fp.clone(), sw.clone()).unwrap();
        assert!(doc.set_fingerprint(fp, sw).is_err());
        assert!(doc.set_signed_xml(b"<x/>".to_vec()).is_err(), "signed before raw");
        assert!(doc.set_track_id("T".into()).is_err(), "track id before signing");
    }
}
