//! Tax authority integration: configuration, the HTTP client for the
//! submission and status endpoints, one-shot submission, and status
//! tracking.
//!
//! Nothing in this module retries a submission on its own; the pipeline
//! owns the retry policy and every state change.

mod cancel;
mod client;
pub mod config;
mod response;
mod submission;
mod tracker;

pub use cancel::{CancelHandle, Cancellation, cancellation};
pub use client::{AuthorityClient, ClientError, HttpAuthorityClient};
pub use config::{Backoff, ConfigError, DianConfig, PollPolicy, RetryPolicy};
pub use response::{AuthorityResponse, AuthorityStatus};
pub use submission::{SubmissionClient, SubmissionOutcome};
pub use tracker::{StatusTracker, TrackOutcome};
