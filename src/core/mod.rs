//! Core fiscalization types: invoice input, fingerprint, and the document
//! lifecycle state machine.
//!
//! Everything here is pure and synchronous; network and signing concerns
//! live in the feature-gated modules.

mod builder;
mod document;
mod error;
pub mod fingerprint;
pub mod money;
mod types;
mod validation;

pub use builder::*;
pub use document::*;
pub use error::*;
pub use fingerprint::{
    FINGERPRINT_HEX_LEN, FINGERPRINT_TAX_CODE, Fingerprint, FingerprintFields,
    compute_fingerprint, fingerprint_from_fields,
};
pub use money::{MONEY_EPSILON, format_amount};
pub use types::*;
pub use validation::*;
