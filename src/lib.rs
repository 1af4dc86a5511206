//! # fiscal-dian
//!
//! Electronic invoice fiscalization for DIAN-style tax authorities: a
//! deterministic CUFE fingerprint, the UBL 2.1 invoice document, an
//! XAdES-EPES enveloped signature, submission with bounded retries, and
//! status tracking to a verdict.
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating point.
//! Each invoice becomes a [`FiscalDocument`] whose lifecycle is an explicit
//! state machine ([`DocumentState`]) driven only by the pipeline.
//!
//! ## Quick Start
//!
//! ```rust
//! use fiscal_dian::core::*;
//! use rust_decimal_macros::dec;
//!
//! let input = InvoiceInputBuilder::new("INV-001", "2024-05-01T10:00:00")
//!     .supplier("800197268", "Proveedor SAS")
//!     .customer("900123456", "Cliente Ltda")
//!     .add_line(LineInput::new("P1", "Consultoría", dec!(1), dec!(100), dec!(100)))
//!     .totals(dec!(100), dec!(19), dec!(119))
//!     .software("SW-1", "TK1", "PIN1")
//!     .build();
//!
//! let fingerprint = compute_fingerprint(&input).unwrap();
//! assert_eq!(
//!     fingerprint.as_str(),
//!     "88ec3d1fc4711c2ef1768365832b27f8562ab26356fa9b6c6cf75472a1497ab75c6c9a049b1dde410e2177fc800d749f"
//! );
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` | Invoice input, validation, fingerprint, document state machine |
//! | `ubl` | UBL 2.1 invoice XML assembly |
//! | `xades` | Credential loading, XAdES-EPES signing and verification |
//! | `dian` | Authority configuration, HTTP client, submission, status tracking |
//! | `pipeline` | End-to-end orchestration, cancellation, document store |
//! | `all` (default) | Everything |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "ubl")]
pub mod ubl;

#[cfg(feature = "xades")]
pub mod xades;

#[cfg(feature = "dian")]
pub mod dian;

#[cfg(feature = "pipeline")]
pub mod pipeline;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
