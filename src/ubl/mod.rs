//! UBL 2.1 invoice document assembly.
//!
//! [`assemble`] turns a validated invoice plus its fingerprint into the
//! canonical XML the authority expects. The document ends with an empty
//! `ext:UBLExtensions` block that the signer later fills.
//!
//! # Example
//!
//! ```
//! use fiscal_dian::core::*;
//! use fiscal_dian::ubl;
//! use rust_decimal_macros::dec;
//!
//! let input = InvoiceInputBuilder::new("INV-001", "2024-05-01T10:00:00")
//!     .supplier("800197268", "Proveedor SAS")
//!     .customer("900123456", "Cliente Ltda")
//!     .add_line(LineInput::new("P1", "Consultoría", dec!(1), dec!(100), dec!(100)))
//!     .derive_totals()
//!     .software("SW-1", "TK1", "PIN1")
//!     .build();
//! let fingerprint = compute_fingerprint(&input).unwrap();
//! let xml = ubl::assemble(&input, &fingerprint).unwrap();
//! assert!(String::from_utf8(xml).unwrap().contains(fingerprint.as_str()));
//! ```

mod assemble;
pub(crate) mod xml_utils;

use std::ops::Range;

pub use assemble::{assemble, assemble_validated};
pub use xml_utils::locate_element;

/// Element reserved for the enveloped signature.
pub const EXTENSIONS_ELEMENT: &str = "ext:UBLExtensions";

/// Element inside the extension block that receives the signature.
pub const EXTENSION_CONTENT_ELEMENT: &str = "ext:ExtensionContent";

/// UBL version identifier (header).
pub const UBL_VERSION_ID: &str = "UBL 2.1";

/// Customization identifier for a standard sale.
pub const CUSTOMIZATION_ID: &str = "10";

/// Profile identifier of the electronic sales invoice.
pub const PROFILE_ID: &str = "DIAN 2.1: Factura Electrónica de Venta";

/// `schemeName` of the `cbc:UUID` element carrying the fingerprint.
pub const FINGERPRINT_SCHEME_NAME: &str = "CUFE-SHA384";

/// Invoice type code of a sales invoice.
pub const INVOICE_TYPE_CODE: &str = "01";

/// Unit code used for invoiced quantities ("unidad").
pub const DEFAULT_UNIT_CODE: &str = "94";

/// Agency that issues party tax identifiers.
pub const TAX_ID_SCHEME_AGENCY: &str = "195";

/// UBL 2.1 namespace URIs.
pub mod ns {
    pub const INVOICE: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2";
    pub const CAC: &str =
        "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
    pub const CBC: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
    pub const EXT: &str =
        "urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2";
}

/// Byte range of the extension block in an assembled or signed document.
pub fn locate_extension_block(xml: &str) -> Option<Range<usize>> {
    locate_element(xml, EXTENSIONS_ELEMENT).ok().flatten()
}

/// Display name of an authority tax scheme code.
pub fn tax_scheme_name(code: &str) -> &'static str {
    match code {
        "01" => "IVA",
        "02" => "IC",
        "03" => "ICA",
        "04" => "INC",
        "ZA" => "IVA e INC",
        _ => "ZZ",
    }
}
