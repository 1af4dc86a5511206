//! XAdES-EPES enveloped signatures for assembled invoices.
//!
//! Every digest covers a Canonical XML 1.1 form: the document without its
//! `ext:UBLExtensions` block, `xades:SignedProperties` and `ds:SignedInfo`
//! in the context of the signed document. The signature is spliced into the
//! extension block, so the bytes outside it are left as assembled.

mod c14n;
mod credential;
mod sign;
mod verify;

pub use credential::SigningCredential;
pub use sign::{DocumentSigner, SerializedSigner, SignaturePolicy, XadesSigner};
pub use verify::{VerifiedSignature, verify_signed_xml, verify_signed_xml_with};

use base64ct::{Base64, Encoding};
use sha2::{Digest, Sha256};

pub const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const XADES_NS: &str = "http://uri.etsi.org/01903/v1.3.2#";

pub(crate) const SIGNATURE_ID: &str = "xmldsig-signature";
pub(crate) const SIGNED_PROPERTIES_ID: &str = "xmldsig-signedprops";
pub(crate) const DOCUMENT_REFERENCE_ID: &str = "xmldsig-ref0";

pub(crate) mod alg {
    pub const C14N11: &str = "http://www.w3.org/2006/12/xml-c14n11";
    pub const XPATH: &str = "http://www.w3.org/TR/1999/REC-xpath-19991116";
    pub const ECDSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256";
    pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
    pub const SIGNED_PROPERTIES_TYPE: &str = "http://uri.etsi.org/01903#SignedProperties";
}

pub(crate) fn sha256_base64(bytes: &[u8]) -> String {
    Base64::encode_string(&Sha256::digest(bytes))
}

/// XPath transform of the document reference. It drops the extension block,
/// as `ParsedDocument::canonical_without_extensions` does.
pub(crate) const DOCUMENT_FILTER: &str = "not(//ancestor-or-self::ext:UBLExtensions)";

pub(crate) const SIGNED_INFO_PATH: &str = "//ds:Signature/ds:SignedInfo";
pub(crate) const SIGNED_PROPERTIES_PATH: &str =
    "//ds:Signature/ds:Object/xades:QualifyingProperties/xades:SignedProperties";
