use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use k256::ecdsa::Signature;
use k256::ecdsa::signature::Verifier;
use x509_cert::Certificate;
use x509_cert::der::Decode;

use super::c14n::ParsedDocument;
use super::credential::certificate_public_key;
use super::*;
use crate::core::SigningError;

/// What a successful verification established.
#[derive(Debug, Clone)]
pub struct VerifiedSignature {
    pub signing_time: DateTime<Utc>,
    pub document_digest: String,
    pub certificate: Certificate,
}

/// Verify the enveloped signature of a signed document against the
/// certificate embedded in it.
///
/// Recomputes the canonical document digest (extension block excluded) and
/// the signed properties digest, checks the certificate digest, then the
/// ECDSA signature over canonical `ds:SignedInfo`. Serialization details
/// that canonicalization erases, such as the XML declaration or attribute
/// quoting, do not affect the result.
pub fn verify_signed_xml(signed_xml: &[u8]) -> Result<VerifiedSignature, SigningError> {
    let xml = std::str::from_utf8(signed_xml)
        .map_err(|e| SigningError::MalformedDocument(format!("not UTF-8: {e}")))?;
    let doc = ParsedDocument::parse(xml)?;

    let signed_info = doc
        .canonical_element(SIGNED_INFO_PATH)?
        .ok_or_else(|| verification("missing ds:SignedInfo"))?;
    let signed_properties = doc
        .canonical_element(SIGNED_PROPERTIES_PATH)?
        .ok_or_else(|| verification("missing xades:SignedProperties"))?;

    let certificate_b64 = required(
        &doc,
        "//ds:Signature/ds:KeyInfo/ds:X509Data/ds:X509Certificate",
    )?;
    let certificate_der = Base64::decode_vec(&certificate_b64)
        .map_err(|e| verification(format!("certificate is not base64: {e}")))?;
    let certificate = Certificate::from_der(&certificate_der)
        .map_err(|e| verification(format!("cannot decode certificate: {e}")))?;

    let document_digest = sha256_base64(doc.canonical_without_extensions()?.as_bytes());
    let expect_reference = |uri: &str, actual: &str, what: &str| -> Result<(), SigningError> {
        let path = format!("{SIGNED_INFO_PATH}/ds:Reference[@URI='{uri}']/ds:DigestValue");
        match doc.text(&path)? {
            Some(digest) if digest == actual => Ok(()),
            Some(_) => Err(verification(format!("{what} digest mismatch"))),
            None => Err(verification(format!("no reference to {what}"))),
        }
    };
    expect_reference("", &document_digest, "document")?;
    expect_reference(
        &format!("#{SIGNED_PROPERTIES_ID}"),
        &sha256_base64(signed_properties.as_bytes()),
        "signed properties",
    )?;

    let cert_digest = required(
        &doc,
        &format!("{SIGNED_PROPERTIES_PATH}//xades:CertDigest/ds:DigestValue"),
    )?;
    if cert_digest != sha256_base64(&certificate_der) {
        return Err(verification("certificate digest mismatch"));
    }

    let signature_b64 = required(&doc, "//ds:Signature/ds:SignatureValue")?;
    let signature_der = Base64::decode_vec(&signature_b64)
        .map_err(|e| verification(format!("signature is not base64: {e}")))?;
    let signature = Signature::from_der(&signature_der)
        .map_err(|e| verification(format!("cannot decode signature: {e}")))?;
    let key = certificate_public_key(&certificate)?;
    key.verify(signed_info.as_bytes(), &signature)
        .map_err(|_| verification("signature does not match signed info"))?;

    let signing_time = required(&doc, &format!("{SIGNED_PROPERTIES_PATH}//xades:SigningTime"))?;
    let signing_time = DateTime::parse_from_rfc3339(&signing_time)
        .map_err(|e| verification(format!("bad signing time '{signing_time}': {e}")))?
        .with_timezone(&Utc);

    Ok(VerifiedSignature {
        signing_time,
        document_digest,
        certificate,
    })
}

/// Like [`verify_signed_xml`], additionally requiring the embedded
/// certificate to be `expected`.
pub fn verify_signed_xml_with(
    signed_xml: &[u8],
    expected: &Certificate,
) -> Result<VerifiedSignature, SigningError> {
    let verified = verify_signed_xml(signed_xml)?;
    if verified.certificate != *expected {
        return Err(verification("signed with an unexpected certificate"));
    }
    Ok(verified)
}

fn verification(message: impl Into<String>) -> SigningError {
    SigningError::Verification(message.into())
}

fn required(doc: &ParsedDocument, path: &str) -> Result<String, SigningError> {
    doc.text(path)?
        .ok_or_else(|| verification(format!("missing {path}")))
}
