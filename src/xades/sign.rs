use std::sync::{Arc, Mutex, PoisonError};

use base64ct::{Base64, Encoding};
use chrono::{DateTime, SecondsFormat, Utc};
use k256::ecdsa::Signature;
use k256::ecdsa::signature::Signer;

use super::c14n::ParsedDocument;
use super::credential::SigningCredential;
use super::*;
use crate::core::{SigningError, ValidationError};
use crate::ubl::xml_utils::XmlWriter;
use crate::ubl::{EXTENSION_CONTENT_ELEMENT, EXTENSIONS_ELEMENT, locate_element};

/// Produces a signed document from an assembled one.
///
/// Implementations must leave every byte outside the extension block
/// unchanged and be callable from several tasks at once.
pub trait DocumentSigner: Send + Sync {
    fn sign(&self, raw_xml: &[u8], at: DateTime<Utc>) -> Result<Vec<u8>, SigningError>;
}

impl<S: DocumentSigner + ?Sized> DocumentSigner for Arc<S> {
    fn sign(&self, raw_xml: &[u8], at: DateTime<Utc>) -> Result<Vec<u8>, SigningError> {
        (**self).sign(raw_xml, at)
    }
}

/// Signature policy referenced by the EPES qualifying properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePolicy {
    pub identifier: String,
    /// Base64 SHA-256 of the policy document.
    pub hash_base64: String,
    pub description: String,
}

impl Default for SignaturePolicy {
    fn default() -> Self {
        Self {
            identifier: "https://facturaelectronica.dian.gov.co/politicadefirma/v2/politicadefirmav2.pdf"
                .into(),
            hash_base64: "dMoMvtcG5aIzgYo0tIsSQeVJBDnUnfSOfBpxXrmor0Y=".into(),
            description: "Política de firma para facturas electrónicas de la República de Colombia"
                .into(),
        }
    }
}

/// XAdES-EPES enveloped signer backed by a secp256k1 credential.
///
/// ECDSA signing with an in-memory key is reentrant, so one signer can be
/// shared across documents.
#[derive(Debug, Clone)]
pub struct XadesSigner {
    credential: Arc<SigningCredential>,
    policy: SignaturePolicy,
}

impl XadesSigner {
    pub fn new(credential: SigningCredential) -> Self {
        Self {
            credential: Arc::new(credential),
            policy: SignaturePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SignaturePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn credential(&self) -> &SigningCredential {
        &self.credential
    }

    pub fn policy(&self) -> &SignaturePolicy {
        &self.policy
    }

    fn signed_properties(&self, at: DateTime<Utc>) -> Result<String, ValidationError> {
        let cert_digest = sha256_base64(self.credential.certificate_der());
        let mut w = XmlWriter::fragment();
        w.start_element_with_attrs(
            "xades:SignedProperties",
            &[("Id", SIGNED_PROPERTIES_ID)],
        )?;
        w.start_element("xades:SignedSignatureProperties")?;
        w.text_element(
            "xades:SigningTime",
            &at.to_rfc3339_opts(SecondsFormat::Secs, true),
        )?;

        w.start_element("xades:SigningCertificate")?;
        w.start_element("xades:Cert")?;
        w.start_element("xades:CertDigest")?;
        w.empty_element_with_attrs("ds:DigestMethod", &[("Algorithm", alg::SHA256)])?;
        w.text_element("ds:DigestValue", &cert_digest)?;
        w.end_element("xades:CertDigest")?;
        w.start_element("xades:IssuerSerial")?;
        w.text_element("ds:X509IssuerName", &self.credential.issuer_name())?;
        w.text_element("ds:X509SerialNumber", &self.credential.serial_number())?;
        w.end_element("xades:IssuerSerial")?;
        w.end_element("xades:Cert")?;
        w.end_element("xades:SigningCertificate")?;

        w.start_element("xades:SignaturePolicyIdentifier")?;
        w.start_element("xades:SignaturePolicyId")?;
        w.start_element("xades:SigPolicyId")?;
        w.text_element("xades:Identifier", &self.policy.identifier)?;
        w.text_element("xades:Description", &self.policy.description)?;
        w.end_element("xades:SigPolicyId")?;
        w.start_element("xades:SigPolicyHash")?;
        w.empty_element_with_attrs("ds:DigestMethod", &[("Algorithm", alg::SHA256)])?;
        w.text_element("ds:DigestValue", &self.policy.hash_base64)?;
        w.end_element("xades:SigPolicyHash")?;
        w.end_element("xades:SignaturePolicyId")?;
        w.end_element("xades:SignaturePolicyIdentifier")?;

        w.end_element("xades:SignedSignatureProperties")?;
        w.end_element("xades:SignedProperties")?;
        into_string(w)
    }
}

impl DocumentSigner for XadesSigner {
    fn sign(&self, raw_xml: &[u8], at: DateTime<Utc>) -> Result<Vec<u8>, SigningError> {
        self.credential.check_validity(at)?;

        let xml = std::str::from_utf8(raw_xml)
            .map_err(|e| SigningError::MalformedDocument(format!("not UTF-8: {e}")))?;
        let block = locate_element(xml, EXTENSIONS_ELEMENT)
            .map_err(|e| SigningError::MalformedDocument(e.to_string()))?
            .ok_or_else(|| {
                SigningError::MalformedDocument(format!("missing {EXTENSIONS_ELEMENT}"))
            })?;
        if xml[block.clone()].contains("<ds:Signature") {
            return Err(SigningError::MalformedDocument(
                "document is already signed".into(),
            ));
        }

        let certificate = Base64::encode_string(self.credential.certificate_der());
        let signed_properties = self.signed_properties(at).map_err(malformed)?;
        let document_digest = sha256_base64(
            ParsedDocument::parse(xml)?
                .canonical_without_extensions()?
                .as_bytes(),
        );

        // Each canonical element is taken from a draft of the signed document,
        // so the digests see the namespaces in scope at their final position.
        let draft = |signed_info: &str, signature_value: &str| {
            extension_block(signed_info, signature_value, &certificate, &signed_properties)
                .map(|extension| splice(xml, &block, &extension))
                .map_err(malformed)
        };

        let unsigned_info = signed_info(&document_digest, "").map_err(malformed)?;
        let properties_digest = sha256_base64(
            canonical_element(&draft(&unsigned_info, "")?, SIGNED_PROPERTIES_PATH)?.as_bytes(),
        );
        let signed_info = signed_info(&document_digest, &properties_digest).map_err(malformed)?;
        let canonical_info = canonical_element(&draft(&signed_info, "")?, SIGNED_INFO_PATH)?;

        let signature: Signature = self
            .credential
            .signing_key()
            .try_sign(canonical_info.as_bytes())
            .map_err(|e| SigningError::invalid_credential(format!("ECDSA signing failed: {e}")))?;
        let signature_value = Base64::encode_string(signature.to_der().as_bytes());
        let signed = draft(&signed_info, &signature_value)?;

        tracing::debug!(
            document_digest = %document_digest,
            signing_time = %at,
            "document signed"
        );

        Ok(signed.into_bytes())
    }
}

/// Serializes access to a signer that must not be entered concurrently,
/// such as one driving a hardware token. The lock covers this signer only.
#[derive(Debug)]
pub struct SerializedSigner<S> {
    inner: Mutex<S>,
}

impl<S> SerializedSigner<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }
}

impl<S: DocumentSigner> DocumentSigner for SerializedSigner<S> {
    fn sign(&self, raw_xml: &[u8], at: DateTime<Utc>) -> Result<Vec<u8>, SigningError> {
        // A panic inside a previous call leaves no partial state behind.
        let signer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        signer.sign(raw_xml, at)
    }
}

fn splice(xml: &str, block: &std::ops::Range<usize>, extension: &str) -> String {
    let mut out = String::with_capacity(xml.len() + extension.len());
    out.push_str(&xml[..block.start]);
    out.push_str(extension);
    out.push_str(&xml[block.end..]);
    out
}

fn canonical_element(xml: &str, path: &str) -> Result<String, SigningError> {
    ParsedDocument::parse(xml)?
        .canonical_element(path)?
        .ok_or_else(|| SigningError::MalformedDocument(format!("missing {path}")))
}

fn signed_info(document_digest: &str, properties_digest: &str) -> Result<String, ValidationError> {
    let mut w = XmlWriter::fragment();
    w.start_element("ds:SignedInfo")?;
    w.empty_element_with_attrs("ds:CanonicalizationMethod", &[("Algorithm", alg::C14N11)])?;
    w.empty_element_with_attrs("ds:SignatureMethod", &[("Algorithm", alg::ECDSA_SHA256)])?;

    w.start_element_with_attrs("ds:Reference", &[("Id", DOCUMENT_REFERENCE_ID), ("URI", "")])?;
    w.start_element("ds:Transforms")?;
    w.start_element_with_attrs("ds:Transform", &[("Algorithm", alg::XPATH)])?;
    w.text_element("ds:XPath", DOCUMENT_FILTER)?;
    w.end_element("ds:Transform")?;
    w.empty_element_with_attrs("ds:Transform", &[("Algorithm", alg::C14N11)])?;
    w.end_element("ds:Transforms")?;
    w.empty_element_with_attrs("ds:DigestMethod", &[("Algorithm", alg::SHA256)])?;
    w.text_element("ds:DigestValue", document_digest)?;
    w.end_element("ds:Reference")?;

    let target = format!("#{SIGNED_PROPERTIES_ID}");
    w.start_element_with_attrs(
        "ds:Reference",
        &[("Type", alg::SIGNED_PROPERTIES_TYPE), ("URI", target.as_str())],
    )?;
    w.empty_element_with_attrs("ds:DigestMethod", &[("Algorithm", alg::SHA256)])?;
    w.text_element("ds:DigestValue", properties_digest)?;
    w.end_element("ds:Reference")?;

    w.end_element("ds:SignedInfo")?;
    into_string(w)
}

fn extension_block(
    signed_info: &str,
    signature_value: &str,
    certificate: &str,
    signed_properties: &str,
) -> Result<String, ValidationError> {
    let target = format!("#{SIGNATURE_ID}");
    let mut w = XmlWriter::fragment();
    w.start_element(EXTENSIONS_ELEMENT)?;
    w.start_element("ext:UBLExtension")?;
    w.start_element(EXTENSION_CONTENT_ELEMENT)?;

    w.start_element_with_attrs("ds:Signature", &[("xmlns:ds", DS_NS), ("Id", SIGNATURE_ID)])?;
    w.raw(signed_info)?;
    w.text_element("ds:SignatureValue", signature_value)?;
    w.start_element("ds:KeyInfo")?;
    w.start_element("ds:X509Data")?;
    w.text_element("ds:X509Certificate", certificate)?;
    w.end_element("ds:X509Data")?;
    w.end_element("ds:KeyInfo")?;
    w.start_element("ds:Object")?;
    w.start_element_with_attrs(
        "xades:QualifyingProperties",
        &[("xmlns:xades", XADES_NS), ("Target", target.as_str())],
    )?;
    w.raw(signed_properties)?;
    w.end_element("xades:QualifyingProperties")?;
    w.end_element("ds:Object")?;
    w.end_element("ds:Signature")?;

    w.end_element(EXTENSION_CONTENT_ELEMENT)?;
    w.end_element("ext:UBLExtension")?;
    w.end_element(EXTENSIONS_ELEMENT)?;
    into_string(w)
}

fn into_string(w: XmlWriter) -> Result<String, ValidationError> {
    String::from_utf8(w.into_bytes()).map_err(|e| ValidationError::new("xml", e.to_string()))
}

fn malformed(e: ValidationError) -> SigningError {
    SigningError::MalformedDocument(e.to_string())
}
