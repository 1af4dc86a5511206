use std::fmt;

use chrono::{DateTime, Utc};
use k256::ecdsa::{SigningKey, VerifyingKey};
use k256::pkcs8::{DecodePrivateKey, DecodePublicKey};
use x509_cert::Certificate;
use x509_cert::der::{DecodePem, Encode};
use x509_cert::time::Time;

use crate::core::SigningError;

/// Certificate plus the private key it certifies.
///
/// Loading checks that the key belongs to the certificate, so a signature
/// produced with a credential always verifies against its embedded
/// certificate.
pub struct SigningCredential {
    certificate: Certificate,
    certificate_der: Vec<u8>,
    key: SigningKey,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

impl SigningCredential {
    /// Load a PEM certificate and a PKCS#8 encrypted PEM secp256k1 key.
    pub fn from_pem(
        cert_pem: &str,
        encrypted_key_pem: &str,
        password: &str,
    ) -> Result<Self, SigningError> {
        let certificate = parse_certificate(cert_pem)?;
        let key = SigningKey::from_pkcs8_encrypted_pem(encrypted_key_pem, password.as_bytes())
            .map_err(|e| SigningError::invalid_credential(format!("cannot decrypt key: {e}")))?;
        Self::from_parts(certificate, key)
    }

    /// Load a PEM certificate and an unencrypted PKCS#8 PEM key.
    pub fn from_pem_unencrypted(cert_pem: &str, key_pem: &str) -> Result<Self, SigningError> {
        let certificate = parse_certificate(cert_pem)?;
        let key = SigningKey::from_pkcs8_pem(key_pem)
            .map_err(|e| SigningError::invalid_credential(format!("cannot decode key: {e}")))?;
        Self::from_parts(certificate, key)
    }

    pub fn from_parts(certificate: Certificate, key: SigningKey) -> Result<Self, SigningError> {
        let certified = certificate_public_key(&certificate)?;
        if certified != *key.verifying_key() {
            return Err(SigningError::invalid_credential(
                "private key does not match the certificate",
            ));
        }
        let certificate_der = certificate
            .to_der()
            .map_err(|e| SigningError::invalid_credential(format!("certificate encoding: {e}")))?;
        let validity = &certificate.tbs_certificate.validity;
        let not_before = to_datetime(&validity.not_before)?;
        let not_after = to_datetime(&validity.not_after)?;
        Ok(Self {
            certificate,
            certificate_der,
            key,
            not_before,
            not_after,
        })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Fails when `at` falls outside the certificate's validity window.
    pub fn check_validity(&self, at: DateTime<Utc>) -> Result<(), SigningError> {
        if at > self.not_after {
            return Err(SigningError::CertificateExpired {
                not_after: self.not_after,
            });
        }
        if at < self.not_before {
            return Err(SigningError::CertificateNotYetValid {
                not_before: self.not_before,
            });
        }
        Ok(())
    }

    /// Issuer distinguished name in RFC 4514 form.
    pub fn issuer_name(&self) -> String {
        self.certificate.tbs_certificate.issuer.to_string()
    }

    /// Certificate serial number in decimal.
    pub fn serial_number(&self) -> String {
        serial_to_decimal(self.certificate.tbs_certificate.serial_number.as_bytes())
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.key
    }
}

impl fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredential")
            .field("issuer", &self.issuer_name())
            .field("serial", &self.serial_number())
            .field("not_after", &self.not_after)
            .field("key", &"<redacted>")
            .finish()
    }
}

fn parse_certificate(pem: &str) -> Result<Certificate, SigningError> {
    Certificate::from_pem(pem.as_bytes())
        .map_err(|e| SigningError::invalid_credential(format!("cannot parse certificate: {e}")))
}

pub(crate) fn certificate_public_key(cert: &Certificate) -> Result<VerifyingKey, SigningError> {
    let spki = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| SigningError::invalid_credential(format!("certificate key: {e}")))?;
    VerifyingKey::from_public_key_der(&spki).map_err(|e| {
        SigningError::invalid_credential(format!("certificate key is not secp256k1: {e}"))
    })
}

fn to_datetime(time: &Time) -> Result<DateTime<Utc>, SigningError> {
    let secs = time.to_unix_duration().as_secs();
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| SigningError::invalid_credential("certificate validity out of range"))
}

/// Big-endian unsigned bytes to a decimal string.
fn serial_to_decimal(bytes: &[u8]) -> String {
    let mut digits: Vec<u8> = vec![0];
    for &byte in bytes {
        let mut carry = u32::from(byte);
        for digit in digits.iter_mut() {
            let value = u32::from(*digit) * 256 + carry;
            *digit = (value % 10) as u8;
            carry = value / 10;
        }
        while carry > 0 {
            digits.push((carry % 10) as u8);
            carry /= 10;
        }
    }
    while digits.len() > 1 && digits.last() == Some(&0) {
        digits.pop();
    }
    digits.iter().rev().map(|d| char::from(b'0' + d)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_decimal() {
        assert_eq!(serial_to_decimal(&[]), "0");
        assert_eq!(serial_to_decimal(&[0x12, 0x34]), "4660");
        assert_eq!(serial_to_decimal(&[0x00, 0xff]), "255");
        assert_eq!(serial_to_decimal(&[0x01, 0x00, 0x00]), "65536");
    }
}
