//! CUFE-equivalent fingerprint of an invoice.
//!
//! The authority recomputes this digest independently, so the field order,
//! amount formatting and hash must match byte for byte.

use std::fmt::{self, Write};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha384};

use super::error::ValidationError;
use super::money::format_amount;
use super::types::InvoiceInput;

/// Tax scheme literal placed between the total and the tax amount.
pub const FINGERPRINT_TAX_CODE: &str = "01";

/// Length of the hex-encoded SHA-384 digest.
pub const FINGERPRINT_HEX_LEN: usize = 96;

/// Lowercase hex SHA-384 digest identifying one invoice version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The canonical subset of invoice fields that feeds the fingerprint.
#[derive(Debug, Clone, Copy)]
pub struct FingerprintFields<'a> {
    pub invoice_number: &'a str,
    pub issue_date: &'a str,
    pub total: Decimal,
    pub tax_amount: Decimal,
    pub customer_tax_id: &'a str,
    pub technical_key: &'a str,
    pub software_pin: &'a str,
}

impl<'a> From<&'a InvoiceInput> for FingerprintFields<'a> {
    fn from(input: &'a InvoiceInput) -> Self {
        Self {
            invoice_number: &input.number,
            issue_date: &input.issue_date,
            total: input.total,
            tax_amount: input.tax_amount,
            customer_tax_id: &input.customer_tax_id,
            technical_key: &input.technical_key,
            software_pin: &input.software_pin,
        }
    }
}

/// Compute the fingerprint of an invoice.
pub fn compute_fingerprint(input: &InvoiceInput) -> Result<Fingerprint, ValidationError> {
    fingerprint_from_fields(&FingerprintFields::from(input))
}

/// Compute the fingerprint from its canonical fields.
///
/// Concatenates, without separators: invoice number, issue date reduced to
/// its digits, total, [`FINGERPRINT_TAX_CODE`], tax amount, customer tax id,
/// technical key and software PIN; amounts with exactly two decimals. Text
/// fields are trimmed, as they are when written into the document.
pub fn fingerprint_from_fields(
    fields: &FingerprintFields<'_>,
) -> Result<Fingerprint, ValidationError> {
    Ok(Fingerprint(digest_hex(&fingerprint_input(fields)?)))
}

/// The exact string that gets hashed.
pub fn fingerprint_input(fields: &FingerprintFields<'_>) -> Result<String, ValidationError> {
    let number = required("invoice_number", fields.invoice_number)?;
    let date = normalize_issue_date(fields.issue_date);
    if date.is_empty() {
        return Err(ValidationError::missing("issue_date"));
    }
    let customer = required("customer_tax_id", fields.customer_tax_id)?;
    let technical_key = required("technical_key", fields.technical_key)?;
    let pin = required("software_pin", fields.software_pin)?;

    let mut out = String::with_capacity(128);
    out.push_str(number);
    out.push_str(&date);
    out.push_str(&format_amount(fields.total));
    out.push_str(FINGERPRINT_TAX_CODE);
    out.push_str(&format_amount(fields.tax_amount));
    out.push_str(customer);
    out.push_str(technical_key);
    out.push_str(pin);
    Ok(out)
}

/// Strip every non-digit: `2024-05-01T10:00:00` -> `20240501100000`.
pub fn normalize_issue_date(date: &str) -> String {
    date.chars().filter(char::is_ascii_digit).collect()
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, ValidationError> {
    match value.trim() {
        "" => Err(ValidationError::missing(field)),
        trimmed => Ok(trimmed),
    }
}

fn digest_hex(input: &str) -> String {
    let hash = Sha384::digest(input.as_bytes());
    let mut hex = String::with_capacity(FINGERPRINT_HEX_LEN);
    for byte in hash {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fields() -> FingerprintFields<'static> {
        FingerprintFields {
            invoice_number: "INV-001",
            issue_date: "2024-05-01T10:00:00",
            total: dec!(119.00),
            tax_amount: dec!(19.00),
            customer_tax_id: "900123456",
            technical_key: "TK1",
            software_pin: "PIN1",
        }
    }

    #[test]
    fn concatenation_order() {
        assert_eq!(
            fingerprint_input(&fields()).unwrap(),
            "INV-00120240501100000119.000119.00900123456TK1PIN1"
        );
    }

    #[test]
    fn normalizes_date() {
        assert_eq!(normalize_issue_date("2024-05-01T10:00:00"), "20240501100000");
        assert_eq!(normalize_issue_date("2024-05-01T10:00:00-05:00"), "202405011000000500");
    }

    #[test]
    fn empty_digest_vector() {
        // SHA-384 of "" is a published test vector.
        assert_eq!(
            digest_hex(""),
            "38b060a751ac96384cd9327eb1b1e36a21fdb71114be07434c0cc7bf63f6e1da274edebfe76f65fbd51ad2f14898b95b"
        );
    }

    #[test]
    fn fingerprint_is_96_lowercase_hex() {
        let fp = fingerprint_from_fields(&fields()).unwrap();
        assert_eq!(fp.as_str().len(), FINGERPRINT_HEX_LEN);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn missing_field_is_named() {
        let mut f = fields();
        f.technical_key = "";
        assert_eq!(fingerprint_from_fields(&f).unwrap_err().field, "technical_key");

        let mut f = fields();
        f.issue_date = "--T::";
        assert_eq!(fingerprint_from_fields(&f).unwrap_err().field, "issue_date");

        let mut f = fields();
        f.invoice_number = "  ";
        assert_eq!(fingerprint_from_fields(&f).unwrap_err().field, "invoice_number");
    }
}
