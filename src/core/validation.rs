use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use super::error::ValidationError;
use super::money::{amounts_agree, format_amount};
use super::types::*;

/// Issue date layout accepted from the invoice store.
pub const ISSUE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Invoice input that passed every consistency check, with its parties and
/// lines turned into validated value types.
#[derive(Debug, Clone)]
pub struct ValidatedInvoice {
    pub number: String,
    pub issued_at: NaiveDateTime,
    pub currency: String,
    pub supplier: Party,
    pub customer: Party,
    pub lines: Vec<LineItem>,
    pub tax_code: String,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub subtotal: Decimal,
    pub total: Decimal,
}

/// Check an invoice for internal consistency.
///
/// Stops at the first problem. Amount checks run after the structural ones,
/// so a "line total mismatch" always refers to well-formed lines.
pub fn validate_invoice(input: &InvoiceInput) -> Result<ValidatedInvoice, ValidationError> {
    if input.number.trim().is_empty() {
        return Err(ValidationError::missing("number"));
    }
    let issued_at = NaiveDateTime::parse_from_str(input.issue_date.trim(), ISSUE_DATE_FORMAT)
        .map_err(|e| {
            ValidationError::new(
                "issue_date",
                format!("expected YYYY-MM-DDTHH:MM:SS, got '{}': {e}", input.issue_date),
            )
        })?;
    let currency = input.currency.trim();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::new(
            "currency",
            "currency must be a 3-letter ISO 4217 code",
        ));
    }
    if input.tax_code.trim().is_empty() {
        return Err(ValidationError::missing("tax_code"));
    }

    let supplier = Party::new("supplier", &input.supplier_tax_id, &input.supplier_name)?;
    let customer = Party::new("customer", &input.customer_tax_id, &input.customer_name)?;

    if input.lines.is_empty() {
        return Err(ValidationError::new("lines", "invoice has no lines"));
    }
    let lines = input
        .lines
        .iter()
        .enumerate()
        .map(|(i, line)| LineItem::new(i, line))
        .collect::<Result<Vec<_>, _>>()?;

    let line_sum: Decimal = lines.iter().map(LineItem::line_extension_amount).sum();
    if !amounts_agree(line_sum, input.subtotal) {
        tracing::debug!(
            line_sum = %format_amount(line_sum),
            subtotal = %format_amount(input.subtotal),
            "line subtotals do not add up"
        );
        return Err(ValidationError::new("subtotal", "line total mismatch"));
    }
    if !amounts_agree(input.subtotal + input.tax_amount, input.total) {
        return Err(ValidationError::new("total", "total mismatch"));
    }
    if input.tax_amount.is_sign_negative() {
        return Err(ValidationError::new(
            "tax_amount",
            "tax amount must not be negative",
        ));
    }

    Ok(ValidatedInvoice {
        number: input.number.trim().to_string(),
        issued_at,
        currency: currency.to_string(),
        supplier,
        customer,
        lines,
        tax_code: input.tax_code.trim().to_string(),
        tax_rate: input.tax_rate,
        tax_amount: input.tax_amount,
        subtotal: input.subtotal,
        total: input.total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::InvoiceInputBuilder;
    use rust_decimal_macros::dec;

    fn builder() -> InvoiceInputBuilder {
        InvoiceInputBuilder::new("INV-001", "2024-05-01T10:00:00")
            .supplier("800197268", "Proveedor SAS")
            .customer("900123456", "Cliente Ltda")
            .software("SW-1", "TK1", "PIN1")
    }

    #[test]
    fn consistent_invoice_passes() {
        let input = builder()
            .add_line(LineInput::new("A", "Item A", dec!(2), dec!(25), dec!(50)))
            .add_line(LineInput::new("B", "Item B", dec!(1), dec!(50), dec!(50)))
            .derive_totals()
            .build();
        let valid = validate_invoice(&input).unwrap();
        assert_eq!(valid.lines.len(), 2);
        assert_eq!(valid.total, dec!(119.00));
        assert_eq!(valid.issued_at.to_string(), "2024-05-01 10:00:00");
    }

    #[test]
    fn line_sum_must_match_subtotal() {
        let input = builder()
            .add_line(LineInput::new("A", "Item A", dec!(1), dec!(60), dec!(60)))
            .add_line(LineInput::new("B", "Item B", dec!(1), dec!(40), dec!(40)))
            .totals(dec!(90), dec!(17.10), dec!(107.10))
            .build();
        let err = validate_invoice(&input).unwrap_err();
        assert_eq!(err.message, "line total mismatch");
    }

    #[test]
    fn total_must_equal_subtotal_plus_tax() {
        let input = builder()
            .add_line(LineInput::new("A", "Item A", dec!(1), dec!(100), dec!(100)))
            .totals(dec!(100), dec!(19), dec!(120))
            .build();
        assert_eq!(validate_invoice(&input).unwrap_err().message, "total mismatch");
    }

    #[test]
    fn missing_customer_name() {
        let input = builder()
            .customer("900123456", "")
            .add_line(LineInput::new("A", "Item A", dec!(1), dec!(100), dec!(100)))
            .derive_totals()
            .build();
        assert_eq!(validate_invoice(&input).unwrap_err().field, "customer.name");
    }

    #[test]
    fn unparseable_issue_date() {
        let input = builder()
            .add_line(LineInput::new("A", "Item A", dec!(1), dec!(100), dec!(100)))
            .derive_totals()
            .build();
        let input = InvoiceInput {
            issue_date: "01/05/2024".into(),
            ..input
        };
        assert_eq!(validate_invoice(&input).unwrap_err().field, "issue_date");
    }
}
