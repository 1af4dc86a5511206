use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use super::types::*;

/// Builder for [`InvoiceInput`].
///
/// The invoice store normally deserializes `InvoiceInput` directly; the
/// builder exists for callers assembling input in code. Totals can be set
/// explicitly or derived from the lines with [`derive_totals`](Self::derive_totals).
///
/// ```
/// use fiscal_dian::core::*;
/// use rust_decimal_macros::dec;
///
/// let input = InvoiceInputBuilder::new("INV-001", "2024-05-01T10:00:00")
///     .supplier("800197268", "Proveedor SAS")
///     .customer("900123456", "Cliente Ltda")
///     .add_line(LineInput::new("P1", "Consultoría", dec!(1), dec!(100), dec!(100)))
///     .tax("01", dec!(19))
///     .derive_totals()
///     .software("SW-1", "TK1", "PIN1")
///     .build();
///
/// assert_eq!(input.total, dec!(119.00));
/// ```
pub struct InvoiceInputBuilder {
    number: String,
    issue_date: String,
    currency: String,
    supplier: (String, String),
    customer: (String, String),
    lines: Vec<LineInput>,
    tax_code: String,
    tax_rate: Decimal,
    tax_amount: Decimal,
    subtotal: Decimal,
    total: Decimal,
    technical_key: String,
    software_pin: String,
    software_id: String,
}

impl InvoiceInputBuilder {
    pub fn new(number: impl Into<String>, issue_date: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            issue_date: issue_date.into(),
            currency: "COP".to_string(),
            supplier: (String::new(), String::new()),
            customer: (String::new(), String::new()),
            lines: Vec::new(),
            tax_code: "01".to_string(),
            tax_rate: dec!(19),
            tax_amount: Decimal::ZERO,
            subtotal: Decimal::ZERO,
            total: Decimal::ZERO,
            technical_key: String::new(),
            software_pin: String::new(),
            software_id: String::new(),
        }
    }

    pub fn currency(mut self, code: impl Into<String>) -> Self {
        self.currency = code.into();
        self
    }

    pub fn supplier(mut self, tax_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.supplier = (tax_id.into(), name.into());
        self
    }

    pub fn customer(mut self, tax_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.customer = (tax_id.into(), name.into());
        self
    }

    pub fn add_line(mut self, line: LineInput) -> Self {
        self.lines.push(line);
        self
    }

    pub fn tax(mut self, code: impl Into<String>, rate: Decimal) -> Self {
        self.tax_code = code.into();
        self.tax_rate = rate;
        self
    }

    pub fn totals(mut self, subtotal: Decimal, tax_amount: Decimal, total: Decimal) -> Self {
        self.subtotal = subtotal;
        self.tax_amount = tax_amount;
        self.total = total;
        self
    }

    /// Subtotal = sum of line subtotals, tax = subtotal × rate rounded to
    /// cents, total = subtotal + tax.
    pub fn derive_totals(mut self) -> Self {
        let subtotal: Decimal = self.lines.iter().map(|l| l.line_subtotal).sum();
        let tax_amount = (subtotal * self.tax_rate / dec!(100))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        self.subtotal = subtotal;
        self.tax_amount = tax_amount;
        self.total = subtotal + tax_amount;
        self
    }

    pub fn software(
        mut self,
        software_id: impl Into<String>,
        technical_key: impl Into<String>,
        software_pin: impl Into<String>,
    ) -> Self {
        self.software_id = software_id.into();
        self.technical_key = technical_key.into();
        self.software_pin = software_pin.into();
        self
    }

    pub fn build(self) -> InvoiceInput {
        InvoiceInput {
            number: self.number,
            issue_date: self.issue_date,
            currency: self.currency,
            supplier_tax_id: self.supplier.0,
            supplier_name: self.supplier.1,
            customer_tax_id: self.customer.0,
            customer_name: self.customer.1,
            lines: self.lines,
            tax_code: self.tax_code,
            tax_rate: self.tax_rate,
            tax_amount: self.tax_amount,
            subtotal: self.subtotal,
            total: self.total,
            technical_key: self.technical_key,
            software_pin: self.software_pin,
            software_id: self.software_id,
        }
    }
}
