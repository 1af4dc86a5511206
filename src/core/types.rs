use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::ValidationError;

/// Invoice record handed over by the invoice store.
///
/// This is read-only input: the fiscalization core never edits it. Fields are
/// checked when the fingerprint is computed and again, more strictly, when
/// the document is assembled.
#[derive(Clone, Serialize, Deserialize)]
pub struct InvoiceInput {
    /// Invoice number (prefix + consecutive, e.g. "SETP990000001").
    pub number: String,
    /// Issue date and time, `YYYY-MM-DDTHH:MM:SS`.
    pub issue_date: String,
    /// ISO 4217 currency code.
    #[serde(default = "default_currency")]
    pub currency: String,
    pub supplier_tax_id: String,
    pub supplier_name: String,
    pub customer_tax_id: String,
    pub customer_name: String,
    /// Invoice lines, in document order.
    pub lines: Vec<LineInput>,
    /// Authority tax scheme code of the invoice tax (e.g. "01" for IVA).
    pub tax_code: String,
    /// Tax rate percentage applied to the subtotal.
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    /// Sum of line subtotals, before tax.
    pub subtotal: Decimal,
    /// Payable amount: subtotal + tax.
    pub total: Decimal,
    /// Technical key issued by the authority for the numbering range.
    pub technical_key: String,
    /// PIN of the invoicing software.
    pub software_pin: String,
    /// Identifier of the invoicing software.
    pub software_id: String,
}

fn default_currency() -> String {
    "COP".to_string()
}

impl fmt::Debug for InvoiceInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvoiceInput")
            .field("number", &self.number)
            .field("issue_date", &self.issue_date)
            .field("currency", &self.currency)
            .field("supplier_tax_id", &self.supplier_tax_id)
            .field("customer_tax_id", &self.customer_tax_id)
            .field("lines", &self.lines.len())
            .field("tax_code", &self.tax_code)
            .field("tax_amount", &self.tax_amount)
            .field("subtotal", &self.subtotal)
            .field("total", &self.total)
            .field("technical_key", &"[REDACTED]")
            .field("software_pin", &"[REDACTED]")
            .field("software_id", &self.software_id)
            .finish()
    }
}

impl InvoiceInput {
    /// The software credentials sent as request metadata to the authority.
    pub fn software_identity(&self) -> SoftwareIdentity {
        SoftwareIdentity::new(self.software_id.clone(), self.technical_key.clone())
    }
}

/// One invoice line as supplied by the invoice store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineInput {
    pub code: String,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Line extension amount (quantity × unit price, after line discounts).
    pub line_subtotal: Decimal,
}

impl LineInput {
    pub fn new(
        code: impl Into<String>,
        description: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
        line_subtotal: Decimal,
    ) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            quantity,
            unit_price,
            line_subtotal,
        }
    }
}

/// Supplier or customer party, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Party {
    tax_id: String,
    name: String,
}

impl Party {
    /// `role` prefixes field names in errors ("supplier", "customer").
    pub fn new(role: &str, tax_id: &str, name: &str) -> Result<Self, ValidationError> {
        let tax_id = tax_id.trim();
        let name = name.trim();
        if tax_id.is_empty() {
            return Err(ValidationError::missing(format!("{role}.tax_id")));
        }
        if name.is_empty() {
            return Err(ValidationError::missing(format!("{role}.name")));
        }
        Ok(Self {
            tax_id: tax_id.to_string(),
            name: name.to_string(),
        })
    }

    pub fn tax_id(&self) -> &str {
        &self.tax_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Invoice line, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItem {
    code: String,
    description: String,
    quantity: Decimal,
    unit_price: Decimal,
    line_extension_amount: Decimal,
}

impl LineItem {
    pub fn new(index: usize, line: &LineInput) -> Result<Self, ValidationError> {
        let field = |name: &str| format!("lines.{index}.{name}");
        if line.code.trim().is_empty() {
            return Err(ValidationError::missing(field("code")));
        }
        if line.description.trim().is_empty() {
            return Err(ValidationError::missing(field("description")));
        }
        if line.quantity <= Decimal::ZERO {
            return Err(ValidationError::new(
                field("quantity"),
                "quantity must be positive",
            ));
        }
        if line.unit_price.is_sign_negative() {
            return Err(ValidationError::new(
                field("unit_price"),
                "unit price must not be negative",
            ));
        }
        if line.line_subtotal.is_sign_negative() {
            return Err(ValidationError::new(
                field("line_subtotal"),
                "line subtotal must not be negative",
            ));
        }
        Ok(Self {
            code: line.code.trim().to_string(),
            description: line.description.trim().to_string(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_extension_amount: line.line_subtotal,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn line_extension_amount(&self) -> Decimal {
        self.line_extension_amount
    }
}

/// Software credentials identifying the invoicing software to the authority.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareIdentity {
    software_id: String,
    technical_key: String,
}

impl SoftwareIdentity {
    pub fn new(software_id: impl Into<String>, technical_key: impl Into<String>) -> Self {
        Self {
            software_id: software_id.into(),
            technical_key: technical_key.into(),
        }
    }

    pub fn software_id(&self) -> &str {
        &self.software_id
    }

    pub fn technical_key(&self) -> &str {
        &self.technical_key
    }
}

impl fmt::Debug for SoftwareIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareIdentity")
            .field("software_id", &self.software_id)
            .field("technical_key", &"[REDACTED]")
            .finish()
    }
}
