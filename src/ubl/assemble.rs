use super::xml_utils::XmlWriter;
use super::*;
use crate::core::money::format_amount;
use crate::core::*;

/// Validate `input` and generate the UBL 2.1 invoice XML embedding
/// `fingerprint`.
///
/// Nothing is written unless every consistency check passes, and the output
/// is byte-identical for identical input.
pub fn assemble(input: &InvoiceInput, fingerprint: &Fingerprint) -> Result<Vec<u8>, ValidationError> {
    let invoice = validate_invoice(input)?;
    assemble_validated(&invoice, fingerprint)
}

/// Generate the XML of an already validated invoice.
pub fn assemble_validated(
    invoice: &ValidatedInvoice,
    fingerprint: &Fingerprint,
) -> Result<Vec<u8>, ValidationError> {
    let currency = invoice.currency.as_str();
    let mut w = XmlWriter::new()?;

    w.start_element_with_attrs(
        "Invoice",
        &[
            ("xmlns", ns::INVOICE),
            ("xmlns:cac", ns::CAC),
            ("xmlns:cbc", ns::CBC),
            ("xmlns:ext", ns::EXT),
        ],
    )?;

    // Header
    w.text_element("cbc:UBLVersionID", UBL_VERSION_ID)?;
    w.text_element("cbc:CustomizationID", CUSTOMIZATION_ID)?;
    w.text_element("cbc:ProfileID", PROFILE_ID)?;
    w.text_element("cbc:ID", &invoice.number)?;
    w.text_element_with_attrs(
        "cbc:UUID",
        fingerprint.as_str(),
        &[("schemeName", FINGERPRINT_SCHEME_NAME)],
    )?;
    w.text_element("cbc:IssueDate", &invoice.issued_at.format("%Y-%m-%d").to_string())?;
    w.text_element("cbc:IssueTime", &invoice.issued_at.format("%H:%M:%S").to_string())?;
    w.text_element("cbc:InvoiceTypeCode", INVOICE_TYPE_CODE)?;
    w.text_element("cbc:DocumentCurrencyCode", currency)?;
    w.text_element("cbc:LineCountNumeric", &invoice.lines.len().to_string())?;

    write_party(&mut w, &invoice.supplier, &invoice.tax_code, "cac:AccountingSupplierParty")?;
    write_party(&mut w, &invoice.customer, &invoice.tax_code, "cac:AccountingCustomerParty")?;

    for (i, line) in invoice.lines.iter().enumerate() {
        write_line(&mut w, i + 1, line, currency)?;
    }

    write_totals(&mut w, invoice, currency)?;

    // Reserved for the enveloped signature.
    w.start_element(EXTENSIONS_ELEMENT)?;
    w.start_element("ext:UBLExtension")?;
    w.empty_element_with_attrs(EXTENSION_CONTENT_ELEMENT, &[])?;
    w.end_element("ext:UBLExtension")?;
    w.end_element(EXTENSIONS_ELEMENT)?;

    w.end_element("Invoice")?;
    Ok(w.into_bytes())
}

fn write_party(
    w: &mut XmlWriter,
    party: &Party,
    tax_code: &str,
    wrapper: &str,
) -> Result<(), ValidationError> {
    w.start_element(wrapper)?;
    w.start_element("cac:Party")?;

    w.start_element("cac:PartyName")?;
    w.text_element("cbc:Name", party.name())?;
    w.end_element("cac:PartyName")?;

    w.start_element("cac:PartyTaxScheme")?;
    w.text_element("cbc:RegistrationName", party.name())?;
    w.text_element_with_attrs(
        "cbc:CompanyID",
        party.tax_id(),
        &[("schemeAgencyID", TAX_ID_SCHEME_AGENCY)],
    )?;
    write_tax_scheme(w, tax_code)?;
    w.end_element("cac:PartyTaxScheme")?;

    w.end_element("cac:Party")?;
    w.end_element(wrapper)?;
    Ok(())
}

fn write_line(
    w: &mut XmlWriter,
    position: usize,
    line: &LineItem,
    currency: &str,
) -> Result<(), ValidationError> {
    w.start_element("cac:InvoiceLine")?;
    w.text_element("cbc:ID", &position.to_string())?;
    w.quantity_element("cbc:InvoicedQuantity", line.quantity(), DEFAULT_UNIT_CODE)?;
    w.amount_element("cbc:LineExtensionAmount", line.line_extension_amount(), currency)?;

    w.start_element("cac:Item")?;
    w.text_element("cbc:Description", line.description())?;
    w.start_element("cac:SellersItemIdentification")?;
    w.text_element("cbc:ID", line.code())?;
    w.end_element("cac:SellersItemIdentification")?;
    w.end_element("cac:Item")?;

    w.start_element("cac:Price")?;
    w.amount_element("cbc:PriceAmount", line.unit_price(), currency)?;
    w.quantity_element("cbc:BaseQuantity", rust_decimal::Decimal::ONE, DEFAULT_UNIT_CODE)?;
    w.end_element("cac:Price")?;

    w.end_element("cac:InvoiceLine")?;
    Ok(())
}

fn write_totals(
    w: &mut XmlWriter,
    invoice: &ValidatedInvoice,
    currency: &str,
) -> Result<(), ValidationError> {
    w.start_element("cac:TaxTotal")?;
    w.amount_element("cbc:TaxAmount", invoice.tax_amount, currency)?;
    w.start_element("cac:TaxSubtotal")?;
    w.amount_element("cbc:TaxableAmount", invoice.subtotal, currency)?;
    w.amount_element("cbc:TaxAmount", invoice.tax_amount, currency)?;
    w.start_element("cac:TaxCategory")?;
    w.text_element("cbc:Percent", &format_amount(invoice.tax_rate))?;
    write_tax_scheme(w, &invoice.tax_code)?;
    w.end_element("cac:TaxCategory")?;
    w.end_element("cac:TaxSubtotal")?;
    w.end_element("cac:TaxTotal")?;

    w.start_element("cac:LegalMonetaryTotal")?;
    w.amount_element("cbc:LineExtensionAmount", invoice.subtotal, currency)?;
    w.amount_element("cbc:TaxExclusiveAmount", invoice.subtotal, currency)?;
    w.amount_element("cbc:TaxInclusiveAmount", invoice.total, currency)?;
    w.amount_element("cbc:PayableAmount", invoice.total, currency)?;
    w.end_element("cac:LegalMonetaryTotal")?;
    Ok(())
}

fn write_tax_scheme(w: &mut XmlWriter, tax_code: &str) -> Result<(), ValidationError> {
    w.start_element("cac:TaxScheme")?;
    w.text_element("cbc:ID", tax_code)?;
    w.text_element("cbc:Name", tax_scheme_name(tax_code))?;
    w.end_element("cac:TaxScheme")?;
    Ok(())
}
