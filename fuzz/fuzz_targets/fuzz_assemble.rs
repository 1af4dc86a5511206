#![no_main]

use fiscal_dian::core::*;
use libfuzzer_sys::fuzz_target;
use rust_decimal::Decimal;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let mut fields = s.split('|');
    let mut next = || fields.next().unwrap_or_default().to_string();
    let number = next();
    let date = next();
    let customer = next();
    let description = next();
    let amount = next()
        .parse::<Decimal>()
        .ok()
        .filter(|a| a.abs() < Decimal::from(1_000_000_000_000i64))
        .unwrap_or(Decimal::ONE);

    let input = InvoiceInputBuilder::new(number, date)
        .supplier("800197268", "Proveedor SAS")
        .customer(customer, "Cliente")
        .add_line(LineInput::new("P1", description, Decimal::ONE, amount, amount))
        .derive_totals()
        .software("SW", "TK", "PIN")
        .build();

    // Assembly either fails validation or yields a document whose
    // signature block can be found again.
    if let Ok(fp) = compute_fingerprint(&input) {
        if let Ok(xml) = fiscal_dian::ubl::assemble(&input, &fp) {
            let xml = String::from_utf8(xml).expect("assembler emits UTF-8");
            assert!(fiscal_dian::ubl::locate_extension_block(&xml).is_some());
        }
    }
});
