#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must be rejected cleanly, never panic.
    let _ = fiscal_dian::xades::verify_signed_xml(data);
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = fiscal_dian::ubl::locate_extension_block(s);
    }
});
