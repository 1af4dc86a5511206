//! Fingerprint determinism and sensitivity.
//!
//! Run with: `cargo test --test fingerprint_tests`

#![cfg(feature = "core")]

use fiscal_dian::core::fingerprint::{fingerprint_input, normalize_issue_date};
use fiscal_dian::core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const SCENARIO_ONE: &str = "88ec3d1fc4711c2ef1768365832b27f8562ab26356fa9b6c6cf75472a1497ab75c6c9a049b1dde410e2177fc800d749f";
const SCENARIO_TWO: &str = "ffab224462c08743a08fdcc50c378d8b58fe65d5d936ba6161725debfb8404c41d3e656ab2c7ab9929b74b5660f3ebf2";

fn invoice(total: Decimal) -> InvoiceInput {
    InvoiceInputBuilder::new("INV-001", "2024-05-01T10:00:00")
        .supplier("800197268", "Proveedor SAS")
        .customer("900123456", "Cliente Ltda")
        .add_line(LineInput::new("P1", "Consultoría", dec!(1), dec!(100), dec!(100)))
        .totals(dec!(100), dec!(19), total)
        .software("SW-1", "TK1", "PIN1")
        .build()
}

#[test]
fn scenario_one_is_pinned() {
    let first = compute_fingerprint(&invoice(dec!(119.00))).unwrap();
    let second = compute_fingerprint(&invoice(dec!(119.00))).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.as_str(), SCENARIO_ONE);
    assert_eq!(first.as_str().len(), FINGERPRINT_HEX_LEN);
}

#[test]
fn one_cent_changes_the_fingerprint() {
    let changed = compute_fingerprint(&invoice(dec!(119.01))).unwrap();
    assert_eq!(changed.as_str(), SCENARIO_TWO);
    assert_ne!(changed.as_str(), SCENARIO_ONE);
}

#[test]
fn hashed_string_layout() {
    let input = invoice(dec!(119));
    let hashed = fingerprint_input(&FingerprintFields::from(&input)).unwrap();
    assert_eq!(hashed, "INV-00120240501100000119.000119.00900123456TK1PIN1");
}

#[test]
fn trailing_zeros_do_not_matter() {
    let a = compute_fingerprint(&invoice(dec!(119))).unwrap();
    let b = compute_fingerprint(&invoice(dec!(119.000))).unwrap();
    assert_eq!(a, b);
}

#[test]
fn lines_and_names_are_not_hashed() {
    let mut input = invoice(dec!(119));
    let before = compute_fingerprint(&input).unwrap();
    input.customer_name = "Otro Nombre".into();
    input.lines[0].description = "Otra descripción".into();
    assert_eq!(compute_fingerprint(&input).unwrap(), before);
}

#[test]
fn surrounding_whitespace_is_not_hashed() {
    let mut input = invoice(dec!(119));
    input.number = "INV-001 ".into();
    input.customer_tax_id = " 900123456".into();
    let hashed = fingerprint_input(&FingerprintFields::from(&input)).unwrap();
    assert_eq!(hashed, "INV-00120240501100000119.000119.00900123456TK1PIN1");
    assert_eq!(compute_fingerprint(&input).unwrap().as_str(), SCENARIO_ONE);
}

#[test]
fn missing_fields_are_rejected() {
    let mut input = invoice(dec!(119));
    input.software_pin = "  ".into();
    let err = compute_fingerprint(&input).unwrap_err();
    assert_eq!(err.field, "software_pin");

    let mut input = invoice(dec!(119));
    input.issue_date = "--".into();
    assert_eq!(compute_fingerprint(&input).unwrap_err().field, "issue_date");
}

#[test]
fn date_normalization() {
    assert_eq!(normalize_issue_date("2024-05-01T10:00:00"), "20240501100000");
    assert_eq!(normalize_issue_date("2024-05-01"), "20240501");
}

fn amount() -> impl Strategy<Value = Decimal> {
    (0i64..100_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

proptest! {
    #[test]
    fn fingerprint_is_deterministic(total in amount(), tax in amount(), customer in "[0-9]{6,12}") {
        let mut input = invoice(total);
        input.tax_amount = tax;
        input.customer_tax_id = customer;
        let a = compute_fingerprint(&input).unwrap();
        let b = compute_fingerprint(&input.clone()).unwrap();
        prop_assert_eq!(a.as_str().len(), FINGERPRINT_HEX_LEN);
        prop_assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        prop_assert_eq!(a, b);
    }

    #[test]
    fn any_cent_changes_the_fingerprint(total in amount(), delta in 1i64..1_000) {
        let base = compute_fingerprint(&invoice(total)).unwrap();
        let moved = compute_fingerprint(&invoice(total + Decimal::new(delta, 2))).unwrap();
        prop_assert_ne!(base, moved);
    }

    #[test]
    fn technical_key_is_part_of_the_digest(key in "[A-Za-z0-9]{1,32}") {
        prop_assume!(key != "TK1");
        let mut input = invoice(dec!(119));
        input.technical_key = key;
        let fingerprint = compute_fingerprint(&input).unwrap();
        prop_assert_ne!(fingerprint.as_str(), SCENARIO_ONE);
    }
}
