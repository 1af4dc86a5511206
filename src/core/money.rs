use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Two amounts agree when they differ by less than one cent.
pub const MONEY_EPSILON: Decimal = dec!(0.01);

/// Format an amount with exactly two decimal places, `.` as separator and
/// no grouping. This is the representation used both for the fingerprint input and
/// for every amount in the XML document.
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let s = rounded.to_string();
    match s.find('.') {
        Some(dot) => {
            let decimals = s.len() - dot - 1;
            if decimals < 2 {
                format!("{s}{}", "0".repeat(2 - decimals))
            } else {
                s
            }
        }
        None => format!("{s}.00"),
    }
}

/// Quantities keep their own scale but never drop below two decimals.
pub fn format_quantity(qty: Decimal) -> String {
    let s = qty.normalize().to_string();
    match s.find('.') {
        Some(dot) if s.len() - dot - 1 >= 2 => s,
        _ => format_amount(qty),
    }
}

pub fn amounts_agree(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() < MONEY_EPSILON
}
