//! Conversion between human decimal strings and integer base units.
//!
//! Token amounts travel on-chain as integers scaled by `10^decimals`.
//! USDC uses 6 decimals, so `"1.5"` is `1_500_000` base units.

use alloy_primitives::U256;

use crate::error::EthError;

/// Decimals of the USDC token the settlement contract accepts.
pub const USDC_DECIMALS: u8 = 6;

/// Parses a non-negative decimal string into base units.
///
/// Accepts `"100"`, `"1.5"`, `".5"` and `"5."`. Rejects signs, exponents,
/// separators, and more fractional digits than `decimals`.
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256, EthError> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(EthError::InvalidAmount("amount is empty".into()));
    }

    let (whole, fraction) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(EthError::InvalidAmount(format!("not a number: {amount}")));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(EthError::InvalidAmount(format!("not a number: {amount}")));
    }
    if fraction.len() > usize::from(decimals) {
        return Err(EthError::InvalidAmount(format!(
            "too many decimals: at most {decimals} allowed"
        )));
    }

    let mut digits = String::with_capacity(whole.len() + usize::from(decimals));
    digits.push_str(whole);
    digits.push_str(fraction);
    for _ in fraction.len()..usize::from(decimals) {
        digits.push('0');
    }
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }

    U256::from_str_radix(digits, 10)
        .map_err(|e| EthError::InvalidAmount(format!("amount out of range: {e}")))
}

/// Formats base units as a decimal string.
///
/// Trailing fractional zeros are trimmed but at least one fractional digit
/// is kept, so `1_000_000` with 6 decimals is `"1.0"`.
pub fn format_units(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    let decimals = usize::from(decimals);
    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{}{digits}", "0".repeat(decimals - digits.len() + 1))
    } else {
        digits
    };
    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    let fraction = if fraction.is_empty() { "0" } else { fraction };

    format!("{whole}.{fraction}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_whole_amount() {
        assert_eq!(parse_units("100", USDC_DECIMALS).unwrap(), U256::from(100_000_000u64));
    }

    #[test]
    fn parse_fractional_amount() {
        assert_eq!(parse_units("1.5", USDC_DECIMALS).unwrap(), U256::from(1_500_000u64));
        assert_eq!(parse_units("0.000001", USDC_DECIMALS).unwrap(), U256::from(1u64));
    }

    #[test]
    fn parse_bare_point_forms() {
        assert_eq!(parse_units(".5", USDC_DECIMALS).unwrap(), U256::from(500_000u64));
        assert_eq!(parse_units("5.", USDC_DECIMALS).unwrap(), U256::from(5_000_000u64));
    }

    #[test]
    fn parse_zero_forms() {
        assert_eq!(parse_units("0", USDC_DECIMALS).unwrap(), U256::ZERO);
        assert_eq!(parse_units("0.000", USDC_DECIMALS).unwrap(), U256::ZERO);
    }

    #[test]
    fn parse_trims_whitespace() {
        assert_eq!(parse_units(" 2 ", USDC_DECIMALS).unwrap(), U256::from(2_000_000u64));
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["", ".", "-1", "+1", "1e6", "1,000", "abc", "1.2.3"] {
            assert!(parse_units(bad, USDC_DECIMALS).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn parse_rejects_excess_precision() {
        let err = parse_units("1.0000001", USDC_DECIMALS).unwrap_err();
        assert!(err.to_string().contains("too many decimals"));
    }

    #[test]
    fn parse_rejects_overflow() {
        let huge = "9".repeat(90);
        assert!(parse_units(&huge, USDC_DECIMALS).is_err());
    }

    #[test]
    fn format_whole_and_fraction() {
        assert_eq!(format_units(U256::from(1_000_000u64), USDC_DECIMALS), "1.0");
        assert_eq!(format_units(U256::from(1_500_000u64), USDC_DECIMALS), "1.5");
        assert_eq!(format_units(U256::from(123_456_789u64), USDC_DECIMALS), "123.456789");
    }

    #[test]
    fn format_sub_unit_values() {
        assert_eq!(format_units(U256::from(1u64), USDC_DECIMALS), "0.000001");
        assert_eq!(format_units(U256::ZERO, USDC_DECIMALS), "0.0");
    }

    #[test]
    fn format_zero_decimals() {
        assert_eq!(format_units(U256::from(42u64), 0), "42");
    }
}
