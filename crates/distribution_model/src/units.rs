//! Decimal amount strings <-> scaled integers (parseEther / formatEther)

use num_bigint::{BigInt, BigUint};

use crate::fixed::{format_signed_scaled, pow10};
use crate::types::Amount;
use crate::{ModelError, DECIMALS};

/// Parse an unsigned decimal string into an integer scaled by 10^decimals
///
/// Accepts `"1"`, `"1.5"`, `".5"`, `"5."`. Rejects signs, exponents and
/// more fractional digits than `decimals`.
pub fn parse_units(text: &str, decimals: u32) -> Result<Amount, ModelError> {
    let invalid = || ModelError::InvalidAmount(text.to_string());
    let trimmed = text.trim();

    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > decimals as usize {
        return Err(invalid());
    }

    let padded = format!("{}{:0<width$}", whole, frac, width = decimals as usize);
    let digits = padded.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(Amount::default());
    }
    digits.parse::<BigUint>().map_err(|_| invalid())
}

/// Format an integer scaled by 10^decimals, trailing zeros trimmed
pub fn format_units(amount: &Amount, decimals: u32) -> String {
    format_signed_scaled(&BigInt::from(amount.clone()), decimals)
}

/// `parse_units(text, 18)`
pub fn parse_ether(text: &str) -> Result<Amount, ModelError> {
    parse_units(text, DECIMALS)
}

/// `format_units(amount, 18)`
pub fn format_ether(amount: &Amount) -> String {
    format_units(amount, DECIMALS)
}

/// One whole unit (10^18) as an amount
pub fn ether(whole: u64) -> Amount {
    Amount::from(whole) * pow10(DECIMALS).magnitude()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ether() {
        assert_eq!(parse_ether("1").unwrap(), ether(1));
        assert_eq!(parse_ether("1.5").unwrap(), Amount::from(1_500_000_000_000_000_000u64));
        assert_eq!(parse_ether(".5").unwrap(), Amount::from(500_000_000_000_000_000u64));
        assert_eq!(parse_ether("0").unwrap(), Amount::default());
        assert_eq!(parse_ether(" 500 ").unwrap(), ether(500));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", ".", "-1", "1e18", "1.2.3", "abc", "0.0000000000000000001"] {
            assert!(parse_ether(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_format_ether() {
        assert_eq!(format_ether(&ether(500)), "500");
        assert_eq!(format_ether(&Amount::from(1_500_000_000_000_000_000u64)), "1.5");
        assert_eq!(format_ether(&Amount::from(1u32)), "0.000000000000000001");
        assert_eq!(format_ether(&Amount::default()), "0");
    }

    #[test]
    fn test_format_units_six_decimals() {
        assert_eq!(format_units(&Amount::from(1_234_500u32), 6), "1.2345");
        assert_eq!(parse_units("1.2345", 6).unwrap(), Amount::from(1_234_500u32));
    }
}
