//! SD59x18 fixed-point conversion
//!
//! The market contracts speak signed integers scaled by 10^18. The
//! coordinator works in `f64` for UI and chart math, so every value that
//! crosses the boundary goes through `to_fixed` / `from_fixed`.
//!
//! Rounding is half away from zero in both directions:
//! - `to_fixed` rounds the *exact* binary value of `x` times 10^18
//! - `from_fixed` rounds to micro units (6 decimals) in integer arithmetic
//!   and only then converts to `f64`, so no huge integer is ever divided
//!   in floating point.

use core::fmt;
use core::str::FromStr;

use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{ModelError, DECIMALS, DISPLAY_DECIMALS};

/// Signed fixed-point number with 18 fractional decimal digits
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fixed18(BigInt);

impl Fixed18 {
    /// Wrap a raw on-chain integer (already scaled by 10^18)
    pub fn from_raw(raw: impl Into<BigInt>) -> Self {
        Fixed18(raw.into())
    }

    pub fn zero() -> Self {
        Fixed18(BigInt::zero())
    }

    /// Raw scaled integer as sent to / received from the contract
    pub fn raw(&self) -> &BigInt {
        &self.0
    }

    pub fn into_raw(self) -> BigInt {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    /// Display-precision float (see [`from_fixed`])
    pub fn to_f64(&self) -> f64 {
        from_fixed(self)
    }
}

impl fmt::Debug for Fixed18 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fixed18({})", self)
    }
}

/// Exact decimal rendering, trailing zeros trimmed (`3.2`, `-0.5`, `100`)
impl fmt::Display for Fixed18 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_signed_scaled(&self.0, DECIMALS))
    }
}

/// Parses the raw scaled integer (`3200000000000000000` for 3.2)
impl FromStr for Fixed18 {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<BigInt>()
            .map(Fixed18)
            .map_err(|_| ModelError::InvalidAmount(s.to_string()))
    }
}

impl Serialize for Fixed18 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Fixed18 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Convert a float to SD59x18, rounding `x * 10^18` half away from zero
///
/// The product is computed exactly from the float's mantissa and exponent,
/// so values up to ±1e40 and beyond keep their sign and never overflow.
///
/// # Returns
/// * `ModelError::NonFinite` for NaN and infinities
pub fn to_fixed(x: f64) -> Result<Fixed18, ModelError> {
    if !x.is_finite() {
        return Err(ModelError::NonFinite);
    }

    let bits = x.to_bits();
    let negative = bits >> 63 == 1;
    let biased_exp = ((bits >> 52) & 0x7ff) as i64;
    let fraction = bits & ((1u64 << 52) - 1);

    // x = mantissa * 2^exp2
    let (mantissa, exp2) = if biased_exp == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u64 << 52), biased_exp - 1075)
    };

    let numerator = BigInt::from(mantissa) * pow10(DECIMALS);
    let magnitude = if exp2 >= 0 {
        numerator << (exp2 as usize)
    } else {
        div_round_half_away(&numerator, &(BigInt::one() << ((-exp2) as usize)))
    };

    Ok(Fixed18(if negative { -magnitude } else { magnitude }))
}

/// Convert SD59x18 to a float with 6 decimal digits of precision
///
/// Computes `round(v * 10^6 / 10^18) / 10^6` with the division done on
/// integers (half away from zero). The final step parses the exact decimal,
/// which yields the nearest `f64`, so `from_fixed(to_fixed(x)) == x` for
/// every `x` written with at most 6 decimals.
pub fn from_fixed(v: &Fixed18) -> f64 {
    let micros = div_round_half_away(&v.0, &pow10(DECIMALS - DISPLAY_DECIMALS));
    format_signed_scaled(&micros, DISPLAY_DECIMALS)
        .parse::<f64>()
        .unwrap_or(f64::NAN)
}

/// 10^exp as a big integer
pub(crate) fn pow10(exp: u32) -> BigInt {
    BigInt::from(10u32).pow(exp)
}

/// Integer division rounding half away from zero (`denominator > 0`)
pub(crate) fn div_round_half_away(numerator: &BigInt, denominator: &BigInt) -> BigInt {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if (remainder.abs() << 1usize) >= *denominator {
        quotient + numerator.signum()
    } else {
        quotient
    }
}

/// Render `value / 10^decimals` exactly, trimming trailing zeros
pub(crate) fn format_signed_scaled(value: &BigInt, decimals: u32) -> String {
    let scale = pow10(decimals);
    let magnitude = value.abs();
    let whole = &magnitude / &scale;
    let frac = (&magnitude % &scale).to_u128().unwrap_or(0);

    let sign = if value.is_negative() { "-" } else { "" };
    if frac == 0 {
        return format!("{}{}", sign, whole);
    }

    let digits = format!("{:0width$}", frac, width = decimals as usize);
    format!("{}{}.{}", sign, whole, digits.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn raw(s: &str) -> BigInt {
        s.parse().unwrap()
    }

    #[test]
    fn test_to_fixed_simple_values() {
        assert_eq!(to_fixed(1.0).unwrap().raw(), &raw("1000000000000000000"));
        assert_eq!(to_fixed(3.2).unwrap().raw(), &raw("3200000000000000000"));
        assert_eq!(to_fixed(-0.5).unwrap().raw(), &raw("-500000000000000000"));
        assert_eq!(to_fixed(0.0).unwrap().raw(), &BigInt::zero());
        assert_eq!(to_fixed(-0.0).unwrap().raw(), &BigInt::zero());
    }

    #[test]
    fn test_to_fixed_rejects_non_finite() {
        assert_eq!(to_fixed(f64::NAN), Err(ModelError::NonFinite));
        assert_eq!(to_fixed(f64::INFINITY), Err(ModelError::NonFinite));
        assert_eq!(to_fixed(f64::NEG_INFINITY), Err(ModelError::NonFinite));
    }

    #[test]
    fn test_to_fixed_rounds_half_away_from_zero() {
        // 2^-61 * 10^18 = 0.4336... rounds to 0; 2^-60 * 10^18 = 0.867 rounds to 1
        assert_eq!(to_fixed(2f64.powi(-61)).unwrap().raw(), &BigInt::zero());
        assert_eq!(to_fixed(2f64.powi(-60)).unwrap().raw(), &BigInt::one());
        assert_eq!(to_fixed(-(2f64.powi(-60))).unwrap().raw(), &-BigInt::one());
    }

    #[test]
    fn test_from_fixed_display_precision() {
        assert_eq!(from_fixed(&Fixed18::from_raw(raw("3200000000000000000"))), 3.2);
        // 1.2345675 rounds up at the micro digit
        assert_eq!(from_fixed(&Fixed18::from_raw(raw("1234567500000000000"))), 1.234568);
        assert_eq!(from_fixed(&Fixed18::from_raw(raw("-1234567500000000000"))), -1.234568);
        assert_eq!(from_fixed(&Fixed18::from_raw(raw("1234567499999999999"))), 1.234567);
        // below half a micro collapses to zero
        assert_eq!(from_fixed(&Fixed18::from_raw(raw("499999999999"))), 0.0);
    }

    #[test]
    fn test_large_values_keep_sign() {
        for x in [1e40, -1e40, 123456789.0e30, -9.87e39] {
            let fixed = to_fixed(x).unwrap();
            assert_eq!(fixed.is_negative(), x < 0.0);
            let back = from_fixed(&fixed);
            assert!(back.is_finite());
            assert_eq!(back.is_sign_negative(), x < 0.0);
            assert!(((back - x) / x).abs() < 1e-12);
        }
    }

    #[test]
    fn test_display_and_parse() {
        let fixed = to_fixed(-12.5).unwrap();
        assert_eq!(fixed.to_string(), "-12.5");
        assert_eq!(to_fixed(100.0).unwrap().to_string(), "100");
        let parsed: Fixed18 = "3200000000000000000".parse().unwrap();
        assert_eq!(parsed, to_fixed(3.2).unwrap());
        assert!("3.2".parse::<Fixed18>().is_err());
    }

    #[test]
    fn test_serde_as_raw_string() {
        let fixed = to_fixed(3.2).unwrap();
        let json = serde_json::to_string(&fixed).unwrap();
        assert_eq!(json, "\"3200000000000000000\"");
        let back: Fixed18 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fixed);
    }

    proptest! {
        #[test]
        fn prop_round_trip_six_decimals(whole in -999_999_999_999i64..=999_999_999_999i64, micros in 0u32..1_000_000) {
            let sign = if whole < 0 { "-" } else { "" };
            let x: f64 = format!("{}{}.{:06}", sign, whole.unsigned_abs(), micros).parse().unwrap();
            prop_assert_eq!(from_fixed(&to_fixed(x).unwrap()), x);
        }

        #[test]
        fn prop_sign_preserved(x in -1e40f64..1e40f64) {
            let fixed = to_fixed(x).unwrap();
            let back = from_fixed(&fixed);
            prop_assert!(back.is_finite());
            if x.abs() >= 1e-6 {
                prop_assert_eq!(back < 0.0, x < 0.0);
            }
        }
    }
}
