//! Fixed-point monetary amounts.
//!
//! Per the design notes, BT2C amounts are never represented as binary
//! floating point. An [`Amount`] stores a count of 1e-8 units ("satoshi" in
//! the original source) as an `i128`, giving headroom far beyond
//! `MAX_SUPPLY` with explicit overflow checks on every arithmetic operation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of fractional digits every amount is quantized to.
pub const SCALE: u32 = 8;
const UNITS_PER_WHOLE: i128 = 100_000_000; // 10^SCALE

/// A non-negative-by-convention fixed-point amount, stored as 1e-8 units.
///
/// `Amount` intentionally does not implement `Copy`-free arithmetic traits
/// that could silently overflow; use the checked methods instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// One satoshi, the smallest representable unit (1e-8 BT2C).
    pub const SATOSHI: Amount = Amount(1);

    /// Constructs an amount directly from a count of 1e-8 units.
    pub const fn from_units(units: i128) -> Self {
        Amount(units)
    }

    /// Constructs an amount from a whole-number count of BT2C.
    pub const fn from_whole(whole: i64) -> Self {
        Amount(whole as i128 * UNITS_PER_WHOLE)
    }

    /// Parses a decimal string such as `"10.5"` or `"0.00000001"` into an
    /// [`Amount`], rejecting more than [`SCALE`] fractional digits.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidFormat("empty amount".into()));
        }
        let (neg, s) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let mut parts = s.splitn(2, '.');
        let int_part = parts.next().unwrap_or("0");
        let frac_part = parts.next().unwrap_or("");
        if frac_part.len() > SCALE as usize {
            return Err(Error::InvalidFormat(format!(
                "amount {s} has too many decimal places (max {SCALE})"
            )));
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(Error::InvalidFormat(format!("invalid decimal literal {s}")));
        }
        let int_val: i128 = int_part
            .parse()
            .map_err(|_| Error::InvalidFormat(format!("invalid decimal literal {s}")))?;
        let mut frac_str = frac_part.to_string();
        while frac_str.len() < SCALE as usize {
            frac_str.push('0');
        }
        let frac_val: i128 = if frac_str.is_empty() {
            0
        } else {
            frac_str
                .parse()
                .map_err(|_| Error::InvalidFormat(format!("invalid decimal literal {s}")))?
        };
        let units = int_val
            .checked_mul(UNITS_PER_WHOLE)
            .and_then(|v| v.checked_add(frac_val))
            .ok_or_else(|| Error::InvalidFormat(format!("amount {s} overflows")))?;
        Ok(Amount(if neg { -units } else { units }))
    }

    /// Raw count of 1e-8 units.
    pub const fn units(self) -> i128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Amount) -> Result<Amount> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or_else(|| Error::InvalidFormat("amount addition overflow".into()))
    }

    pub fn checked_sub(self, other: Amount) -> Result<Amount> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or_else(|| Error::InvalidFormat("amount subtraction overflow".into()))
    }

    /// Divides by an integer divisor, rounding towards zero (round down for
    /// positive amounts), as required by `calculate_fee`.
    pub fn div_round_down(self, divisor: i128) -> Amount {
        Amount(self.0 / divisor)
    }

    pub fn max(self, other: Amount) -> Amount {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }

    pub fn min(self, other: Amount) -> Amount {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for Amount {
    /// Renders without trailing zeros beyond significance, e.g. `10`,
    /// `10.5`, `0.00000001`. Negative amounts are not expected in practice
    /// but round-trip correctly.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let neg = self.0 < 0;
        let abs = self.0.unsigned_abs();
        let whole = abs / UNITS_PER_WHOLE as u128;
        let frac = abs % UNITS_PER_WHOLE as u128;
        if neg {
            write!(f, "-")?;
        }
        if frac == 0 {
            write!(f, "{whole}")
        } else {
            let frac_str = format!("{frac:08}");
            let trimmed = frac_str.trim_end_matches('0');
            write!(f, "{whole}.{trimmed}")
        }
    }
}

impl FromStr for Amount {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Amount::parse(s)
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> core::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_round_trip() {
        for s in ["10", "10.5", "0.00000001", "1000000000"] {
            let amount = Amount::parse(s).unwrap();
            assert_eq!(amount.to_string(), s);
        }
    }

    #[test]
    fn rejects_excess_precision() {
        assert!(Amount::parse("1.123456789").is_err());
    }

    #[test]
    fn checked_arithmetic_detects_overflow() {
        let huge = Amount::from_units(i128::MAX);
        assert!(huge.checked_add(Amount::SATOSHI).is_err());
    }

    #[test]
    fn div_round_down_truncates() {
        let a = Amount::parse("1.00000003").unwrap();
        assert_eq!(a.div_round_down(4).to_string(), "0.00000000");
    }
}
