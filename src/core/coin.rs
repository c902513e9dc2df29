//! Currency amounts and exact rationals
//!
//! `Coin` counts smallest units (`10^5` per LNO). All arithmetic is checked:
//! an overflow or a subtraction below zero is an error, never a wraparound.
//! `Ratio` is an exact non-negative fraction used for growth rates,
//! allocations and thresholds so that inflation never touches floating point.

use crate::core::error::{LedgerError, LedgerResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Smallest units per display unit (LNO)
pub const DECIMALS: u128 = 100_000;

/// Number of fractional digits accepted in an LNO string
pub const DECIMAL_PLACES: usize = 5;

/// Largest LNO amount accepted from user input
pub const MAX_LNO: u128 = (i64::MAX as u128) / DECIMALS;

/// A non-negative amount in smallest currency units.
///
/// Serialized as a decimal string of units so values above `u64::MAX`
/// survive JSON round trips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coin(u128);

impl Coin {
    pub const ZERO: Coin = Coin(0);

    pub const fn new(units: u128) -> Self {
        Coin(units)
    }

    /// Whole LNO amount
    pub fn from_lno(lno: u64) -> LedgerResult<Self> {
        (lno as u128)
            .checked_mul(DECIMALS)
            .map(Coin)
            .ok_or_else(|| LedgerError::overflow(format!("{} LNO", lno)))
    }

    /// Parse a decimal LNO string such as `"12.5"` into coins.
    ///
    /// At most five fractional digits; the value must be at least one
    /// smallest unit and at most `i64::MAX / 10^5` LNO.
    pub fn parse_lno(lno: &str) -> LedgerResult<Self> {
        let lno = lno.trim();
        let (whole, frac) = match lno.split_once('.') {
            Some((w, f)) => (w, f),
            None => (lno, ""),
        };

        let digits_ok = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !digits_ok(whole) || !digits_ok(frac) {
            return Err(LedgerError::invalid_amount(format!("illegal LNO {:?}", lno)));
        }
        if frac.len() > DECIMAL_PLACES {
            return Err(LedgerError::invalid_amount(format!(
                "LNO {:?} has more than {} decimal places",
                lno, DECIMAL_PLACES
            )));
        }

        let whole_units: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| LedgerError::overflow(format!("LNO {:?}", lno)))?
        };
        if whole_units > MAX_LNO {
            return Err(LedgerError::overflow(format!("LNO {:?}", lno)));
        }

        let frac_units: u128 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac, width = DECIMAL_PLACES);
            padded
                .parse()
                .map_err(|_| LedgerError::invalid_amount(format!("illegal LNO {:?}", lno)))?
        };

        let units = whole_units * DECIMALS + frac_units;
        if units > MAX_LNO * DECIMALS {
            return Err(LedgerError::overflow(format!("LNO {:?}", lno)));
        }
        if units == 0 {
            return Err(LedgerError::invalid_amount(format!(
                "LNO {:?} is below the lower bound",
                lno
            )));
        }
        Ok(Coin(units))
    }

    pub fn units(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Coin) -> LedgerResult<Coin> {
        self.0
            .checked_add(other.0)
            .map(Coin)
            .ok_or_else(|| LedgerError::overflow(format!("{} + {}", self, other)))
    }

    /// Subtraction that refuses to go below zero
    pub fn checked_sub(self, other: Coin) -> Option<Coin> {
        self.0.checked_sub(other.0).map(Coin)
    }

    pub fn saturating_sub(self, other: Coin) -> Coin {
        Coin(self.0.saturating_sub(other.0))
    }

    /// `self * ratio`, rounded down
    pub fn mul_ratio(self, ratio: Ratio) -> LedgerResult<Coin> {
        self.0
            .checked_mul(ratio.num)
            .map(|n| Coin(n / ratio.den))
            .ok_or_else(|| LedgerError::overflow(format!("{} * {}", self, ratio)))
    }

    /// Split into `parts` equal shares; returns `(share, remainder)`
    pub fn split(self, parts: u128) -> (Coin, Coin) {
        if parts == 0 {
            return (Coin::ZERO, self);
        }
        (Coin(self.0 / parts), Coin(self.0 % parts))
    }

    /// Sum a sequence of amounts without overflow
    pub fn sum<I: IntoIterator<Item = Coin>>(iter: I) -> LedgerResult<Coin> {
        iter.into_iter()
            .try_fold(Coin::ZERO, |acc, c| acc.checked_add(c))
    }

    /// Render as a decimal LNO string
    pub fn to_lno_string(self) -> String {
        let whole = self.0 / DECIMALS;
        let frac = self.0 % DECIMALS;
        if frac == 0 {
            whole.to_string()
        } else {
            let frac = format!("{:05}", frac);
            format!("{}.{}", whole, frac.trim_end_matches('0'))
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "coin:{}", self.0)
    }
}

impl Serialize for Coin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Coin {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<u128>()
            .map(Coin)
            .map_err(|_| serde::de::Error::custom(format!("illegal coin amount {:?}", s)))
    }
}

impl From<u64> for Coin {
    fn from(units: u64) -> Self {
        Coin(units as u128)
    }
}

/// Exact non-negative rational number
#[derive(Debug, Clone, Copy)]
pub struct Ratio {
    num: u128,
    den: u128,
}

impl Ratio {
    pub const ZERO: Ratio = Ratio { num: 0, den: 1 };
    pub const ONE: Ratio = Ratio { num: 1, den: 1 };

    /// Build `num/den` in lowest terms. A zero denominator is rejected.
    pub fn new(num: u128, den: u128) -> LedgerResult<Self> {
        if den == 0 {
            return Err(LedgerError::invalid_amount("ratio with zero denominator"));
        }
        let g = gcd(num, den);
        Ok(Ratio {
            num: num / g,
            den: den / g,
        })
    }

    pub fn numer(&self) -> u128 {
        self.num
    }

    pub fn denom(&self) -> u128 {
        self.den
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    pub fn checked_mul(self, other: Ratio) -> LedgerResult<Ratio> {
        // cross-reduce first to keep the parts small
        let g1 = gcd(self.num, other.den).max(1);
        let g2 = gcd(other.num, self.den).max(1);
        let num = (self.num / g1)
            .checked_mul(other.num / g2)
            .ok_or_else(|| LedgerError::overflow(format!("{} * {}", self, other)))?;
        let den = (self.den / g2)
            .checked_mul(other.den / g1)
            .ok_or_else(|| LedgerError::overflow(format!("{} * {}", self, other)))?;
        Ratio::new(num, den)
    }

    pub fn checked_add(self, other: Ratio) -> LedgerResult<Ratio> {
        let overflow = || LedgerError::overflow(format!("{} + {}", self, other));
        let g = gcd(self.den, other.den);
        let den = (self.den / g).checked_mul(other.den).ok_or_else(overflow)?;
        let left = self.num.checked_mul(den / self.den).ok_or_else(overflow)?;
        let right = other.num.checked_mul(den / other.den).ok_or_else(overflow)?;
        Ratio::new(left.checked_add(right).ok_or_else(overflow)?, den)
    }

    /// Does `self * whole` strictly exceed `part`?
    ///
    /// Used for threshold checks without dividing.
    pub fn is_exceeded_by(&self, part: u128, whole: u128) -> bool {
        // part / whole > num / den  <=>  part * den > num * whole
        match (part.checked_mul(self.den), self.num.checked_mul(whole)) {
            (Some(lhs), Some(rhs)) => lhs > rhs,
            (None, Some(_)) => true,
            (Some(_), None) => false,
            (None, None) => {
                // both sides huge: compare via the integer parts
                part / whole > self.num / self.den
            }
        }
    }
}

impl PartialEq for Ratio {
    fn eq(&self, other: &Self) -> bool {
        self.num == other.num && self.den == other.den
    }
}

impl Eq for Ratio {}

impl PartialOrd for Ratio {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ratio {
    fn cmp(&self, other: &Self) -> Ordering {
        match (
            self.num.checked_mul(other.den),
            other.num.checked_mul(self.den),
        ) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => (self.num / self.den).cmp(&(other.num / other.den)),
        }
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl FromStr for Ratio {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || LedgerError::invalid_amount(format!("illegal ratio {:?}", s));
        let (num, den) = match s.trim().split_once('/') {
            Some((n, d)) => (n.trim(), d.trim()),
            None => (s.trim(), "1"),
        };
        let num = num.parse().map_err(|_| bad())?;
        let den = den.parse().map_err(|_| bad())?;
        Ratio::new(num, den)
    }
}

impl Serialize for Ratio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    if a == 0 {
        1
    } else {
        a
    }
}
