//! Fixed-point decimal arithmetic over [`num::BigInt`].
//!
//! A [`Decimal`] is a `BigInt` mantissa paired with a decimal scale: the
//! value is `mantissa / 10^scale`. The series engines compute at a working
//! scale of [`Precision::digits`] plus [`GUARD_DIGITS`] and round published
//! values back to the configured digits, so accumulated truncation error
//! stays below the last published digit.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Sub};
use std::str::FromStr;

use num::{BigInt, Signed, Zero};
use serde::{Serialize, Serializer};

/// Extra digits carried during computation beyond the published precision.
pub const GUARD_DIGITS: u32 = 10;

/// Number of fractional decimal digits published by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Precision {
    digits: u32,
}

impl Precision {
    /// Creates a precision of `digits` fractional digits.
    pub const fn new(digits: u32) -> Self {
        Self { digits }
    }

    /// Returns the number of published fractional digits.
    pub fn digits(self) -> u32 {
        self.digits
    }

    /// Returns the scale used for intermediate computation.
    pub fn working_scale(self) -> u32 {
        self.digits + GUARD_DIGITS
    }
}

/// Error returned when a string is not a plain decimal literal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid decimal literal: {input:?}")]
pub struct ParseDecimalError {
    input: String,
}

/// Arbitrary-precision fixed-point decimal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decimal {
    mantissa: BigInt,
    scale: u32,
}

fn pow10(exp: u32) -> BigInt {
    BigInt::from(10u32).pow(exp)
}

impl Decimal {
    /// Zero at the given scale.
    pub fn zero(scale: u32) -> Self {
        Self {
            mantissa: BigInt::zero(),
            scale,
        }
    }

    /// Exact integer value at the given scale.
    pub fn from_integer(value: impl Into<BigInt>, scale: u32) -> Self {
        Self {
            mantissa: value.into() * pow10(scale),
            scale,
        }
    }

    /// `numer / denom` truncated toward zero at the given scale.
    ///
    /// # Panics
    ///
    /// Panics if `denom` is zero.
    pub fn from_ratio(numer: &BigInt, denom: &BigInt, scale: u32) -> Self {
        Self {
            mantissa: numer * pow10(scale) / denom,
            scale,
        }
    }

    /// Square root of a non-negative integer, truncated at the given scale.
    pub fn sqrt_of(value: u64, scale: u32) -> Self {
        let radicand = BigInt::from(value) * pow10(2 * scale);
        Self {
            mantissa: radicand.sqrt(),
            scale,
        }
    }

    /// Returns the number of fractional digits.
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Returns the raw mantissa (`value * 10^scale`).
    pub fn mantissa(&self) -> &BigInt {
        &self.mantissa
    }

    /// Returns `true` if the value is zero.
    pub fn is_zero(&self) -> bool {
        self.mantissa.is_zero()
    }

    /// Multiplies by an integer, keeping the scale.
    pub fn mul_int(&self, factor: impl Into<BigInt>) -> Self {
        Self {
            mantissa: &self.mantissa * factor.into(),
            scale: self.scale,
        }
    }

    /// Converts to another scale, rounding half away from zero when digits
    /// are dropped.
    pub fn rescale(&self, scale: u32) -> Self {
        match scale.cmp(&self.scale) {
            Ordering::Equal => self.clone(),
            Ordering::Greater => Self {
                mantissa: &self.mantissa * pow10(scale - self.scale),
                scale,
            },
            Ordering::Less => {
                let divisor = pow10(self.scale - scale);
                let half = &divisor / BigInt::from(2u32);
                let magnitude = (self.mantissa.abs() + half) / divisor;
                let mantissa = if self.mantissa.is_negative() {
                    -magnitude
                } else {
                    magnitude
                };
                Self { mantissa, scale }
            }
        }
    }

    /// Absolute difference at the larger of the two scales.
    pub fn abs_diff(&self, other: &Decimal) -> Decimal {
        let diff = self - other;
        Self {
            mantissa: diff.mantissa.abs(),
            scale: diff.scale,
        }
    }

    /// Largest `n` such that `|self - other| < 10^-n`.
    ///
    /// Identical values report the larger of the two scales.
    pub fn matching_digits(&self, other: &Decimal) -> u32 {
        let diff = self.abs_diff(other);
        if diff.is_zero() {
            return diff.scale;
        }
        let width = diff.mantissa.to_string().len() as u32;
        diff.scale.saturating_sub(width)
    }

    fn aligned(&self, other: &Decimal) -> (BigInt, BigInt, u32) {
        let scale = self.scale.max(other.scale);
        (
            self.rescale(scale).mantissa,
            other.rescale(scale).mantissa,
            scale,
        )
    }
}

impl AddAssign<&Decimal> for Decimal {
    fn add_assign(&mut self, rhs: &Decimal) {
        if rhs.scale == self.scale {
            self.mantissa += &rhs.mantissa;
        } else {
            self.mantissa += rhs.rescale(self.scale).mantissa;
        }
    }
}

impl Add for &Decimal {
    type Output = Decimal;

    fn add(self, rhs: &Decimal) -> Decimal {
        let (a, b, scale) = self.aligned(rhs);
        Decimal {
            mantissa: a + b,
            scale,
        }
    }
}

impl Sub for &Decimal {
    type Output = Decimal;

    fn sub(self, rhs: &Decimal) -> Decimal {
        let (a, b, scale) = self.aligned(rhs);
        Decimal {
            mantissa: a - b,
            scale,
        }
    }
}

/// Quotient at the dividend's scale, truncated toward zero.
///
/// # Panics
///
/// Panics if the divisor is zero.
impl Div for &Decimal {
    type Output = Decimal;

    fn div(self, rhs: &Decimal) -> Decimal {
        Decimal {
            mantissa: &self.mantissa * pow10(rhs.scale) / &rhs.mantissa,
            scale: self.scale,
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.abs().to_string();
        let sign = if self.mantissa.is_negative() { "-" } else { "" };
        if self.scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let scale = self.scale as usize;
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseDecimalError {
            input: s.to_string(),
        };
        let trimmed = s.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part
            .chars()
            .chain(frac_part.chars())
            .all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }
        let joined = format!("{int_part}{frac_part}");
        let magnitude = BigInt::from_str(&joined).map_err(|_| invalid())?;
        Ok(Self {
            mantissa: if negative { -magnitude } else { magnitude },
            scale: frac_part.len() as u32,
        })
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
