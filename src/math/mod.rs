//! Safe conversions across u64/u128/scaled-fraction account fields and
//! division to a float with explicit precision.
//!
//! The on-chain accounts this crate decodes store amounts either as plain
//! integers, as "scaled fractions" (an integer representing a real value
//! scaled by `1e18`, abbreviated SF), or as 256-bit "big fractions" (four
//! little-endian `u64` limbs, abbreviated BSF). This module is the single
//! place that knows how to move between those representations and a
//! `BigInt`/`f64`, mirroring the `decimal-wad` crate's `Fraction`/`U192`
//! machinery the teacher program already depends on.

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::error::LiqsolError;

/// 1e18, the scale factor for a "scaled fraction" (SF) field.
pub const SF_SCALE: u128 = 1_000_000_000_000_000_000;

/// Four little-endian 64-bit limbs encoding a 256-bit unsigned integer, as
/// stored on-chain for fields like `cumulativeBorrowRateBsf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BigFractionBytes {
    pub value: [u64; 4],
}

/// Anything that [`to_bigint`] knows how to interpret as an arbitrary
/// precision integer.
#[derive(Debug, Clone)]
pub enum BigIntLike {
    I64(i64),
    U64(u64),
    I128(i128),
    U128(u128),
    /// Decimal-digit string, optionally prefixed with `-`. No scientific
    /// notation, no fractional point.
    DecimalString(String),
    /// `{bsf: ...}` shape: a scaled fraction expressed as a big integer.
    Bsf(BigInt),
    /// `{raw: ...}` shape: an already-parsed big integer passed through.
    Raw(BigInt),
    /// `{value: [u64; 4]}` shape: the 256-bit big-fraction limb encoding.
    Limbs([u64; 4]),
}

/// `bigFractionBytesToBigInt({value:[a,b,c,d]})` = `a + b*2^64 + c*2^128 + d*2^192`.
pub fn big_fraction_bytes_to_bigint(bytes: &BigFractionBytes) -> BigInt {
    let [a, b, c, d] = bytes.value;
    let mut acc = BigInt::from(a);
    acc += BigInt::from(b) << 64;
    acc += BigInt::from(c) << 128;
    acc += BigInt::from(d) << 192;
    acc
}

/// Rejects scientific notation and non-integer strings with a descriptive
/// error; accepts an optional leading `-` and only ASCII digits otherwise.
fn parse_decimal_digit_string(s: &str) -> Result<BigInt, LiqsolError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(LiqsolError::bad_input("empty numeric string"));
    }
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LiqsolError::bad_input(format!(
            "not a decimal-digit integer string: {s:?}"
        )));
    }
    let magnitude: BigInt = digits
        .parse()
        .map_err(|_| LiqsolError::bad_input(format!("failed to parse integer string: {s:?}")))?;
    Ok(magnitude * sign)
}

/// `toBigInt(v)` — accepts signed 64/128-bit integers, decimal-digit
/// strings, structured objects with `{bsf}`, `{raw}`, `{value: [4 u64 LE
/// limbs]}`, or numeric-string-like values. Rejects scientific notation and
/// non-integer strings with a descriptive error.
pub fn to_bigint(v: &BigIntLike) -> Result<BigInt, LiqsolError> {
    match v {
        BigIntLike::I64(x) => Ok(BigInt::from(*x)),
        BigIntLike::U64(x) => Ok(BigInt::from(*x)),
        BigIntLike::I128(x) => Ok(BigInt::from(*x)),
        BigIntLike::U128(x) => Ok(BigInt::from(*x)),
        BigIntLike::DecimalString(s) => parse_decimal_digit_string(s),
        BigIntLike::Bsf(x) | BigIntLike::Raw(x) => Ok(x.clone()),
        BigIntLike::Limbs(limbs) => Ok(big_fraction_bytes_to_bigint(&BigFractionBytes {
            value: *limbs,
        })),
    }
}

/// Safe variant of [`to_bigint`]: returns `default` instead of propagating a
/// parse failure.
pub fn to_bigint_safe(v: &BigIntLike, default: BigInt) -> BigInt {
    to_bigint(v).unwrap_or(default)
}

/// `divBigintToNumber(num, den, precision=18)`: scales the numerator by
/// `10^precision`, integer-divides, converts to `f64`, then rescales back
/// down by `10^precision`. Fails with `division_by_zero` when `den == 0`.
pub fn div_bigint_to_number(num: &BigInt, den: &BigInt, precision: u32) -> Result<f64, LiqsolError> {
    if den.is_zero() {
        return Err(LiqsolError::bad_input("division_by_zero"));
    }
    let scale = BigInt::from(10u64).pow(precision);
    let scaled_num = num * &scale;
    let quotient = &scaled_num / den;
    let quotient_f64 = quotient
        .to_f64()
        .ok_or_else(|| LiqsolError::bad_input("quotient too large to represent as f64"))?;
    Ok(quotient_f64 / 10f64.powi(precision as i32))
}

/// Safe variant of [`div_bigint_to_number`]: returns `default` instead of
/// propagating a division-by-zero or overflow failure.
pub fn div_bigint_to_number_safe(num: &BigInt, den: &BigInt, precision: u32, default: f64) -> f64 {
    div_bigint_to_number(num, den, precision).unwrap_or(default)
}

/// Interprets a `u128` scaled-fraction (SF) liquidity amount as a plain
/// `f64` number of liquidity-base-units, i.e. `sf as f64 / 1e18`.
pub fn sf_to_f64(sf: u128) -> f64 {
    div_bigint_to_number_safe(&BigInt::from(sf), &BigInt::from(SF_SCALE), 18, 0.0)
}

/// `string -> (integer+fractional split, pad to decimals) -> big integer`.
/// Converts a human-entered UI amount string (e.g. `"12.5"`) into base units
/// given the mint's decimal count, without ever routing through
/// `f64::parse` (forbidden in hot paths per the design notes: floating point
/// drift risk).
pub fn ui_amount_to_base_units(ui_amount: &str, decimals: u8) -> Result<u64, LiqsolError> {
    let trimmed = ui_amount.trim();
    if trimmed.is_empty() {
        return Err(LiqsolError::bad_input("empty UI amount"));
    }
    if trimmed.contains(['e', 'E']) {
        return Err(LiqsolError::bad_input(format!(
            "scientific notation not accepted: {trimmed:?}"
        )));
    }
    let (sign, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, trimmed),
    };
    if sign < 0 {
        return Err(LiqsolError::bad_input("negative UI amount not allowed"));
    }

    let mut parts = unsigned.splitn(2, '.');
    let integer_part = parts.next().unwrap_or("");
    let fractional_part = parts.next().unwrap_or("");
    if parts.next().is_some() {
        return Err(LiqsolError::bad_input(format!(
            "malformed decimal amount: {trimmed:?}"
        )));
    }
    if (integer_part.is_empty() && fractional_part.is_empty())
        || !integer_part.bytes().all(|b| b.is_ascii_digit())
        || !fractional_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(LiqsolError::bad_input(format!(
            "non-numeric UI amount: {trimmed:?}"
        )));
    }
    if fractional_part.len() > decimals as usize {
        return Err(LiqsolError::bad_input(format!(
            "amount {trimmed:?} has more precision than {decimals} decimals"
        )));
    }

    let padded_fractional = format!("{fractional_part:0<width$}", width = decimals as usize);
    let combined = format!(
        "{}{}",
        if integer_part.is_empty() {
            "0"
        } else {
            integer_part
        },
        padded_fractional
    );
    combined
        .parse::<u64>()
        .map_err(|_| LiqsolError::bad_input(format!("amount {trimmed:?} overflows u64 base units")))
}

/// Formats base units back into a UI-amount decimal string, the inverse of
/// [`ui_amount_to_base_units`].
pub fn base_units_to_ui_amount(base_units: u64, decimals: u8) -> String {
    let decimals = decimals as usize;
    if decimals == 0 {
        return base_units.to_string();
    }
    let s = format!("{base_units:0>width$}", width = decimals + 1);
    let split_at = s.len() - decimals;
    let (int_part, frac_part) = s.split_at(split_at);
    let frac_trimmed = frac_part.trim_end_matches('0');
    if frac_trimmed.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac_trimmed}")
    }
}

/// Clamps `v` into `[lo, hi]`.
pub fn clamp_f64(v: f64, lo: f64, hi: f64) -> f64 {
    if v.is_nan() {
        lo
    } else {
        v.max(lo).min(hi)
    }
}
