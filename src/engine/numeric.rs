//! Checked numeric primitives for the path engine.
//!
//! Thin wrappers over `rust_decimal` that convert arithmetic failure modes
//! (overflow, division by zero, range violations) into the engine's
//! suppressible error kinds. All rounding is half-up, away from zero.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use super::runtime::{Error, ErrorCode};
use crate::ast::ArithOp;

fn overflow(op: ArithOp) -> Error {
    Error::new(
        ErrorCode::NumericOutOfRange,
        format!("numeric {} overflows the number type", op.name()),
    )
}

/// Apply a binary arithmetic operator.
pub(crate) fn binary_arith(op: ArithOp, lhs: Decimal, rhs: Decimal) -> Result<Decimal, Error> {
    match op {
        ArithOp::Add => lhs.checked_add(rhs).ok_or_else(|| overflow(op)),
        ArithOp::Sub => lhs.checked_sub(rhs).ok_or_else(|| overflow(op)),
        ArithOp::Mul => lhs.checked_mul(rhs).ok_or_else(|| overflow(op)),
        ArithOp::Div => {
            if rhs.is_zero() {
                return Err(Error::new(ErrorCode::DivisionByZero, "division by zero"));
            }
            lhs.checked_div(rhs).ok_or_else(|| overflow(op))
        }
        ArithOp::Mod => {
            if rhs.is_zero() {
                return Err(Error::new(ErrorCode::DivisionByZero, "division by zero"));
            }
            lhs.checked_rem(rhs).ok_or_else(|| overflow(op))
        }
    }
}

fn round_integral(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Numeric to i32 with rounding, as performed by the `.integer()` cast.
pub(crate) fn to_i32_rounded(value: Decimal) -> Option<i32> {
    round_integral(value).to_i32()
}

/// Numeric to i64 with rounding, as performed by the `.bigint()` cast.
pub(crate) fn to_i64_rounded(value: Decimal) -> Option<i64> {
    round_integral(value).to_i64()
}

/// Numeric to i32 with truncation, as performed by array subscripts.
pub(crate) fn to_i32_truncated(value: Decimal) -> Option<i32> {
    value.trunc().to_i32()
}

/// Lexical integer conversion used by the string branches of `.integer()`
/// and `.bigint()`; accepts an optional sign, digits only.
pub(crate) fn parse_i64(text: &str) -> Option<i64> {
    text.trim().parse::<i64>().ok()
}

pub(crate) fn parse_i32(text: &str) -> Option<i32> {
    text.trim().parse::<i32>().ok()
}

/// Lexical numeric conversion for `.number()`/`.decimal()`; plain and
/// scientific notation are both accepted, NaN and infinities are not
/// representable and therefore rejected by construction.
pub(crate) fn parse_decimal(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    trimmed
        .parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

/// Lexical double conversion; NaN and infinities parse but are rejected by
/// the caller per the `.double()` contract.
pub(crate) fn parse_f64(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

pub(crate) fn decimal_to_f64(value: Decimal) -> Option<f64> {
    value.to_f64().filter(|f| f.is_finite())
}

pub(crate) fn f64_to_decimal(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value)
}

fn pow10(exp: u32) -> Option<Decimal> {
    if exp > 28 {
        return None;
    }
    Some(Decimal::from_i128_with_scale(10i128.pow(exp), 0))
}

/// Re-apply a `(precision, scale)` typmod to a numeric value: round to the
/// requested scale and verify the integral part fits the remaining digits.
pub(crate) fn apply_typmod(value: Decimal, precision: i32, scale: i32) -> Result<Decimal, Error> {
    if !(1..=1000).contains(&precision) {
        return Err(Error::new(
            ErrorCode::NumericOutOfRange,
            format!("numeric precision {precision} must be between 1 and 1000"),
        ));
    }
    if !(-1000..=1000).contains(&scale) {
        return Err(Error::new(
            ErrorCode::NumericOutOfRange,
            format!("numeric scale {scale} must be between -1000 and 1000"),
        ));
    }

    let rounded = if scale >= 0 {
        // Decimal scale tops out at 28 fractional digits; anything beyond
        // that is already exact.
        let dp = (scale as u32).min(28);
        value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
    } else {
        match pow10((-scale) as u32) {
            Some(factor) => {
                let scaled = value
                    .checked_div(factor)
                    .ok_or_else(|| overflow(ArithOp::Div))?;
                scaled
                    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                    .checked_mul(factor)
                    .ok_or_else(|| overflow(ArithOp::Mul))?
            }
            // A step this coarse rounds every representable value to zero.
            None => Decimal::ZERO,
        }
    };

    // The value must round to an absolute value below 10^(precision-scale).
    let int_digits = precision - scale;
    if int_digits < 0 {
        if !rounded.is_zero() {
            return Err(numeric_field_overflow(precision, scale));
        }
    } else if let Some(limit) = pow10(int_digits as u32) {
        if rounded.abs() >= limit {
            return Err(numeric_field_overflow(precision, scale));
        }
    }
    // int_digits > 28 exceeds every representable value; nothing to check.

    Ok(rounded)
}

fn numeric_field_overflow(precision: i32, scale: i32) -> Error {
    Error::new(
        ErrorCode::NumericOutOfRange,
        format!(
            "numeric field overflow: a field with precision {precision}, scale {scale} \
             must round to an absolute value less than 10^{}",
            precision - scale
        ),
    )
}

/// Parse a boolean from its accepted lexical spellings: `true`, `false`,
/// `yes`, `no`, `on`, `off`, `1`, `0`, with unique-prefix matching for the
/// word forms.
pub(crate) fn parse_bool(text: &str) -> Option<bool> {
    let t = text.trim().to_ascii_lowercase();
    if t.is_empty() {
        return None;
    }
    match t.as_str() {
        "1" => return Some(true),
        "0" => return Some(false),
        "on" => return Some(true),
        _ => {}
    }
    if "true".starts_with(&t) {
        return Some(true);
    }
    if "false".starts_with(&t) {
        return Some(false);
    }
    if "yes".starts_with(&t) {
        return Some(true);
    }
    if t.len() >= 2 && "off".starts_with(&t) {
        return Some(false);
    }
    if "no".starts_with(&t) {
        return Some(false);
    }
    None
}
