//! # Exchange-Rate Arithmetic
//!
//! Share/asset conversions are `value * numerator / denominator` with an
//! explicit rounding direction. The product is taken in `u128`, so any two
//! `u64` operands fit, and the quotient is range-checked back into `u64`.
//! Nothing here wraps.

use thiserror::Error;

/// Errors produced by the checked arithmetic helpers.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum MathError {
    /// A result does not fit in the target integer type.
    #[error("arithmetic overflow")]
    Overflow,

    /// A conversion was attempted against a zero denominator.
    #[error("division by zero")]
    DivisionByZero,
}

/// Rounding direction for [`mul_div`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Rounding {
    /// Round toward zero. Used when the vault pays out or credits.
    Floor,
    /// Round away from zero. Used when the vault charges.
    Ceiling,
}

/// Computes `value * numerator / denominator` with the requested rounding.
pub fn mul_div(
    value: u64,
    numerator: u64,
    denominator: u64,
    rounding: Rounding,
) -> Result<u64, MathError> {
    if denominator == 0 {
        return Err(MathError::DivisionByZero);
    }

    // u64 * u64 always fits in u128.
    let product = (value as u128) * (numerator as u128);
    let denom = denominator as u128;

    let result = match rounding {
        Rounding::Floor => product / denom,
        Rounding::Ceiling => {
            let quotient = product / denom;
            if product % denom == 0 {
                quotient
            } else {
                quotient + 1
            }
        }
    };

    u64::try_from(result).map_err(|_| MathError::Overflow)
}

/// `a + b`, failing instead of wrapping.
pub fn checked_add(a: u64, b: u64) -> Result<u64, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

/// `a - b`, failing instead of wrapping.
pub fn checked_sub(a: u64, b: u64) -> Result<u64, MathError> {
    a.checked_sub(b).ok_or(MathError::Overflow)
}
