//! Fixed-Point Arithmetic
//!
//! Scaled-integer primitives shared by curve pricing and pool accounting.
//! Every product that can exceed 128 bits is widened to 256 bits before the
//! division brings it back down, so `a * b / d` is exact whenever the final
//! quotient fits in a `u128`.

use thiserror::Error;

#[allow(clippy::all)]
mod wide {
    uint::construct_uint! {
        /// 256-bit unsigned integer used for intermediate products.
        pub struct U256(4);
    }
}

pub use wide::U256;

/// One whole unit of the base currency (18 decimals).
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Basis-point denominator (100% = 10_000 bps).
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Arithmetic failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("arithmetic overflow")]
    Overflow,
    #[error("division by zero")]
    DivisionByZero,
}

fn narrow(value: U256) -> Result<u128, MathError> {
    if value > U256::from(u128::MAX) {
        return Err(MathError::Overflow);
    }
    Ok(value.low_u128())
}

/// `floor(a * b / denominator)` with a 256-bit intermediate.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Result<u128, MathError> {
    if denominator == 0 {
        return Err(MathError::DivisionByZero);
    }
    let product = U256::from(a) * U256::from(b);
    narrow(product / U256::from(denominator))
}

/// `ceil(a * b / denominator)` with a 256-bit intermediate.
pub fn mul_div_up(a: u128, b: u128, denominator: u128) -> Result<u128, MathError> {
    if denominator == 0 {
        return Err(MathError::DivisionByZero);
    }
    let product = U256::from(a) * U256::from(b);
    let d = U256::from(denominator);
    let mut quotient = product / d;
    if !(product % d).is_zero() {
        quotient = quotient + U256::from(1u8);
    }
    narrow(quotient)
}

/// Checked `a * b` that reports overflow as a [`MathError`].
pub fn mul(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_mul(b).ok_or(MathError::Overflow)
}

/// Checked `a + b`.
pub fn add(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

/// Portion of `amount` expressed in basis points, rounded down.
pub fn bps_of(amount: u128, bps: u16) -> Result<u128, MathError> {
    mul_div(amount, bps as u128, BPS_DENOMINATOR)
}

/// Floor square root of a 256-bit value (Newton's method).
pub fn sqrt_u256(n: U256) -> U256 {
    if n.is_zero() {
        return U256::zero();
    }
    if n < U256::from(4u8) {
        return U256::one();
    }

    // Start above the root: 2^(ceil(bits/2))
    let mut x = U256::one() << ((n.bits() + 1) / 2);
    loop {
        let next = (x + n / x) >> 1usize;
        if next >= x {
            return x;
        }
        x = next;
    }
}

/// Geometric mean `floor(sqrt(a * b))`, used for the first liquidity mint.
pub fn sqrt_product(a: u128, b: u128) -> u128 {
    // sqrt of a 256-bit product always fits in 128 bits
    sqrt_u256(U256::from(a) * U256::from(b)).low_u128()
}
