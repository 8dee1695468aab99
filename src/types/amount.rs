//! Fixed-point amount utilities.
//!
//! ## Overview
//!
//! Every currency amount, share quantity and price in the ledger is a
//! [`Decimal`] held at 8 decimal places. Floating point never touches a
//! balance or a reserve.
//!
//! ## Rounding Policy
//!
//! - [`round`]: midpoint-to-even, used for prices, `k` and cost basis.
//! - [`round_down`]: toward zero, used for every payout computed from the curve
//!   (shares out of a buy, currency out of a sell). The pool keeps the dust.
//!
//! ## Fixed-Point Encoding
//!
//! Log entries are hashed from a `u64` encoding scaled by 10^8, the same
//! representation as a satoshi-style integer amount.
//!
//! ```
//! use rust_decimal::Decimal;
//! use yolo_ledger::types::amount::{from_fixed, to_fixed};
//!
//! let price = Decimal::new(215384615, 8); // 2.15384615
//! assert_eq!(to_fixed(price), Some(215_384_615));
//! assert_eq!(from_fixed(215_384_615), price);
//! ```

use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept for every stored amount
pub const MONEY_DP: u32 = 8;

/// Scaling factor for the `u64` encoding: 10^8
pub const SCALE: u64 = 100_000_000;

/// Smallest representable amount (0.00000001)
pub fn unit() -> Decimal {
    Decimal::new(1, MONEY_DP)
}

/// Round to 8 decimal places, midpoint to even
#[inline]
pub fn round(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointNearestEven)
}

/// Round to 8 decimal places toward zero
#[inline]
pub fn round_down(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(MONEY_DP, RoundingStrategy::ToZero)
}

/// Convert a Decimal to the 10^8-scaled `u64` encoding
///
/// # Returns
///
/// * `Some(u64)` - The fixed-point representation
/// * `None` - If the value is negative or out of range
pub fn to_fixed(d: Decimal) -> Option<u64> {
    if d.is_sign_negative() {
        return None;
    }

    let scaled = d.checked_mul(Decimal::from(SCALE))?;
    scaled.round_dp(0).to_u64()
}

/// Convert a 10^8-scaled `u64` back to a Decimal
pub fn from_fixed(value: u64) -> Decimal {
    Decimal::from(value) / Decimal::from(SCALE)
}

// ============================================================================
// Checked Arithmetic
// ============================================================================

/// `a * b`, unrounded; `None` on overflow
#[inline]
pub fn checked_mul(a: Decimal, b: Decimal) -> Option<Decimal> {
    a.checked_mul(b)
}

/// `a / b`, unrounded; `None` if `b` is zero or on overflow
#[inline]
pub fn checked_div(a: Decimal, b: Decimal) -> Option<Decimal> {
    if b.is_zero() {
        return None;
    }
    a.checked_div(b)
}

/// Compare two amounts with a tolerance
pub fn approx_eq(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    (a - b).abs() <= tolerance
}

// ============================================================================
// Unit Tests
// ============================================================================
