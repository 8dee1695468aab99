//! Automated market maker for personal stocks.
//!
//! ## Architecture
//!
//! Each stock trades against exactly one two-sided pool:
//!
//! - [`LiquidityPool`]: The `(currency_reserve, stock_reserve, k)` record
//! - [`quote_buy`] / [`quote_sell`]: Pure constant-product pricing
//!
//! Quoting never mutates a pool. A quote is applied by settling the pool at
//! the quoted reserves, which the engine stages alongside the balance,
//! holding and log writes of the same trade.
//!
//! ## Determinism
//!
//! All math is `Decimal` at 8 decimal places with payouts rounded toward
//! zero, so identical trade sequences produce identical reserves.

pub mod pool;
pub mod quote;

pub use pool::LiquidityPool;
pub use quote::{quote_buy, quote_sell, BuyQuote, SellQuote};
