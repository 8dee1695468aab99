//! Constant-product pricing.
//!
//! ## Buy (currency in, shares out)
//!
//! ```text
//! new_c     = c + currency_in
//! stock_out = round_down(s - k / new_c)
//! new_s     = s - stock_out
//! price     = currency_in / stock_out
//! ```
//!
//! ## Sell (shares in, currency out)
//!
//! ```text
//! new_s        = s + stock_in
//! currency_out = round_down(c - k / new_s)
//! new_c        = c - currency_out
//! price        = currency_out / stock_in
//! ```
//!
//! Price impact is always measured against the pre-trade spot price
//! `c / s`: positive for buys, negative for sells, and growing in magnitude
//! with trade size.
//!
//! ## Example
//!
//! ```
//! use rust_decimal::Decimal;
//! use yolo_ledger::amm::{quote_buy, LiquidityPool};
//! use yolo_ledger::types::StockId;
//!
//! let pool = LiquidityPool::seed(StockId::generate(), Decimal::from(2), Decimal::from(650), 0).unwrap();
//! let quote = quote_buy(&pool, Decimal::from(100)).unwrap();
//!
//! assert_eq!(quote.new_currency_reserve, Decimal::from(1400));
//! assert_eq!(quote.stock_out, Decimal::new(4642857142, 8)); // 46.42857142
//! assert!(quote.price_per_share > Decimal::from(2));
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::amm::LiquidityPool;
use crate::error::{LedgerError, Result};
use crate::types::{amount, Timestamp};

/// Result of pricing a buy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyQuote {
    pub currency_in: Decimal,
    pub stock_out: Decimal,
    pub price_per_share: Decimal,
    pub price_impact_pct: Decimal,
    pub spot_price_before: Decimal,
    pub new_currency_reserve: Decimal,
    pub new_stock_reserve: Decimal,
}

impl BuyQuote {
    /// Pool after this buy settles
    pub fn apply(&self, pool: &LiquidityPool, now: Timestamp) -> Result<LiquidityPool> {
        pool.resettled(self.new_currency_reserve, self.new_stock_reserve, now)
    }
}

/// Result of pricing a sell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellQuote {
    pub stock_in: Decimal,
    pub currency_out: Decimal,
    pub price_per_share: Decimal,
    pub price_impact_pct: Decimal,
    pub spot_price_before: Decimal,
    pub new_currency_reserve: Decimal,
    pub new_stock_reserve: Decimal,
}

impl SellQuote {
    /// Pool after this sell settles
    pub fn apply(&self, pool: &LiquidityPool, now: Timestamp) -> Result<LiquidityPool> {
        pool.resettled(self.new_currency_reserve, self.new_stock_reserve, now)
    }
}

/// Price spending `currency_in` against the pool
///
/// # Errors
///
/// - `InvalidParameters` if `currency_in <= 0`
/// - `TradeTooSmall` if the trade rounds to zero shares out
/// - `PoolExhausted` if the pool is empty or the trade would drain it
pub fn quote_buy(pool: &LiquidityPool, currency_in: Decimal) -> Result<BuyQuote> {
    let currency_in = normalize_input(currency_in, "currency_in")?;
    let (c, s) = reserves(pool)?;
    let spot = exact_div(c, s)?;

    let new_c = c.checked_add(currency_in).ok_or(LedgerError::Overflow)?;
    let new_s_exact = exact_div(pool.k_constant, new_c)?;
    let stock_out = amount::round_down(s - new_s_exact);

    if stock_out <= Decimal::ZERO {
        return Err(LedgerError::TradeTooSmall);
    }

    let new_s = s - stock_out;
    if new_s <= Decimal::ZERO {
        return Err(LedgerError::PoolExhausted);
    }

    let price = exact_div(currency_in, stock_out)?;

    Ok(BuyQuote {
        currency_in,
        stock_out,
        price_per_share: amount::round(price),
        price_impact_pct: impact_pct(price, spot)?,
        spot_price_before: amount::round(spot),
        new_currency_reserve: new_c,
        new_stock_reserve: new_s,
    })
}

/// Price selling `stock_in` shares into the pool
///
/// # Errors
///
/// - `InvalidParameters` if `stock_in <= 0`
/// - `TradeTooSmall` if the trade rounds to zero currency out
/// - `PoolExhausted` if the pool is empty or the trade would drain it
pub fn quote_sell(pool: &LiquidityPool, stock_in: Decimal) -> Result<SellQuote> {
    let stock_in = normalize_input(stock_in, "stock_in")?;
    let (c, s) = reserves(pool)?;
    let spot = exact_div(c, s)?;

    let new_s = s.checked_add(stock_in).ok_or(LedgerError::Overflow)?;
    let new_c_exact = exact_div(pool.k_constant, new_s)?;
    let currency_out = amount::round_down(c - new_c_exact);

    if currency_out <= Decimal::ZERO {
        return Err(LedgerError::TradeTooSmall);
    }

    let new_c = c - currency_out;
    if new_c <= Decimal::ZERO {
        return Err(LedgerError::PoolExhausted);
    }

    let price = exact_div(currency_out, stock_in)?;

    Ok(SellQuote {
        stock_in,
        currency_out,
        price_per_share: amount::round(price),
        price_impact_pct: impact_pct(price, spot)?,
        spot_price_before: amount::round(spot),
        new_currency_reserve: new_c,
        new_stock_reserve: new_s,
    })
}

/// Input amounts are truncated to 8 decimal places; non-positive input is
/// malformed, positive input that truncates to zero is too small.
fn normalize_input(value: Decimal, field: &str) -> Result<Decimal> {
    if value <= Decimal::ZERO {
        return Err(LedgerError::InvalidParameters(format!(
            "{} must be positive, got {}",
            field, value
        )));
    }

    let value = amount::round_down(value);
    if value.is_zero() {
        return Err(LedgerError::TradeTooSmall);
    }
    Ok(value)
}

fn reserves(pool: &LiquidityPool) -> Result<(Decimal, Decimal)> {
    if !pool.is_tradable() || pool.k_constant <= Decimal::ZERO {
        return Err(LedgerError::PoolExhausted);
    }
    Ok((pool.currency_reserve, pool.stock_reserve))
}

fn exact_div(a: Decimal, b: Decimal) -> Result<Decimal> {
    amount::checked_div(a, b).ok_or(LedgerError::Overflow)
}

/// `(price - spot) / spot * 100`, rounded
fn impact_pct(price: Decimal, spot: Decimal) -> Result<Decimal> {
    let ratio = exact_div(price - spot, spot)?;
    ratio
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(amount::round)
        .ok_or(LedgerError::Overflow)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StockId;
    use rust_decimal_macros::dec;

    fn pool() -> LiquidityPool {
        LiquidityPool::seed(StockId::generate(), dec!(2), dec!(650), 0).unwrap()
    }

    #[test]
    fn test_buy_reference_scenario() {
        let quote = quote_buy(&pool(), dec!(100)).unwrap();

        assert_eq!(quote.spot_price_before, dec!(2));
        assert_eq!(quote.new_currency_reserve, dec!(1400));
        assert_eq!(quote.stock_out, dec!(46.42857142));
        assert_eq!(quote.new_stock_reserve, dec!(603.57142858));
        assert_eq!(quote.price_per_share, dec!(2.15384615));
        assert!(quote.price_impact_pct > dec!(7.69));
        assert!(quote.price_impact_pct < dec!(7.70));
    }

    #[test]
    fn test_buy_moves_spot_up() {
        let before = pool();
        let quote = quote_buy(&before, dec!(100)).unwrap();
        let after = quote.apply(&before, 1).unwrap();
        assert!(after.spot_price().unwrap() > before.spot_price().unwrap());
        assert!(after.holds_invariant(before.k_constant));
    }

    #[test]
    fn test_sell_moves_spot_down() {
        let before = pool();
        let quote = quote_sell(&before, dec!(50)).unwrap();
        let after = quote.apply(&before, 1).unwrap();
        assert!(after.spot_price().unwrap() < before.spot_price().unwrap());
        assert!(quote.price_impact_pct < Decimal::ZERO);
        assert!(quote.price_per_share < quote.spot_price_before);
        assert!(after.holds_invariant(before.k_constant));
    }

    #[test]
    fn test_sell_reference_scenario() {
        // 50 shares into (1300, 650): new_s = 700, new_c = 845000 / 700
        let quote = quote_sell(&pool(), dec!(50)).unwrap();
        assert_eq!(quote.new_stock_reserve, dec!(700));
        assert_eq!(quote.currency_out, dec!(92.85714285));
        assert_eq!(quote.new_currency_reserve, dec!(1207.14285715));
    }

    #[test]
    fn test_buy_impact_monotonic() {
        let pool = pool();
        let sizes = [dec!(1), dec!(10), dec!(100), dec!(1000), dec!(10000)];

        let impacts: Vec<Decimal> = sizes
            .iter()
            .map(|size| quote_buy(&pool, *size).unwrap().price_impact_pct)
            .collect();

        for pair in impacts.windows(2) {
            assert!(pair[0] < pair[1], "impact not increasing: {:?}", impacts);
        }
    }

    #[test]
    fn test_sell_impact_monotonic() {
        let pool = pool();
        let sizes = [dec!(1), dec!(10), dec!(100), dec!(1000), dec!(10000)];

        let impacts: Vec<Decimal> = sizes
            .iter()
            .map(|size| quote_sell(&pool, *size).unwrap().price_impact_pct.abs())
            .collect();

        for pair in impacts.windows(2) {
            assert!(pair[0] < pair[1], "impact not increasing: {:?}", impacts);
        }
    }

    #[test]
    fn test_round_trip_loses_value() {
        let before = pool();
        let buy = quote_buy(&before, dec!(100)).unwrap();
        let mid = buy.apply(&before, 1).unwrap();
        let sell = quote_sell(&mid, buy.stock_out).unwrap();

        assert!(sell.currency_out < dec!(100));
        assert!(sell.currency_out > dec!(99.9999));
    }

    #[test]
    fn test_rejects_non_positive_input() {
        assert!(matches!(
            quote_buy(&pool(), Decimal::ZERO),
            Err(LedgerError::InvalidParameters(_))
        ));
        assert!(matches!(
            quote_sell(&pool(), dec!(-5)),
            Err(LedgerError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_dust_trade_too_small() {
        // Below one unit after truncation
        assert!(matches!(
            quote_buy(&pool(), dec!(0.000000001)),
            Err(LedgerError::TradeTooSmall)
        ));
        // One unit of currency buys less than one unit of shares
        assert!(matches!(
            quote_buy(&pool(), dec!(0.00000001)),
            Err(LedgerError::TradeTooSmall)
        ));
    }

    #[test]
    fn test_empty_pool_exhausted() {
        let mut empty = pool();
        empty.stock_reserve = Decimal::ZERO;
        assert!(matches!(
            quote_buy(&empty, dec!(1)),
            Err(LedgerError::PoolExhausted)
        ));
    }

    #[test]
    fn test_huge_buy_cannot_drain_pool() {
        // The curve approaches zero without reaching it
        let quote = quote_buy(&pool(), dec!(1000000000)).unwrap();
        assert!(quote.new_stock_reserve > Decimal::ZERO);
        assert!(quote.stock_out < dec!(650));
    }
}
