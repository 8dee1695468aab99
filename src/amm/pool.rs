//! Liquidity pool: the per-stock reserve pair.
//!
//! ## Invariant
//!
//! `currency_reserve * stock_reserve = k_constant` at the last settlement.
//! Each trade moves the reserves along the curve through the previous `k`,
//! then settles `k` to the new product. Because payouts round down, the new
//! product never falls below the old `k` by more than one rounding unit per
//! reserve (see [`LiquidityPool::settlement_tolerance`]).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::types::{amount, StockId, Timestamp};

/// Constant-product reserve pair for one stock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPool {
    pub stock_id: StockId,
    pub currency_reserve: Decimal,
    pub stock_reserve: Decimal,
    pub k_constant: Decimal,
    pub updated_at: Timestamp,
}

impl LiquidityPool {
    /// Seed a pool at issuance
    ///
    /// `stock_reserve = pool_shares`, `currency_reserve = unit_price * pool_shares`.
    ///
    /// # Example
    ///
    /// ```
    /// use rust_decimal::Decimal;
    /// use yolo_ledger::amm::LiquidityPool;
    /// use yolo_ledger::types::StockId;
    ///
    /// let pool = LiquidityPool::seed(StockId::generate(), Decimal::from(2), Decimal::from(650), 0).unwrap();
    /// assert_eq!(pool.currency_reserve, Decimal::from(1300));
    /// assert_eq!(pool.k_constant, Decimal::from(845000));
    /// ```
    pub fn seed(
        stock_id: StockId,
        unit_price: Decimal,
        pool_shares: Decimal,
        now: Timestamp,
    ) -> Result<Self> {
        if unit_price <= Decimal::ZERO || pool_shares <= Decimal::ZERO {
            return Err(LedgerError::InvalidParameters(format!(
                "pool needs positive price and shares, got {} x {}",
                unit_price, pool_shares
            )));
        }

        let currency_reserve = amount::checked_mul(unit_price, pool_shares)
            .map(amount::round)
            .ok_or(LedgerError::Overflow)?;

        Self::settled(stock_id, currency_reserve, pool_shares, now)
    }

    /// Pool at the given reserves with `k` settled to their product
    fn settled(
        stock_id: StockId,
        currency_reserve: Decimal,
        stock_reserve: Decimal,
        now: Timestamp,
    ) -> Result<Self> {
        if currency_reserve <= Decimal::ZERO || stock_reserve <= Decimal::ZERO {
            return Err(LedgerError::PoolExhausted);
        }

        let k_constant = amount::checked_mul(currency_reserve, stock_reserve)
            .map(amount::round)
            .ok_or(LedgerError::Overflow)?;

        Ok(Self {
            stock_id,
            currency_reserve,
            stock_reserve,
            k_constant,
            updated_at: now,
        })
    }

    /// Copy of this pool moved to new reserves
    pub fn resettled(
        &self,
        currency_reserve: Decimal,
        stock_reserve: Decimal,
        now: Timestamp,
    ) -> Result<Self> {
        Self::settled(self.stock_id, currency_reserve, stock_reserve, now)
    }

    /// Both reserves positive
    pub fn is_tradable(&self) -> bool {
        self.currency_reserve > Decimal::ZERO && self.stock_reserve > Decimal::ZERO
    }

    /// Currency per share implied by the reserve ratio, rounded
    pub fn spot_price(&self) -> Option<Decimal> {
        amount::checked_div(self.currency_reserve, self.stock_reserve).map(amount::round)
    }

    /// `currency_reserve * stock_reserve`, unrounded
    pub fn product(&self) -> Option<Decimal> {
        amount::checked_mul(self.currency_reserve, self.stock_reserve)
    }

    /// Allowed gap between the current product and the `k` it traded through
    pub fn settlement_tolerance(&self) -> Decimal {
        (self.currency_reserve + self.stock_reserve + Decimal::ONE) * amount::unit()
    }

    /// Whether the current reserves sit on the curve through `k_before`
    pub fn holds_invariant(&self, k_before: Decimal) -> bool {
        match self.product() {
            Some(product) => amount::approx_eq(product, k_before, self.settlement_tolerance()),
            None => false,
        }
    }
}
