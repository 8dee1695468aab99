//! Holding Ledger: shares and cost basis per (user, stock).
//!
//! Cost basis follows weighted-average accounting: every buy recomputes
//! `average_cost` from the accumulated investment, a sale removes shares at
//! the current average and leaves it unchanged.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::types::{amount, StockId, Timestamp, UserId};

/// A user's position in one stock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub user_id: UserId,
    pub stock_id: StockId,
    pub shares: Decimal,
    /// Currency per share
    pub average_cost: Decimal,
    pub total_invested: Decimal,
    pub updated_at: Timestamp,
}

impl Holding {
    /// No position, used when no record exists
    pub fn empty(user_id: UserId, stock_id: StockId) -> Self {
        Self {
            user_id,
            stock_id,
            shares: Decimal::ZERO,
            average_cost: Decimal::ZERO,
            total_invested: Decimal::ZERO,
            updated_at: 0,
        }
    }

    /// Creator allocation at issuance
    pub fn opening(
        user_id: UserId,
        stock_id: StockId,
        shares: Decimal,
        unit_price: Decimal,
        now: Timestamp,
    ) -> Result<Self> {
        let total_invested = amount::checked_mul(shares, unit_price)
            .map(amount::round)
            .ok_or(LedgerError::Overflow)?;

        Ok(Self {
            user_id,
            stock_id,
            shares,
            average_cost: unit_price,
            total_invested,
            updated_at: now,
        })
    }

    pub fn is_open(&self) -> bool {
        self.shares > Decimal::ZERO
    }

    /// Position after buying `shares` for `cost`
    pub fn bought(&self, shares: Decimal, cost: Decimal, now: Timestamp) -> Result<Self> {
        let new_shares = self.shares.checked_add(shares).ok_or(LedgerError::Overflow)?;
        let total_invested = self
            .total_invested
            .checked_add(cost)
            .ok_or(LedgerError::Overflow)?;
        let average_cost = amount::checked_div(total_invested, new_shares)
            .map(amount::round)
            .ok_or(LedgerError::Overflow)?;

        Ok(Self {
            shares: new_shares,
            average_cost,
            total_invested,
            updated_at: now,
            ..self.clone()
        })
    }

    /// Position after selling `shares`
    ///
    /// # Errors
    ///
    /// `InsufficientShares` if fewer than `shares` are held.
    pub fn sold(&self, shares: Decimal, now: Timestamp) -> Result<Self> {
        if shares > self.shares {
            return Err(LedgerError::InsufficientShares {
                requested: shares,
                held: self.shares,
            });
        }

        let remaining = self.shares - shares;
        let total_invested = if remaining.is_zero() {
            Decimal::ZERO
        } else {
            amount::checked_mul(self.average_cost, remaining)
                .map(amount::round)
                .ok_or(LedgerError::Overflow)?
        };

        Ok(Self {
            shares: remaining,
            total_invested,
            updated_at: now,
            ..self.clone()
        })
    }
}
