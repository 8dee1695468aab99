//! Balance Ledger: each user's spendable currency.
//!
//! A missing balance record reads as zero. Debits never take a balance
//! below zero.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::types::{amount, Timestamp, UserId};

/// Spendable currency for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: UserId,
    pub amount: Decimal,
    pub updated_at: Timestamp,
}

impl Balance {
    /// Zero balance, used when no record exists
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            amount: Decimal::ZERO,
            updated_at: 0,
        }
    }

    /// Opening grant for a new account
    pub fn opening(user_id: UserId, amount: Decimal, now: Timestamp) -> Self {
        Self {
            user_id,
            amount: amount::round_down(amount),
            updated_at: now,
        }
    }

    pub fn covers(&self, required: Decimal) -> bool {
        self.amount >= required
    }

    /// Balance after removing `value`
    ///
    /// # Errors
    ///
    /// `InsufficientFunds` if the balance is below `value`.
    pub fn debited(&self, value: Decimal, now: Timestamp) -> Result<Self> {
        if !self.covers(value) {
            return Err(LedgerError::InsufficientFunds {
                required: value,
                available: self.amount,
            });
        }

        Ok(Self {
            user_id: self.user_id.clone(),
            amount: self.amount - value,
            updated_at: now,
        })
    }

    /// Balance after adding `value`
    pub fn credited(&self, value: Decimal, now: Timestamp) -> Result<Self> {
        let amount = self.amount.checked_add(value).ok_or(LedgerError::Overflow)?;

        Ok(Self {
            user_id: self.user_id.clone(),
            amount,
            updated_at: now,
        })
    }
}
