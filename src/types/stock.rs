//! Stock record: one personal stock per issuance.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::amount;
use crate::types::{StockId, Symbol, Timestamp, UserId};

/// A personal stock.
///
/// `total_supply` is fixed at issuance. `display_price` tracks the pool's spot
/// price after the most recent settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    pub id: StockId,
    pub symbol: Symbol,
    pub name: String,
    pub owner_id: UserId,
    pub total_supply: Decimal,
    pub display_price: Decimal,
    pub created_at: Timestamp,
}

impl Stock {
    pub fn new(
        id: StockId,
        symbol: Symbol,
        name: impl Into<String>,
        owner_id: UserId,
        total_supply: Decimal,
        unit_price: Decimal,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            symbol,
            name: name.into(),
            owner_id,
            total_supply,
            display_price: unit_price,
            created_at,
        }
    }

    /// Copy of this stock with a new display price
    pub fn repriced(&self, display_price: Decimal) -> Self {
        Self {
            display_price: amount::round(display_price),
            ..self.clone()
        }
    }

    /// `display_price * total_supply`
    pub fn market_cap(&self) -> Decimal {
        amount::checked_mul(self.display_price, self.total_supply)
            .map(amount::round)
            .unwrap_or(Decimal::MAX)
    }
}
