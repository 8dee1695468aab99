//! Transaction log entries.
//!
//! Entries are hashed from a fixed-size [`TransactionRecord`] so every node
//! that replays the log derives the same chain. Amounts go through the
//! 10^8-scaled `u64` encoding from [`crate::types::amount`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::amount;
use crate::types::record::TransactionRecord;
use crate::types::{StockId, Timestamp, UserId};

// ============================================================================
// TradeKind enum
// ============================================================================

/// What produced a transaction
///
/// Represented as u8 in the SSZ record:
/// - Issue = 0
/// - Buy = 1
/// - Sell = 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeKind {
    /// Creator allocation at issuance
    Issue,
    /// Currency in, shares out of the pool
    Buy,
    /// Shares in, currency out of the pool
    Sell,
}

impl TradeKind {
    pub fn to_u8(self) -> u8 {
        match self {
            TradeKind::Issue => 0,
            TradeKind::Buy => 1,
            TradeKind::Sell => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TradeKind::Issue),
            1 => Some(TradeKind::Buy),
            2 => Some(TradeKind::Sell),
            _ => None,
        }
    }

    /// Buys and sells count toward traded volume; issuance does not
    pub fn is_trade(self) -> bool {
        !matches!(self, TradeKind::Issue)
    }
}

impl std::fmt::Display for TradeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeKind::Issue => write!(f, "ISSUE"),
            TradeKind::Buy => write!(f, "BUY"),
            TradeKind::Sell => write!(f, "SELL"),
        }
    }
}

// ============================================================================
// PendingTransaction
// ============================================================================

/// A transaction staged in a write batch, before the store assigns its
/// sequence number and chain hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub user_id: UserId,
    pub stock_id: StockId,
    pub kind: TradeKind,
    pub shares: Decimal,
    pub price_per_share: Decimal,
    pub total_amount: Decimal,
    /// Pool spot price once this entry settled
    pub spot_price: Decimal,
    pub timestamp: Timestamp,
}

impl PendingTransaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: UserId,
        stock_id: StockId,
        kind: TradeKind,
        shares: Decimal,
        price_per_share: Decimal,
        total_amount: Decimal,
        spot_price: Decimal,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            user_id,
            stock_id,
            kind,
            shares,
            price_per_share,
            total_amount,
            spot_price,
            timestamp,
        }
    }

    /// Fixed-size record for hashing
    ///
    /// Returns `None` if an amount does not fit the `u64` encoding.
    pub fn record(&self, seq: u64, prev_hash: [u8; 32]) -> Option<TransactionRecord> {
        Some(TransactionRecord {
            seq,
            kind: self.kind.to_u8(),
            user: self.user_id.digest(),
            stock: self.stock_id.digest(),
            shares: amount::to_fixed(self.shares)?,
            price_per_share: amount::to_fixed(self.price_per_share)?,
            total_amount: amount::to_fixed(self.total_amount)?,
            spot_price: amount::to_fixed(self.spot_price)?,
            timestamp: self.timestamp,
            prev_hash,
        })
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// A committed, immutable log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Position in the log, starting at 1
    pub seq: u64,
    pub user_id: UserId,
    pub stock_id: StockId,
    pub kind: TradeKind,
    pub shares: Decimal,
    pub price_per_share: Decimal,
    pub total_amount: Decimal,
    /// Pool spot price once this entry settled; the unit price for issuance
    pub spot_price: Decimal,
    pub timestamp: Timestamp,
    /// Hash of the previous entry (zeros for the first)
    pub prev_hash: [u8; 32],
    /// SHA-256 over `prev_hash` and the SSZ record
    pub hash: [u8; 32],
}

impl Transaction {
    /// Staged form of this entry, without sequence or hashes
    pub fn pending(&self) -> PendingTransaction {
        PendingTransaction::new(
            self.user_id.clone(),
            self.stock_id,
            self.kind,
            self.shares,
            self.price_per_share,
            self.total_amount,
            self.spot_price,
            self.timestamp,
        )
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pending() -> PendingTransaction {
        PendingTransaction::new(
            UserId::new("bob"),
            StockId::generate(),
            TradeKind::Buy,
            dec!(46.42857142),
            dec!(2.15384615),
            dec!(100),
            dec!(2.31952663),
            1_700_000_000_000,
        )
    }

    #[test]
    fn test_kind_conversion() {
        assert_eq!(TradeKind::Issue.to_u8(), 0);
        assert_eq!(TradeKind::Buy.to_u8(), 1);
        assert_eq!(TradeKind::Sell.to_u8(), 2);
        assert_eq!(TradeKind::from_u8(2), Some(TradeKind::Sell));
        assert_eq!(TradeKind::from_u8(3), None);
    }

    #[test]
    fn test_kind_is_trade() {
        assert!(!TradeKind::Issue.is_trade());
        assert!(TradeKind::Buy.is_trade());
        assert!(TradeKind::Sell.is_trade());
    }

    #[test]
    fn test_record_scales_amounts() {
        let record = pending().record(7, [0u8; 32]).expect("encodable");
        assert_eq!(record.seq, 7);
        assert_eq!(record.kind, 1);
        assert_eq!(record.shares, 4_642_857_142);
        assert_eq!(record.price_per_share, 215_384_615);
        assert_eq!(record.total_amount, 10_000_000_000);
        assert_eq!(record.spot_price, 231_952_663);
    }

    #[test]
    fn test_record_rejects_unencodable_amount() {
        let mut tx = pending();
        tx.total_amount = dec!(500000000000);
        assert!(tx.record(1, [0u8; 32]).is_none());
    }
}
