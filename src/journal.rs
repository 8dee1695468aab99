//! Transaction Log: append-only, hash-chained trade history.
//!
//! Every committed entry carries `hash = SHA-256(prev_hash || ssz(record))`
//! where `record` is the fixed-size [`TransactionRecord`]. The first entry
//! chains from [`GENESIS_HASH`]. Rewriting any historical entry changes
//! every hash after it, which [`verify_chain`] detects.

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result, StoreError, StoreResult};
use crate::types::{
    PendingTransaction, StockId, Timestamp, TradeKind, Transaction, TransactionRecord, UserId,
};

/// Predecessor hash of the first log entry
pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// Assign `seq` and chain a staged entry onto `prev_hash`
///
/// Returns `None` if an amount does not fit the fixed-point encoding.
pub fn seal(pending: &PendingTransaction, seq: u64, prev_hash: [u8; 32]) -> Option<Transaction> {
    let hash = pending.record(seq, prev_hash)?.chain_hash()?;

    Some(Transaction {
        seq,
        user_id: pending.user_id.clone(),
        stock_id: pending.stock_id,
        kind: pending.kind,
        shares: pending.shares,
        price_per_share: pending.price_per_share,
        total_amount: pending.total_amount,
        spot_price: pending.spot_price,
        timestamp: pending.timestamp,
        prev_hash,
        hash,
    })
}

/// Reject entries the store could not seal, before anything is staged
pub fn ensure_encodable(pending: &PendingTransaction) -> Result<()> {
    pending
        .record(0, GENESIS_HASH)
        .map(|_| ())
        .ok_or(LedgerError::Overflow)
}

/// Recompute the chain over a full log in sequence order
///
/// # Errors
///
/// `StoreError::Corrupt` naming the first entry whose sequence, link or hash
/// does not match.
pub fn verify_chain(entries: &[Transaction]) -> StoreResult<()> {
    let mut prev = GENESIS_HASH;

    for (i, entry) in entries.iter().enumerate() {
        let expected_seq = i as u64 + 1;
        if entry.seq != expected_seq {
            return Err(StoreError::Corrupt(format!(
                "log entry {} found at position {}",
                entry.seq, expected_seq
            )));
        }
        if entry.prev_hash != prev {
            return Err(StoreError::Corrupt(format!(
                "log entry {} does not link to its predecessor",
                entry.seq
            )));
        }

        let resealed = seal(&entry.pending(), entry.seq, prev).ok_or_else(|| {
            StoreError::Corrupt(format!("log entry {} is not encodable", entry.seq))
        })?;
        if resealed.hash != entry.hash {
            return Err(StoreError::Corrupt(format!(
                "log entry {} hash mismatch",
                entry.seq
            )));
        }

        prev = entry.hash;
    }

    Ok(())
}

// ============================================================================
// Queries
// ============================================================================

/// Selection over the log; results come back newest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFilter {
    pub user_id: Option<UserId>,
    pub stock_id: Option<StockId>,
    pub kind: Option<TradeKind>,
    /// Inclusive lower bound on `timestamp`
    pub since: Option<Timestamp>,
    /// Inclusive upper bound on `timestamp`
    pub until: Option<Timestamp>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl TransactionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn for_stock(stock_id: StockId) -> Self {
        Self {
            stock_id: Some(stock_id),
            ..Self::default()
        }
    }

    pub fn kind(mut self, kind: TradeKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: Timestamp) -> Self {
        self.until = Some(until);
        self
    }

    /// Page `page` (0-based) of `per_page` entries
    pub fn page(mut self, page: usize, per_page: usize) -> Self {
        self.offset = page.saturating_mul(per_page);
        self.limit = Some(per_page);
        self
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        self.user_id.as_ref().map_or(true, |u| &tx.user_id == u)
            && self.stock_id.map_or(true, |s| tx.stock_id == s)
            && self.kind.map_or(true, |k| tx.kind == k)
            && self.since.map_or(true, |t| tx.timestamp >= t)
            && self.until.map_or(true, |t| tx.timestamp <= t)
    }

    /// Filter and paginate a log given oldest first
    pub fn select<'a, I>(&self, log: I) -> Vec<Transaction>
    where
        I: DoubleEndedIterator<Item = &'a Transaction>,
    {
        let matching = log.rev().filter(|tx| self.matches(tx)).skip(self.offset);
        match self.limit {
            Some(limit) => matching.take(limit).cloned().collect(),
            None => matching.cloned().collect(),
        }
    }
}
