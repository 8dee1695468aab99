//! Fixed-size SSZ record for transaction log hashing.
//!
//! ## SSZ Serialization
//!
//! SSZ encoding rules (ethereum.org):
//! - Basic types (u8, u64): Direct little-endian encoding
//! - Fixed-size composites: Concatenated fields
//!
//! Every field is fixed-size, so the encoding of a record is a pure function
//! of its contents and the chain hash is reproducible on any machine.

use ssz_rs::prelude::*;
use sha2::{Sha256, Digest};

/// SSZ container hashed into the transaction log chain.
///
/// Layout: 8 + 1 + 32 + 32 + 8 + 8 + 8 + 8 + 8 + 32 = 145 bytes
#[derive(Debug, Clone, PartialEq, Eq, Default, SimpleSerialize)]
pub struct TransactionRecord {
    /// Log position, starting at 1
    pub seq: u64,

    /// Trade kind as u8 (0=Issue, 1=Buy, 2=Sell)
    pub kind: u8,

    /// SHA-256 of the user id
    pub user: [u8; 32],

    /// SHA-256 of the stock id
    pub stock: [u8; 32],

    /// Shares moved, scaled by 10^8
    pub shares: u64,

    /// Realized price per share, scaled by 10^8
    pub price_per_share: u64,

    /// Currency moved, scaled by 10^8
    pub total_amount: u64,

    /// Post-settlement spot price, scaled by 10^8
    pub spot_price: u64,

    /// Unix timestamp in milliseconds
    pub timestamp: u64,

    /// Hash of the previous log entry
    pub prev_hash: [u8; 32],
}

impl TransactionRecord {
    /// Chain hash: SHA-256 over `prev_hash || ssz(record)`
    ///
    /// Returns `None` if SSZ encoding fails.
    pub fn chain_hash(&self) -> Option<[u8; 32]> {
        let bytes = ssz_rs::serialize(self).ok()?;

        let mut hasher = Sha256::new();
        hasher.update(self.prev_hash);
        hasher.update(&bytes);
        let result = hasher.finalize();

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        Some(hash)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
