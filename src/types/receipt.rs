//! Commit receipt for an applied write batch.
//!
//! The receipt summarizes one atomic commit: how many records were written,
//! which log entries were appended, and the log head hash afterwards.

use serde::{Deserialize, Serialize};

use crate::types::Transaction;

/// Summary of a committed write batch.
///
/// ## Log Head
///
/// `log_head` is the chain hash of the newest log entry after the commit.
/// Two stores that applied the same batches in the same order report the
/// same head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    /// Store-assigned commit sequence number
    pub batch_id: u64,

    /// Number of record writes applied (excluding log appends)
    pub records_written: u64,

    /// Log entries appended by this batch, in order
    pub transactions: Vec<Transaction>,

    /// Chain hash of the newest log entry
    pub log_head: [u8; 32],
}

impl CommitReceipt {
    pub fn new(
        batch_id: u64,
        records_written: u64,
        transactions: Vec<Transaction>,
        log_head: [u8; 32],
    ) -> Self {
        Self {
            batch_id,
            records_written,
            transactions,
            log_head,
        }
    }

    /// Get the log head as a hex string
    pub fn log_head_hex(&self) -> String {
        hex::encode(self.log_head)
    }

    /// The single transaction of a trade or issuance batch
    pub fn transaction(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    /// Check if the batch appended nothing to the log
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
