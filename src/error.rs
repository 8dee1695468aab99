//! Error handling for the ledger and its record store.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::Symbol;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Ledger error hierarchy
///
/// Validation errors (`InvalidParameters`, `DuplicateSymbol`) and resource
/// errors (`InsufficientFunds` through `SlippageExceeded`) are raised before
/// any record is written. `TradeFailed` means the store rejected or lost the
/// commit and nothing was applied.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed request
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Symbol already issued (case-insensitive)
    #[error("Symbol {0} already exists")]
    DuplicateSymbol(Symbol),

    /// Missing stock or pool
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// Balance below the requested debit
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    /// Holding below the requested sale
    #[error("Insufficient shares: requested {requested}, held {held}")]
    InsufficientShares { requested: Decimal, held: Decimal },

    /// Trade rounds to nothing on the curve
    #[error("Trade too small to move the pool")]
    TradeTooSmall,

    /// Trade would drain a reserve
    #[error("Trade would exhaust the pool reserves")]
    PoolExhausted,

    /// Quote fell below the caller's minimum
    #[error("Slippage exceeded: minimum {minimum}, quoted {quoted}")]
    SlippageExceeded { minimum: Decimal, quoted: Decimal },

    /// Decimal overflow, or an amount too large for the log encoding
    #[error("Arithmetic overflow")]
    Overflow,

    /// Store failure; no partial effects
    #[error("Trade failed: {0}")]
    TradeFailed(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        LedgerError::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    /// Resource errors the caller can fix by retrying with a smaller amount
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LedgerError::InsufficientFunds { .. }
                | LedgerError::InsufficientShares { .. }
                | LedgerError::TradeTooSmall
                | LedgerError::PoolExhausted
                | LedgerError::SlippageExceeded { .. }
        )
    }
}

/// Record store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A record changed since it was read
    #[error("Write conflict on {0}")]
    Conflict(String),

    /// Idempotency key already committed
    #[error("Idempotency key already committed: {0}")]
    DuplicateKey(String),

    /// Backend unreachable or refused the write
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A write would break a record invariant
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
