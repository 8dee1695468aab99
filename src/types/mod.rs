//! Core data types for the YOLO ledger
//!
//! All amounts are `rust_decimal::Decimal` values at 8 decimal places.
//!
//! ## Types
//!
//! - [`Stock`]: A personal stock and its display price
//! - [`Transaction`]: An immutable log entry (issue, buy or sell)
//! - [`TransactionRecord`]: Fixed-size SSZ form hashed into the log chain
//! - [`CommitReceipt`]: Summary of an atomic commit
//! - [`UserId`], [`StockId`], [`Symbol`]: Identities

mod ids;
mod stock;
mod transaction;
mod receipt;
pub mod record;
pub mod amount;

// Re-export all types at module level
pub use ids::{StockId, Symbol, Timestamp, UserId};
pub use stock::Stock;
pub use transaction::{PendingTransaction, TradeKind, Transaction};
pub use receipt::CommitReceipt;
pub use record::TransactionRecord;
