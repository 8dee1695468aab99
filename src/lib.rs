//! # YOLO Ledger
//!
//! Issuance-and-trading ledger for personal stocks priced by a
//! constant-product market maker.
//!
//! ## Architecture
//!
//! The ledger consists of:
//! - **Types**: Core records (Stock, Transaction, CommitReceipt) and money math
//! - **Ledger**: Per-user balances and holdings
//! - **AMM**: Liquidity pools and constant-product pricing
//! - **Registry**: Issuance rules and stock lookups
//! - **Engine**: Issuance and trades staged into one atomic batch each
//! - **Journal**: Hash-chained transaction log
//! - **Store**: Record store trait and the in-memory implementation
//! - **Reporting**: Market statistics and price history
//!
//! ## Design Principles
//!
//! 1. **Determinism**: Identical operation sequences produce identical records
//!    and log hashes
//! 2. **Decimal Money**: All amounts are `Decimal` at 8 decimal places; payouts
//!    round down in the pool's favour
//! 3. **All or Nothing**: Every operation commits one write batch or nothing
//! 4. **Synchronous Execution**: Pricing is pure; only the commit can fail

// ============================================================================
// Module declarations
// ============================================================================

/// Core data types: Stock, Transaction, identities, amounts
pub mod types;

/// Error types
pub mod error;

/// Policy configuration loaded from TOML
pub mod config;

/// Balances and holdings
pub mod ledger;

/// Liquidity pools and constant-product pricing
pub mod amm;

/// Issuance rules and stock lookups
pub mod registry;

/// Record store interface and in-memory implementation
pub mod store;

/// Hash-chained transaction log
pub mod journal;

/// Trade engine: accounts, issuance, buys and sells
pub mod engine;

/// Market statistics and price history
pub mod reporting;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use amm::{BuyQuote, LiquidityPool, SellQuote};
pub use config::LedgerConfig;
pub use engine::{Issuance, TradeEngine, TradeOutcome, TradeRequest};
pub use error::{LedgerError, Result, StoreError};
pub use journal::TransactionFilter;
pub use ledger::{Balance, Holding};
pub use registry::{IssueRequest, StockSort};
pub use reporting::{MarketStats, PricePoint, Timeframe};
pub use store::{InMemoryStore, LedgerStore, WriteBatch};
pub use types::{CommitReceipt, Stock, StockId, Symbol, Timestamp, TradeKind, Transaction, UserId};
