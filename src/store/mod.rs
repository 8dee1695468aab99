//! Record store interface.
//!
//! ## Architecture
//!
//! The ledger never writes records one at a time. A trade reads what it
//! needs, then stages every mutation into a [`WriteBatch`]:
//!
//! - Record puts, each carrying the version it was read at
//! - Log appends, sealed by the store at commit
//! - An optional idempotency key
//!
//! [`LedgerStore::commit`] applies the whole batch or nothing. If any record
//! moved since it was read the batch fails with `StoreError::Conflict`.
//!
//! ## Versions
//!
//! Every stored record carries a `version`; `0` means "no record". A put
//! expecting version `v` writes version `v + 1`.

pub mod memory;

use crate::amm::LiquidityPool;
use crate::error::StoreResult;
use crate::journal::TransactionFilter;
use crate::ledger::{Balance, Holding};
use crate::types::{CommitReceipt, PendingTransaction, Stock, StockId, Symbol, Transaction, UserId};

pub use memory::{InMemoryStore, Snapshot};

/// A record together with the version it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: u64) -> Self {
        Self { value, version }
    }

    /// Default record standing in for a missing one
    pub fn absent(value: T) -> Self {
        Self { value, version: 0 }
    }

    pub fn is_stored(&self) -> bool {
        self.version > 0
    }
}

/// One staged record put
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    Stock { stock: Stock, expected_version: u64 },
    Pool { pool: LiquidityPool, expected_version: u64 },
    Balance { balance: Balance, expected_version: u64 },
    Holding { holding: Holding, expected_version: u64 },
}

impl Write {
    pub fn expected_version(&self) -> u64 {
        match self {
            Write::Stock { expected_version, .. }
            | Write::Pool { expected_version, .. }
            | Write::Balance { expected_version, .. }
            | Write::Holding { expected_version, .. } => *expected_version,
        }
    }

    /// Record key, for conflict messages
    pub fn describe(&self) -> String {
        match self {
            Write::Stock { stock, .. } => format!("stock {}", stock.symbol),
            Write::Pool { pool, .. } => format!("pool {}", pool.stock_id),
            Write::Balance { balance, .. } => format!("balance {}", balance.user_id),
            Write::Holding { holding, .. } => {
                format!("holding {}/{}", holding.user_id, holding.stock_id)
            }
        }
    }
}

/// All mutations of one ledger operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    pub writes: Vec<Write>,
    pub appends: Vec<PendingTransaction>,
    pub idempotency_key: Option<String>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idempotency_key(mut self, key: Option<String>) -> Self {
        self.idempotency_key = key;
        self
    }

    pub fn put_stock(mut self, stock: Stock, expected_version: u64) -> Self {
        self.writes.push(Write::Stock { stock, expected_version });
        self
    }

    pub fn put_pool(mut self, pool: LiquidityPool, expected_version: u64) -> Self {
        self.writes.push(Write::Pool { pool, expected_version });
        self
    }

    pub fn put_balance(mut self, balance: Balance, expected_version: u64) -> Self {
        self.writes.push(Write::Balance { balance, expected_version });
        self
    }

    pub fn put_holding(mut self, holding: Holding, expected_version: u64) -> Self {
        self.writes.push(Write::Holding { holding, expected_version });
        self
    }

    pub fn append(mut self, transaction: PendingTransaction) -> Self {
        self.appends.push(transaction);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.appends.is_empty()
    }
}

/// Durable home of stocks, pools, balances, holdings and the log
///
/// Reads return `Ok(None)` for missing records. Implementations must make
/// [`commit`](LedgerStore::commit) atomic: on any error no record of the
/// batch is visible.
pub trait LedgerStore: Send + Sync {
    fn stock(&self, id: &StockId) -> StoreResult<Option<Versioned<Stock>>>;

    /// Lookup by normalized symbol
    fn stock_by_symbol(&self, symbol: &Symbol) -> StoreResult<Option<Versioned<Stock>>>;

    /// Every stock, in issuance order
    fn stocks(&self) -> StoreResult<Vec<Stock>>;

    fn pool(&self, stock_id: &StockId) -> StoreResult<Option<Versioned<LiquidityPool>>>;

    fn balance(&self, user_id: &UserId) -> StoreResult<Option<Versioned<Balance>>>;

    fn holding(
        &self,
        user_id: &UserId,
        stock_id: &StockId,
    ) -> StoreResult<Option<Versioned<Holding>>>;

    fn holdings_by_user(&self, user_id: &UserId) -> StoreResult<Vec<Holding>>;

    fn holdings_by_stock(&self, stock_id: &StockId) -> StoreResult<Vec<Holding>>;

    /// Log entries matching `filter`, newest first
    fn transactions(&self, filter: &TransactionFilter) -> StoreResult<Vec<Transaction>>;

    /// First log entry committed under an idempotency key
    fn transaction_by_key(&self, key: &str) -> StoreResult<Option<Transaction>>;

    /// Hash of the newest log entry (genesis hash when empty)
    fn log_head(&self) -> StoreResult<[u8; 32]>;

    /// Apply a batch atomically
    ///
    /// # Errors
    ///
    /// - `Conflict` if a record version moved or a new symbol is taken
    /// - `DuplicateKey` if the idempotency key was already committed
    /// - `Corrupt` if a write would break a record invariant
    /// - `Unavailable` on backend failure
    fn commit(&self, batch: WriteBatch) -> StoreResult<CommitReceipt>;
}
