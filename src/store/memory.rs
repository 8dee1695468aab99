//! In-process record store.
//!
//! ## Architecture
//!
//! - **Slab**: Stock rows, keys never reused since stocks are never removed
//! - **HashMap**: Stock id and symbol to slab key, pools and balances by key
//! - **BTreeMap**: Holdings ordered by `(user, stock)`
//! - **Vec**: The transaction log, oldest first
//!
//! All state sits behind one `parking_lot::RwLock`. Reads share it; a commit
//! takes the write lock, validates the whole batch, seals the log appends and
//! only then mutates, so a rejected batch leaves nothing behind.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use slab::Slab;

use crate::amm::LiquidityPool;
use crate::error::{StoreError, StoreResult};
use crate::journal::{self, TransactionFilter, GENESIS_HASH};
use crate::ledger::{Balance, Holding};
use crate::store::{LedgerStore, Versioned, Write, WriteBatch};
use crate::types::{CommitReceipt, Stock, StockId, Symbol, Transaction, UserId};

/// Thread-safe store held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    /// Stock rows
    /// Key: slab index
    stocks: Slab<Versioned<Stock>>,

    /// Stock id to slab key
    stock_index: HashMap<StockId, usize>,

    /// Normalized symbol to slab key
    symbol_index: HashMap<Symbol, usize>,

    pools: HashMap<StockId, Versioned<LiquidityPool>>,
    balances: HashMap<UserId, Versioned<Balance>>,
    holdings: BTreeMap<(UserId, StockId), Versioned<Holding>>,

    log: Vec<Transaction>,

    /// Idempotency key to the log position of its first entry, if any
    idempotency: HashMap<String, Option<usize>>,

    /// Number of committed batches
    batches: u64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with room for `stock_capacity` stocks
    pub fn with_capacity(stock_capacity: usize) -> Self {
        Self {
            state: RwLock::new(State {
                stocks: Slab::with_capacity(stock_capacity),
                ..State::default()
            }),
        }
    }

    pub fn stock_count(&self) -> usize {
        self.state.read().stocks.len()
    }

    pub fn log_len(&self) -> usize {
        self.state.read().log.len()
    }

    /// Recompute the log's hash chain
    pub fn verify_log(&self) -> StoreResult<()> {
        journal::verify_chain(&self.state.read().log)
    }

    /// Consistent copy of every record
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.read();

        let mut pools: Vec<LiquidityPool> =
            state.pools.values().map(|p| p.value.clone()).collect();
        pools.sort_by_key(|p| p.stock_id);

        let mut balances: Vec<Balance> =
            state.balances.values().map(|b| b.value.clone()).collect();
        balances.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        Snapshot {
            stocks: state.stocks.iter().map(|(_, s)| s.value.clone()).collect(),
            pools,
            balances,
            holdings: state.holdings.values().map(|h| h.value.clone()).collect(),
            log: state.log.clone(),
        }
    }
}

impl State {
    fn head(&self) -> [u8; 32] {
        self.log.last().map(|tx| tx.hash).unwrap_or(GENESIS_HASH)
    }

    fn stock_row(&self, id: &StockId) -> Option<&Versioned<Stock>> {
        self.stock_index.get(id).and_then(|&key| self.stocks.get(key))
    }

    fn current_version(&self, write: &Write) -> u64 {
        match write {
            Write::Stock { stock, .. } => self.stock_row(&stock.id).map_or(0, |r| r.version),
            Write::Pool { pool, .. } => self.pools.get(&pool.stock_id).map_or(0, |r| r.version),
            Write::Balance { balance, .. } => {
                self.balances.get(&balance.user_id).map_or(0, |r| r.version)
            }
            Write::Holding { holding, .. } => self
                .holdings
                .get(&(holding.user_id.clone(), holding.stock_id))
                .map_or(0, |r| r.version),
        }
    }

    fn validate(&self, batch: &WriteBatch) -> StoreResult<()> {
        if let Some(key) = &batch.idempotency_key {
            if self.idempotency.contains_key(key) {
                return Err(StoreError::DuplicateKey(key.clone()));
            }
        }

        for write in &batch.writes {
            let expected = write.expected_version();
            let found = self.current_version(write);
            if expected != found {
                return Err(StoreError::Conflict(format!(
                    "{} (read version {}, now {})",
                    write.describe(),
                    expected,
                    found
                )));
            }

            self.check_record(write, batch)?;
        }

        Ok(())
    }

    fn check_record(&self, write: &Write, batch: &WriteBatch) -> StoreResult<()> {
        match write {
            Write::Stock { stock, .. } => {
                if stock.total_supply <= Decimal::ZERO {
                    return Err(StoreError::Corrupt(format!(
                        "stock {} has no supply",
                        stock.symbol
                    )));
                }
                match self.stock_row(&stock.id) {
                    None if self.symbol_index.contains_key(&stock.symbol) => {
                        Err(StoreError::Conflict(format!("symbol {}", stock.symbol)))
                    }
                    Some(row)
                        if row.value.symbol != stock.symbol
                            || row.value.total_supply != stock.total_supply =>
                    {
                        Err(StoreError::Corrupt(format!(
                            "stock {} symbol and supply are fixed at issuance",
                            row.value.symbol
                        )))
                    }
                    _ => Ok(()),
                }
            }
            Write::Pool { pool, .. } => {
                if !pool.is_tradable() {
                    return Err(StoreError::Corrupt(format!(
                        "pool {} reserves must stay positive",
                        pool.stock_id
                    )));
                }
                let stock_staged = batch.writes.iter().any(
                    |w| matches!(w, Write::Stock { stock, .. } if stock.id == pool.stock_id),
                );
                if self.stock_row(&pool.stock_id).is_none() && !stock_staged {
                    return Err(StoreError::Corrupt(format!(
                        "pool {} has no stock",
                        pool.stock_id
                    )));
                }
                Ok(())
            }
            Write::Balance { balance, .. } if balance.amount.is_sign_negative() => Err(
                StoreError::Corrupt(format!("balance {} below zero", balance.user_id)),
            ),
            Write::Holding { holding, .. } if holding.shares.is_sign_negative() => {
                Err(StoreError::Corrupt(format!(
                    "holding {}/{} below zero",
                    holding.user_id, holding.stock_id
                )))
            }
            _ => Ok(()),
        }
    }

    /// Assign sequence numbers and chain hashes to the batch's appends
    fn seal(&self, batch: &WriteBatch) -> StoreResult<Vec<Transaction>> {
        let mut prev = self.head();
        let mut seq = self.log.len() as u64;
        let mut sealed = Vec::with_capacity(batch.appends.len());

        for pending in &batch.appends {
            seq += 1;
            let tx = journal::seal(pending, seq, prev).ok_or_else(|| {
                StoreError::Corrupt(format!("log entry {} is not encodable", seq))
            })?;
            prev = tx.hash;
            sealed.push(tx);
        }

        Ok(sealed)
    }

    fn put_stock(&mut self, stock: Stock, version: u64) {
        if let Some(&key) = self.stock_index.get(&stock.id) {
            if let Some(row) = self.stocks.get_mut(key) {
                *row = Versioned::new(stock, version);
            }
            return;
        }

        let id = stock.id;
        let symbol = stock.symbol.clone();
        let key = self.stocks.insert(Versioned::new(stock, version));
        self.stock_index.insert(id, key);
        self.symbol_index.insert(symbol, key);
    }

    fn apply(&mut self, batch: WriteBatch, sealed: Vec<Transaction>) -> CommitReceipt {
        let records_written = batch.writes.len() as u64;

        for write in batch.writes {
            match write {
                Write::Stock { stock, expected_version } => {
                    self.put_stock(stock, expected_version + 1);
                }
                Write::Pool { pool, expected_version } => {
                    self.pools
                        .insert(pool.stock_id, Versioned::new(pool, expected_version + 1));
                }
                Write::Balance { balance, expected_version } => {
                    self.balances.insert(
                        balance.user_id.clone(),
                        Versioned::new(balance, expected_version + 1),
                    );
                }
                Write::Holding { holding, expected_version } => {
                    self.holdings.insert(
                        (holding.user_id.clone(), holding.stock_id),
                        Versioned::new(holding, expected_version + 1),
                    );
                }
            }
        }

        let first_entry = if sealed.is_empty() {
            None
        } else {
            Some(self.log.len())
        };
        self.log.extend(sealed.iter().cloned());

        if let Some(key) = batch.idempotency_key {
            self.idempotency.insert(key, first_entry);
        }

        self.batches += 1;
        CommitReceipt::new(self.batches, records_written, sealed, self.head())
    }
}

impl LedgerStore for InMemoryStore {
    fn stock(&self, id: &StockId) -> StoreResult<Option<Versioned<Stock>>> {
        Ok(self.state.read().stock_row(id).cloned())
    }

    fn stock_by_symbol(&self, symbol: &Symbol) -> StoreResult<Option<Versioned<Stock>>> {
        let state = self.state.read();
        Ok(state
            .symbol_index
            .get(symbol)
            .and_then(|&key| state.stocks.get(key))
            .cloned())
    }

    fn stocks(&self) -> StoreResult<Vec<Stock>> {
        Ok(self
            .state
            .read()
            .stocks
            .iter()
            .map(|(_, row)| row.value.clone())
            .collect())
    }

    fn pool(&self, stock_id: &StockId) -> StoreResult<Option<Versioned<LiquidityPool>>> {
        Ok(self.state.read().pools.get(stock_id).cloned())
    }

    fn balance(&self, user_id: &UserId) -> StoreResult<Option<Versioned<Balance>>> {
        Ok(self.state.read().balances.get(user_id).cloned())
    }

    fn holding(
        &self,
        user_id: &UserId,
        stock_id: &StockId,
    ) -> StoreResult<Option<Versioned<Holding>>> {
        Ok(self
            .state
            .read()
            .holdings
            .get(&(user_id.clone(), *stock_id))
            .cloned())
    }

    fn holdings_by_user(&self, user_id: &UserId) -> StoreResult<Vec<Holding>> {
        Ok(self
            .state
            .read()
            .holdings
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .map(|(_, row)| row.value.clone())
            .collect())
    }

    fn holdings_by_stock(&self, stock_id: &StockId) -> StoreResult<Vec<Holding>> {
        Ok(self
            .state
            .read()
            .holdings
            .iter()
            .filter(|((_, stock), _)| stock == stock_id)
            .map(|(_, row)| row.value.clone())
            .collect())
    }

    fn transactions(&self, filter: &TransactionFilter) -> StoreResult<Vec<Transaction>> {
        Ok(filter.select(self.state.read().log.iter()))
    }

    fn transaction_by_key(&self, key: &str) -> StoreResult<Option<Transaction>> {
        let state = self.state.read();
        Ok(state
            .idempotency
            .get(key)
            .copied()
            .flatten()
            .and_then(|pos| state.log.get(pos))
            .cloned())
    }

    fn log_head(&self) -> StoreResult<[u8; 32]> {
        Ok(self.state.read().head())
    }

    fn commit(&self, batch: WriteBatch) -> StoreResult<CommitReceipt> {
        let mut state = self.state.write();
        state.validate(&batch)?;
        let sealed = state.seal(&batch)?;
        Ok(state.apply(batch, sealed))
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time copy of a store's records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub stocks: Vec<Stock>,
    pub pools: Vec<LiquidityPool>,
    pub balances: Vec<Balance>,
    pub holdings: Vec<Holding>,
    pub log: Vec<Transaction>,
}

impl Snapshot {
    /// Balances plus pool currency reserves
    pub fn total_currency(&self) -> Decimal {
        let balances: Decimal = self.balances.iter().map(|b| b.amount).sum();
        let reserves: Decimal = self.pools.iter().map(|p| p.currency_reserve).sum();
        balances + reserves
    }

    /// Shares of one stock held by users plus the pool's reserve
    pub fn total_shares(&self, stock_id: &StockId) -> Decimal {
        let held: Decimal = self
            .holdings
            .iter()
            .filter(|h| &h.stock_id == stock_id)
            .map(|h| h.shares)
            .sum();
        let pooled: Decimal = self
            .pools
            .iter()
            .filter(|p| &p.stock_id == stock_id)
            .map(|p| p.stock_reserve)
            .sum();
        held + pooled
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
