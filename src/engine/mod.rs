//! Trade engine: issuance, accounts and pool trades.
//!
//! ## Design Principles
//!
//! 1. **One batch per operation**: every record an operation touches is
//!    staged into a single [`WriteBatch`] and committed together
//! 2. **Validate first**: malformed requests and insufficient resources are
//!    rejected before anything is staged
//! 3. **Explicit store**: the store handle is passed to every call; the
//!    engine holds only configuration and its lock table
//! 4. **Deterministic pricing**: quotes are pure functions of the pool
//!
//! ## Concurrency
//!
//! `TradeEngine` is `Send + Sync` and meant to be shared behind an `Arc`.
//! Trades on one pool are serialized by a per-pool lock held from read to
//! commit; per-user locks serialize a user's trades across pools. Writers
//! outside this engine are caught by the store's version check.
//!
//! ## Example
//!
//! ```
//! use rust_decimal::Decimal;
//! use yolo_ledger::engine::{TradeEngine, TradeRequest};
//! use yolo_ledger::registry::IssueRequest;
//! use yolo_ledger::store::InMemoryStore;
//! use yolo_ledger::types::UserId;
//!
//! let store = InMemoryStore::new();
//! let engine = TradeEngine::default();
//! let alice = UserId::new("alice");
//! let bob = UserId::new("bob");
//!
//! engine.open_account(&store, &alice, 1).unwrap();
//! engine.open_account(&store, &bob, 1).unwrap();
//!
//! let issued = engine
//!     .issue_stock(&store, &IssueRequest::new(alice, "alice", "Alice", Decimal::from(1000), Decimal::from(2)), 2)
//!     .unwrap();
//! assert_eq!(issued.pool.stock_reserve, Decimal::from(650));
//!
//! let bought = engine
//!     .execute_buy(&store, &TradeRequest::new(bob, issued.stock.id, Decimal::from(100)), 3)
//!     .unwrap();
//! assert_eq!(bought.shares, Decimal::new(4642857142, 8));
//! ```

mod locks;
pub mod trade;

pub use trade::{TradeOutcome, TradeRequest};

use serde::{Deserialize, Serialize};

use crate::amm::{self, BuyQuote, LiquidityPool, SellQuote};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result, StoreError};
use crate::journal::{self, TransactionFilter};
use crate::ledger::{Balance, Holding};
use crate::registry::{IssuancePlan, IssueRequest};
use crate::store::{LedgerStore, Versioned, WriteBatch};
use crate::types::{
    PendingTransaction, Stock, StockId, Timestamp, TradeKind, Transaction, UserId,
};

use locks::LockTable;

/// Records created by one issuance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuance {
    pub stock: Stock,
    pub pool: LiquidityPool,
    /// Creator's allocation
    pub holding: Holding,
    pub transaction: Transaction,
    /// Returned from an earlier commit with the same idempotency key
    pub replayed: bool,
}

/// Ledger operations over a [`LedgerStore`]
#[derive(Debug)]
pub struct TradeEngine {
    config: LedgerConfig,
    locks: LockTable,
}

impl Default for TradeEngine {
    fn default() -> Self {
        Self {
            config: LedgerConfig::default(),
            locks: LockTable::new(),
        }
    }
}

impl TradeEngine {
    /// Create an engine with a validated configuration
    pub fn new(config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            locks: LockTable::new(),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    /// Grant `starting_balance` to a user without a balance record
    ///
    /// An existing balance is returned unchanged.
    #[tracing::instrument(skip(self, store))]
    pub fn open_account<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        user_id: &UserId,
        now: Timestamp,
    ) -> Result<Balance> {
        let _user = self.locks.user(user_id);

        if let Some(existing) = store.balance(user_id)? {
            return Ok(existing.value);
        }

        let balance = Balance::opening(user_id.clone(), self.config.starting_balance, now);
        match store.commit(WriteBatch::new().put_balance(balance.clone(), 0)) {
            Ok(_) => {
                tracing::info!("Opened account {} with {}", user_id, balance.amount);
                Ok(balance)
            }
            // Opened concurrently by another writer
            Err(StoreError::Conflict(_)) => Ok(load_balance(store, user_id)?.value),
            Err(e) => {
                tracing::warn!("Failed to open account {}: {}", user_id, e);
                Err(e.into())
            }
        }
    }

    // ========================================================================
    // Issuance
    // ========================================================================

    /// Mint a stock, seed its pool and allocate the creator's shares
    ///
    /// # Errors
    ///
    /// - `InvalidParameters` for a malformed request or a breached issuance cap
    /// - `DuplicateSymbol` if the symbol is taken
    /// - `InsufficientFunds` if the creator cannot pay for their shares
    /// - `TradeFailed` if the commit fails
    #[tracing::instrument(skip(self, store, request), fields(symbol = %request.symbol, owner = %request.owner_id))]
    pub fn issue_stock<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        request: &IssueRequest,
        now: Timestamp,
    ) -> Result<Issuance> {
        let _registry = self.locks.registry();
        let _user = self.locks.user(&request.owner_id);

        let result = self.issue_locked(store, request, now);
        match &result {
            Ok(issuance) if !issuance.replayed => tracing::info!(
                "Issued {} ({}): {} to creator, {} to pool at {}",
                issuance.stock.symbol,
                issuance.stock.id,
                issuance.holding.shares,
                issuance.pool.stock_reserve,
                issuance.stock.display_price
            ),
            Ok(_) => tracing::debug!("Replayed issuance for {}", request.symbol),
            Err(e) => tracing::warn!("Issuance of {} rejected: {}", request.symbol, e),
        }
        result
    }

    fn issue_locked<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        request: &IssueRequest,
        now: Timestamp,
    ) -> Result<Issuance> {
        if let Some(issuance) = self.replay_issuance(store, request)? {
            return Ok(issuance);
        }

        let (symbol, name) = request.validate(&self.config)?;
        let plan = IssuancePlan::compute(
            request.total_supply,
            request.unit_price,
            self.config.creator_share,
        )?;

        if store.stock_by_symbol(&symbol)?.is_some() {
            return Err(LedgerError::DuplicateSymbol(symbol));
        }

        let balance = load_balance(store, &request.owner_id)?;
        plan.check_cap(balance.value.amount, &self.config)?;
        let new_balance = balance.value.debited(plan.creator_cost, now)?;

        let stock = Stock::new(
            StockId::for_symbol(&symbol),
            symbol.clone(),
            name,
            request.owner_id.clone(),
            plan.total_supply,
            plan.unit_price,
            now,
        );
        let pool = LiquidityPool::seed(stock.id, plan.unit_price, plan.pool_shares, now)?;
        let holding = Holding::opening(
            request.owner_id.clone(),
            stock.id,
            plan.creator_shares,
            plan.unit_price,
            now,
        )?;
        let pending = PendingTransaction::new(
            request.owner_id.clone(),
            stock.id,
            TradeKind::Issue,
            plan.creator_shares,
            plan.unit_price,
            plan.creator_cost,
            plan.unit_price,
            now,
        );
        journal::ensure_encodable(&pending)?;

        let batch = WriteBatch::new()
            .with_idempotency_key(request.idempotency_key.clone())
            .put_stock(stock.clone(), 0)
            .put_pool(pool.clone(), 0)
            .put_holding(holding.clone(), 0)
            .put_balance(new_balance, balance.version)
            .append(pending);

        let receipt = match store.commit(batch) {
            Ok(receipt) => receipt,
            Err(StoreError::Conflict(_)) if store.stock_by_symbol(&symbol)?.is_some() => {
                return Err(LedgerError::DuplicateSymbol(symbol));
            }
            Err(StoreError::DuplicateKey(key)) => {
                return self
                    .replay_issuance(store, request)?
                    .ok_or(LedgerError::TradeFailed(StoreError::DuplicateKey(key)));
            }
            Err(e) => return Err(e.into()),
        };

        let transaction = receipt
            .transactions
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Corrupt("issuance commit appended no entry".into()))?;

        Ok(Issuance {
            stock,
            pool,
            holding,
            transaction,
            replayed: false,
        })
    }

    fn replay_issuance<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        request: &IssueRequest,
    ) -> Result<Option<Issuance>> {
        let Some(key) = request.idempotency_key.as_deref() else {
            return Ok(None);
        };
        let Some(transaction) = store.transaction_by_key(key)? else {
            return Ok(None);
        };

        if transaction.kind != TradeKind::Issue || transaction.user_id != request.owner_id {
            return Err(LedgerError::InvalidParameters(format!(
                "idempotency key {} already used for a different request",
                key
            )));
        }

        let stock = load_stock(store, &transaction.stock_id)?.value;
        let pool = self.get_pool(store, &transaction.stock_id)?;
        let holding = self.get_holding(store, &transaction.user_id, &transaction.stock_id)?;

        Ok(Some(Issuance {
            stock,
            pool,
            holding,
            transaction,
            replayed: true,
        }))
    }

    // ========================================================================
    // Quotes
    // ========================================================================

    /// Price a buy of `currency_in` against a stock's pool without executing
    pub fn quote_buy<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        stock_id: &StockId,
        currency_in: rust_decimal::Decimal,
    ) -> Result<BuyQuote> {
        let pool = self.get_pool(store, stock_id)?;
        let quote = amm::quote_buy(&pool, currency_in)?;
        tracing::debug!(
            "Quoted buy {} on {}: {} shares at {} ({}% impact)",
            quote.currency_in,
            stock_id,
            quote.stock_out,
            quote.price_per_share,
            quote.price_impact_pct
        );
        Ok(quote)
    }

    /// Price a sale of `stock_in` shares into a stock's pool without executing
    pub fn quote_sell<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        stock_id: &StockId,
        stock_in: rust_decimal::Decimal,
    ) -> Result<SellQuote> {
        let pool = self.get_pool(store, stock_id)?;
        let quote = amm::quote_sell(&pool, stock_in)?;
        tracing::debug!(
            "Quoted sell {} on {}: {} out at {} ({}% impact)",
            quote.stock_in,
            stock_id,
            quote.currency_out,
            quote.price_per_share,
            quote.price_impact_pct
        );
        Ok(quote)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get_pool<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        stock_id: &StockId,
    ) -> Result<LiquidityPool> {
        Ok(load_pool(store, stock_id)?.value)
    }

    /// Balance of a user; zero if they have none
    pub fn get_balance<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        user_id: &UserId,
    ) -> Result<Balance> {
        Ok(load_balance(store, user_id)?.value)
    }

    /// Position of a user in a stock; empty if they have none
    pub fn get_holding<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        user_id: &UserId,
        stock_id: &StockId,
    ) -> Result<Holding> {
        Ok(load_holding(store, user_id, stock_id)?.value)
    }

    /// A user's open positions
    pub fn holdings_of<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        user_id: &UserId,
    ) -> Result<Vec<Holding>> {
        Ok(store
            .holdings_by_user(user_id)?
            .into_iter()
            .filter(Holding::is_open)
            .collect())
    }

    /// Log entries matching `filter`, newest first
    pub fn transactions<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>> {
        Ok(store.transactions(filter)?)
    }
}

// ============================================================================
// Versioned loads
// ============================================================================

fn load_stock<S: LedgerStore + ?Sized>(store: &S, stock_id: &StockId) -> Result<Versioned<Stock>> {
    store
        .stock(stock_id)?
        .ok_or_else(|| LedgerError::not_found("stock", stock_id))
}

fn load_pool<S: LedgerStore + ?Sized>(
    store: &S,
    stock_id: &StockId,
) -> Result<Versioned<LiquidityPool>> {
    store
        .pool(stock_id)?
        .ok_or_else(|| LedgerError::not_found("pool", stock_id))
}

fn load_balance<S: LedgerStore + ?Sized>(store: &S, user_id: &UserId) -> Result<Versioned<Balance>> {
    Ok(store
        .balance(user_id)?
        .unwrap_or_else(|| Versioned::absent(Balance::empty(user_id.clone()))))
}

fn load_holding<S: LedgerStore + ?Sized>(
    store: &S,
    user_id: &UserId,
    stock_id: &StockId,
) -> Result<Versioned<Holding>> {
    Ok(store
        .holding(user_id, stock_id)?
        .unwrap_or_else(|| Versioned::absent(Holding::empty(user_id.clone(), *stock_id))))
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn setup() -> (InMemoryStore, TradeEngine, UserId) {
        let store = InMemoryStore::new();
        let engine = TradeEngine::default();
        let alice = UserId::new("alice");
        engine.open_account(&store, &alice, 1).unwrap();
        (store, engine, alice)
    }

    fn request(owner: &UserId, symbol: &str) -> IssueRequest {
        IssueRequest::new(owner.clone(), symbol, "Alice", dec!(1000), dec!(2))
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TradeEngine>();
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = LedgerConfig {
            creator_share: Decimal::ZERO,
            ..LedgerConfig::default()
        };
        assert!(matches!(TradeEngine::new(config), Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_open_account_once() {
        let (store, engine, alice) = setup();
        assert_eq!(engine.get_balance(&store, &alice).unwrap().amount, dec!(8000));

        // Second call is a no-op
        let again = engine.open_account(&store, &alice, 99).unwrap();
        assert_eq!(again.amount, dec!(8000));
        assert_eq!(again.updated_at, 1);
    }

    #[test]
    fn test_issue_reference_split() {
        let (store, engine, alice) = setup();
        let issued = engine.issue_stock(&store, &request(&alice, "alice"), 2).unwrap();

        assert_eq!(issued.stock.symbol.as_str(), "ALICE");
        assert_eq!(issued.stock.display_price, dec!(2));
        assert_eq!(issued.holding.shares, dec!(350));
        assert_eq!(issued.pool.stock_reserve, dec!(650));
        assert_eq!(issued.pool.currency_reserve, dec!(1300));
        assert_eq!(issued.pool.k_constant, dec!(845000));
        assert_eq!(issued.transaction.kind, TradeKind::Issue);
        assert_eq!(issued.transaction.total_amount, dec!(700));
        assert_eq!(issued.transaction.spot_price, dec!(2));
        assert_eq!(engine.get_balance(&store, &alice).unwrap().amount, dec!(7300));
    }

    #[test]
    fn test_issue_duplicate_symbol_any_case() {
        let (store, engine, alice) = setup();
        engine.issue_stock(&store, &request(&alice, "YOLO"), 2).unwrap();

        let err = engine.issue_stock(&store, &request(&alice, "yolo"), 3).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateSymbol(_)));
        assert_eq!(engine.get_balance(&store, &alice).unwrap().amount, dec!(7300));
    }

    #[test]
    fn test_issue_requires_funds() {
        let store = InMemoryStore::new();
        let engine = TradeEngine::default();
        let broke = UserId::new("broke");

        let err = engine.issue_stock(&store, &request(&broke, "BROKE"), 1).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(store.stock_count(), 0);
    }

    #[test]
    fn test_issue_idempotent() {
        let (store, engine, alice) = setup();
        let req = request(&alice, "ALICE").with_idempotency_key("mint-1");

        let first = engine.issue_stock(&store, &req, 2).unwrap();
        let second = engine.issue_stock(&store, &req, 3).unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.stock.id, second.stock.id);
        assert_eq!(first.transaction, second.transaction);
        assert_eq!(store.log_len(), 1);
        assert_eq!(engine.get_balance(&store, &alice).unwrap().amount, dec!(7300));
    }

    #[test]
    fn test_quote_unknown_stock() {
        let (store, engine, _) = setup();
        let err = engine
            .quote_buy(&store, &StockId::generate(), dec!(1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { kind: "pool", .. }));
    }

    #[test]
    fn test_absent_records_read_as_zero() {
        let (store, engine, _) = setup();
        let nobody = UserId::new("nobody");
        let stock = StockId::generate();

        assert_eq!(engine.get_balance(&store, &nobody).unwrap().amount, Decimal::ZERO);
        assert_eq!(engine.get_holding(&store, &nobody, &stock).unwrap().shares, Decimal::ZERO);
        assert!(engine.holdings_of(&store, &nobody).unwrap().is_empty());
    }
}
