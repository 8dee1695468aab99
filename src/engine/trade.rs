//! Buy and sell execution against a stock's pool.
//!
//! ## Buy
//!
//! 1. Debit the user's balance by `amount` (`InsufficientFunds`)
//! 2. Quote the pool (`TradeTooSmall`, `PoolExhausted`)
//! 3. Enforce `min_out` (`SlippageExceeded`)
//! 4. Stage balance, pool, holding, stock price and log entry; commit once
//!
//! ## Sell
//!
//! Mirror of buy: shares come out of the holding (`InsufficientShares`),
//! currency out of the pool into the balance. Average cost is unchanged.
//!
//! A request carrying an idempotency key that was already committed returns
//! the original outcome, marked `replayed`, without touching any record.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::amm;
use crate::engine::{load_balance, load_holding, load_pool, load_stock, TradeEngine};
use crate::error::{LedgerError, Result, StoreError};
use crate::journal;
use crate::store::{LedgerStore, WriteBatch};
use crate::types::{
    amount, CommitReceipt, PendingTransaction, StockId, Timestamp, TradeKind, Transaction, UserId,
};

/// A buy (`amount` = currency in) or sell (`amount` = shares in)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub user_id: UserId,
    pub stock_id: StockId,
    pub amount: Decimal,
    /// Least acceptable shares out (buy) or currency out (sell)
    #[serde(default)]
    pub min_out: Option<Decimal>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl TradeRequest {
    pub fn new(user_id: UserId, stock_id: StockId, amount: Decimal) -> Self {
        Self {
            user_id,
            stock_id,
            amount,
            min_out: None,
            idempotency_key: None,
        }
    }

    pub fn with_min_out(mut self, min_out: Decimal) -> Self {
        self.min_out = Some(min_out);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Realized result of a committed trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub kind: TradeKind,
    /// Shares bought or sold
    pub shares: Decimal,
    /// Currency paid or received
    pub currency: Decimal,
    pub price_per_share: Decimal,
    /// Relative to pre-trade spot; `None` on replay
    pub price_impact_pct: Option<Decimal>,
    /// `None` on replay
    pub spot_price_before: Option<Decimal>,
    /// Spot after the trade, or the current display price on replay
    pub spot_price_after: Decimal,
    pub transaction: Transaction,
    pub replayed: bool,
}

impl TradeOutcome {
    fn replay(transaction: Transaction, current_price: Decimal) -> Self {
        Self {
            kind: transaction.kind,
            shares: transaction.shares,
            currency: transaction.total_amount,
            price_per_share: transaction.price_per_share,
            price_impact_pct: None,
            spot_price_before: None,
            spot_price_after: current_price,
            transaction,
            replayed: true,
        }
    }

    pub fn transaction_hash(&self) -> String {
        self.transaction.hash_hex()
    }
}

impl TradeEngine {
    /// Spend `request.amount` of currency on shares
    ///
    /// # Errors
    ///
    /// `InvalidParameters`, `NotFound`, `InsufficientFunds`, `TradeTooSmall`,
    /// `PoolExhausted`, `SlippageExceeded` or `TradeFailed`. No record
    /// changes on any error.
    #[tracing::instrument(skip(self, store, request), fields(user = %request.user_id, stock = %request.stock_id, amount = %request.amount))]
    pub fn execute_buy<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        request: &TradeRequest,
        now: Timestamp,
    ) -> Result<TradeOutcome> {
        let _pool = self.locks.pool(&request.stock_id);
        let _user = self.locks.user(&request.user_id);

        let result = self.buy_locked(store, request, now);
        log_outcome(request, TradeKind::Buy, &result);
        result
    }

    /// Sell `request.amount` shares back to the pool
    ///
    /// # Errors
    ///
    /// `InvalidParameters`, `NotFound`, `InsufficientShares`, `TradeTooSmall`,
    /// `PoolExhausted`, `SlippageExceeded` or `TradeFailed`. No record
    /// changes on any error.
    #[tracing::instrument(skip(self, store, request), fields(user = %request.user_id, stock = %request.stock_id, amount = %request.amount))]
    pub fn execute_sell<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        request: &TradeRequest,
        now: Timestamp,
    ) -> Result<TradeOutcome> {
        let _pool = self.locks.pool(&request.stock_id);
        let _user = self.locks.user(&request.user_id);

        let result = self.sell_locked(store, request, now);
        log_outcome(request, TradeKind::Sell, &result);
        result
    }

    fn buy_locked<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        request: &TradeRequest,
        now: Timestamp,
    ) -> Result<TradeOutcome> {
        if let Some(outcome) = replay(store, request, TradeKind::Buy)? {
            return Ok(outcome);
        }

        let currency_in = positive_amount(request.amount)?;
        let stock = load_stock(store, &request.stock_id)?;
        let pool = load_pool(store, &request.stock_id)?;
        let balance = load_balance(store, &request.user_id)?;
        let holding = load_holding(store, &request.user_id, &request.stock_id)?;

        let new_balance = balance.value.debited(currency_in, now)?;

        let quote = amm::quote_buy(&pool.value, currency_in)?;
        check_slippage(request.min_out, quote.stock_out)?;

        let new_pool = quote.apply(&pool.value, now)?;
        let new_holding = holding.value.bought(quote.stock_out, quote.currency_in, now)?;
        let spot_after = new_pool.spot_price().ok_or(LedgerError::Overflow)?;

        let pending = PendingTransaction::new(
            request.user_id.clone(),
            request.stock_id,
            TradeKind::Buy,
            quote.stock_out,
            quote.price_per_share,
            quote.currency_in,
            spot_after,
            now,
        );
        journal::ensure_encodable(&pending)?;

        let batch = WriteBatch::new()
            .with_idempotency_key(request.idempotency_key.clone())
            .put_balance(new_balance, balance.version)
            .put_pool(new_pool, pool.version)
            .put_holding(new_holding, holding.version)
            .put_stock(stock.value.repriced(spot_after), stock.version)
            .append(pending);

        let transaction = match commit(store, batch, request, TradeKind::Buy)? {
            Committed::Applied(transaction) => transaction,
            Committed::Replayed(outcome) => return Ok(outcome),
        };

        Ok(TradeOutcome {
            kind: TradeKind::Buy,
            shares: quote.stock_out,
            currency: quote.currency_in,
            price_per_share: quote.price_per_share,
            price_impact_pct: Some(quote.price_impact_pct),
            spot_price_before: Some(quote.spot_price_before),
            spot_price_after: spot_after,
            transaction,
            replayed: false,
        })
    }

    fn sell_locked<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        request: &TradeRequest,
        now: Timestamp,
    ) -> Result<TradeOutcome> {
        if let Some(outcome) = replay(store, request, TradeKind::Sell)? {
            return Ok(outcome);
        }

        let stock_in = positive_amount(request.amount)?;
        let stock = load_stock(store, &request.stock_id)?;
        let pool = load_pool(store, &request.stock_id)?;
        let balance = load_balance(store, &request.user_id)?;
        let holding = load_holding(store, &request.user_id, &request.stock_id)?;

        let new_holding = holding.value.sold(stock_in, now)?;

        let quote = amm::quote_sell(&pool.value, stock_in)?;
        check_slippage(request.min_out, quote.currency_out)?;

        let new_pool = quote.apply(&pool.value, now)?;
        let new_balance = balance.value.credited(quote.currency_out, now)?;
        let spot_after = new_pool.spot_price().ok_or(LedgerError::Overflow)?;

        let pending = PendingTransaction::new(
            request.user_id.clone(),
            request.stock_id,
            TradeKind::Sell,
            quote.stock_in,
            quote.price_per_share,
            quote.currency_out,
            spot_after,
            now,
        );
        journal::ensure_encodable(&pending)?;

        let batch = WriteBatch::new()
            .with_idempotency_key(request.idempotency_key.clone())
            .put_holding(new_holding, holding.version)
            .put_pool(new_pool, pool.version)
            .put_balance(new_balance, balance.version)
            .put_stock(stock.value.repriced(spot_after), stock.version)
            .append(pending);

        let transaction = match commit(store, batch, request, TradeKind::Sell)? {
            Committed::Applied(transaction) => transaction,
            Committed::Replayed(outcome) => return Ok(outcome),
        };

        Ok(TradeOutcome {
            kind: TradeKind::Sell,
            shares: quote.stock_in,
            currency: quote.currency_out,
            price_per_share: quote.price_per_share,
            price_impact_pct: Some(quote.price_impact_pct),
            spot_price_before: Some(quote.spot_price_before),
            spot_price_after: spot_after,
            transaction,
            replayed: false,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

enum Committed {
    Applied(Transaction),
    Replayed(TradeOutcome),
}

/// Commit a trade batch; a key committed concurrently replays that commit
fn commit<S: LedgerStore + ?Sized>(
    store: &S,
    batch: WriteBatch,
    request: &TradeRequest,
    kind: TradeKind,
) -> Result<Committed> {
    match store.commit(batch) {
        Ok(receipt) => Ok(Committed::Applied(appended(receipt)?)),
        Err(StoreError::DuplicateKey(key)) => replay(store, request, kind)?
            .map(Committed::Replayed)
            .ok_or(LedgerError::TradeFailed(StoreError::DuplicateKey(key))),
        Err(e) => Err(e.into()),
    }
}

fn appended(receipt: CommitReceipt) -> Result<Transaction> {
    receipt
        .transactions
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::Corrupt("trade commit appended no entry".into()).into())
}

/// Original outcome for an already-committed idempotency key
fn replay<S: LedgerStore + ?Sized>(
    store: &S,
    request: &TradeRequest,
    kind: TradeKind,
) -> Result<Option<TradeOutcome>> {
    let Some(key) = request.idempotency_key.as_deref() else {
        return Ok(None);
    };
    let Some(transaction) = store.transaction_by_key(key)? else {
        return Ok(None);
    };

    if transaction.kind != kind
        || transaction.user_id != request.user_id
        || transaction.stock_id != request.stock_id
    {
        return Err(LedgerError::InvalidParameters(format!(
            "idempotency key {} already used for a different request",
            key
        )));
    }

    let current_price = load_stock(store, &transaction.stock_id)?.value.display_price;
    Ok(Some(TradeOutcome::replay(transaction, current_price)))
}

/// Non-positive amounts are malformed; the rest is truncated to 8 dp
fn positive_amount(value: Decimal) -> Result<Decimal> {
    if value <= Decimal::ZERO {
        return Err(LedgerError::InvalidParameters(format!(
            "amount must be positive, got {}",
            value
        )));
    }
    let value = amount::round_down(value);
    if value.is_zero() {
        return Err(LedgerError::TradeTooSmall);
    }
    Ok(value)
}

fn check_slippage(min_out: Option<Decimal>, quoted: Decimal) -> Result<()> {
    match min_out {
        Some(minimum) if quoted < minimum => {
            Err(LedgerError::SlippageExceeded { minimum, quoted })
        }
        _ => Ok(()),
    }
}

fn log_outcome(request: &TradeRequest, kind: TradeKind, result: &Result<TradeOutcome>) {
    match result {
        Ok(outcome) if outcome.replayed => {
            tracing::debug!("Replayed {} seq {}", kind, outcome.transaction.seq)
        }
        Ok(outcome) => tracing::info!(
            "{} {} shares of {} for {} by {} (seq {}, spot {})",
            kind,
            outcome.shares,
            request.stock_id,
            outcome.currency,
            request.user_id,
            outcome.transaction.seq,
            outcome.spot_price_after
        ),
        Err(e) => tracing::warn!(
            "{} of {} by {} rejected: {}",
            kind,
            request.stock_id,
            request.user_id,
            e
        ),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
