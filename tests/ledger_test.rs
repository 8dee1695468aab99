//! End-to-end ledger scenarios.
//!
//! These tests verify:
//! 1. The issuance split and the reference buy land on exact reserves
//! 2. Rejected operations leave every record unchanged
//! 3. Currency and shares are conserved across trades
//! 4. A failing or conflicting commit applies nothing
//! 5. Idempotency keys and slippage bounds behave across the full path

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;

use parking_lot::Mutex;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use yolo_ledger::error::StoreResult;
use yolo_ledger::store::Versioned;
use yolo_ledger::{
    Balance, CommitReceipt, Holding, InMemoryStore, IssueRequest, LedgerConfig, LedgerError,
    LedgerStore, LiquidityPool, Stock, StockId, StoreError, Symbol, TradeEngine, TradeKind,
    TradeRequest, Transaction, TransactionFilter, UserId, WriteBatch,
};

// ============================================================================
// HELPERS
// ============================================================================

type CommitHook = Box<dyn FnOnce(&InMemoryStore) + Send>;

/// Store wrapper whose commits can be switched to fail, or preceded once by
/// another writer's commit
struct FlakyStore {
    inner: InMemoryStore,
    failing: AtomicBool,
    before_commit: Mutex<Option<CommitHook>>,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            failing: AtomicBool::new(false),
            before_commit: Mutex::new(None),
        }
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Run `hook` against the inner store just before the next commit
    fn interleave(&self, hook: impl FnOnce(&InMemoryStore) + Send + 'static) {
        *self.before_commit.lock() = Some(Box::new(hook));
    }
}

impl LedgerStore for FlakyStore {
    fn stock(&self, id: &StockId) -> StoreResult<Option<Versioned<Stock>>> {
        self.inner.stock(id)
    }

    fn stock_by_symbol(&self, symbol: &Symbol) -> StoreResult<Option<Versioned<Stock>>> {
        self.inner.stock_by_symbol(symbol)
    }

    fn stocks(&self) -> StoreResult<Vec<Stock>> {
        self.inner.stocks()
    }

    fn pool(&self, stock_id: &StockId) -> StoreResult<Option<Versioned<LiquidityPool>>> {
        self.inner.pool(stock_id)
    }

    fn balance(&self, user_id: &UserId) -> StoreResult<Option<Versioned<Balance>>> {
        self.inner.balance(user_id)
    }

    fn holding(
        &self,
        user_id: &UserId,
        stock_id: &StockId,
    ) -> StoreResult<Option<Versioned<Holding>>> {
        self.inner.holding(user_id, stock_id)
    }

    fn holdings_by_user(&self, user_id: &UserId) -> StoreResult<Vec<Holding>> {
        self.inner.holdings_by_user(user_id)
    }

    fn holdings_by_stock(&self, stock_id: &StockId) -> StoreResult<Vec<Holding>> {
        self.inner.holdings_by_stock(stock_id)
    }

    fn transactions(&self, filter: &TransactionFilter) -> StoreResult<Vec<Transaction>> {
        self.inner.transactions(filter)
    }

    fn transaction_by_key(&self, key: &str) -> StoreResult<Option<Transaction>> {
        self.inner.transaction_by_key(key)
    }

    fn log_head(&self) -> StoreResult<[u8; 32]> {
        self.inner.log_head()
    }

    fn commit(&self, batch: WriteBatch) -> StoreResult<CommitReceipt> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        let hook = self.before_commit.lock().take();
        if let Some(hook) = hook {
            hook(&self.inner);
        }
        self.inner.commit(batch)
    }
}

struct Market {
    store: InMemoryStore,
    engine: TradeEngine,
    alice: UserId,
    bob: UserId,
    stock: StockId,
}

fn market() -> Market {
    let store = InMemoryStore::new();
    let engine = TradeEngine::default();
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");

    engine.open_account(&store, &alice, 1).unwrap();
    engine.open_account(&store, &bob, 1).unwrap();

    let issued = engine
        .issue_stock(
            &store,
            &IssueRequest::new(alice.clone(), "alice", "Alice", dec!(1000), dec!(2)),
            2,
        )
        .unwrap();

    Market {
        store,
        engine,
        alice,
        bob,
        stock: issued.stock.id,
    }
}

// ============================================================================
// ISSUANCE
// ============================================================================

#[test]
fn issuance_split_matches_reference() {
    let m = market();

    let pool = m.engine.get_pool(&m.store, &m.stock).unwrap();
    assert_eq!(pool.stock_reserve, dec!(650));
    assert_eq!(pool.currency_reserve, dec!(1300));
    assert_eq!(pool.k_constant, dec!(845000));

    let holding = m.engine.get_holding(&m.store, &m.alice, &m.stock).unwrap();
    assert_eq!(holding.shares, dec!(350));
    assert_eq!(holding.average_cost, dec!(2));

    // Creator paid 700; the payment did not enter the pool
    assert_eq!(m.engine.get_balance(&m.store, &m.alice).unwrap().amount, dec!(7300));

    let log = m
        .engine
        .transactions(&m.store, &TransactionFilter::for_stock(m.stock))
        .unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].kind, TradeKind::Issue);
    assert_eq!(log[0].shares, dec!(350));
}

#[test]
fn issuance_rejects_duplicate_symbol_case_insensitively() {
    let m = market();
    let err = m
        .engine
        .issue_stock(
            &m.store,
            &IssueRequest::new(m.bob.clone(), "ALICE", "Imposter", dec!(10), dec!(1)),
            3,
        )
        .unwrap_err();

    assert!(matches!(err, LedgerError::DuplicateSymbol(ref s) if s.as_str() == "ALICE"));
    assert_eq!(m.engine.get_balance(&m.store, &m.bob).unwrap().amount, dec!(8000));
}

#[test]
fn issuance_race_between_engines_maps_conflict_to_duplicate() {
    let store = FlakyStore::new();
    let engine = TradeEngine::default();
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    engine.open_account(&store, &alice, 1).unwrap();
    engine.open_account(&store, &bob, 1).unwrap();

    // A second engine lists the symbol after bob's checks pass
    let rival_owner = alice.clone();
    store.interleave(move |inner| {
        TradeEngine::default()
            .issue_stock(
                inner,
                &IssueRequest::new(rival_owner, "moon", "Moon", dec!(1000), dec!(2)),
                2,
            )
            .unwrap();
    });

    let err = engine
        .issue_stock(
            &store,
            &IssueRequest::new(bob.clone(), "MOON", "Moon Too", dec!(100), dec!(1)),
            3,
        )
        .unwrap_err();

    assert!(matches!(err, LedgerError::DuplicateSymbol(ref s) if s.as_str() == "MOON"));
    assert_eq!(engine.get_balance(&store, &bob).unwrap().amount, dec!(8000));
    assert_eq!(store.inner.stock_count(), 1);
    assert_eq!(store.inner.log_len(), 1);
    store.inner.verify_log().unwrap();
}

#[test]
fn concurrent_engines_list_a_symbol_once() {
    let store = InMemoryStore::new();
    let engines = [TradeEngine::default(), TradeEngine::default()];
    let owners = [UserId::new("alice"), UserId::new("bob")];
    for owner in &owners {
        engines[0].open_account(&store, owner, 1).unwrap();
    }

    let barrier = Barrier::new(2);
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = engines
            .iter()
            .zip(&owners)
            .map(|(engine, owner)| {
                let (store, barrier) = (&store, &barrier);
                scope.spawn(move || {
                    barrier.wait();
                    engine.issue_stock(
                        store,
                        &IssueRequest::new(owner.clone(), "yolo", "Yolo", dec!(1000), dec!(2)),
                        2,
                    )
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let listed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(listed, 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(LedgerError::DuplicateSymbol(_)))));
    assert_eq!(store.stock_count(), 1);
    assert_eq!(store.log_len(), 1);
}

#[test]
fn issuance_validates_request() {
    let m = market();
    let bad = [
        IssueRequest::new(m.bob.clone(), "BOB", "Bob", Decimal::ZERO, dec!(1)),
        IssueRequest::new(m.bob.clone(), "BOB", "Bob", dec!(10), Decimal::ZERO),
        IssueRequest::new(m.bob.clone(), "", "Bob", dec!(10), dec!(1)),
        IssueRequest::new(m.bob.clone(), "B.O.B", "Bob", dec!(10), dec!(1)),
        IssueRequest::new(m.bob.clone(), "BOB", " ", dec!(10), dec!(1)),
    ];

    for request in &bad {
        let err = m.engine.issue_stock(&m.store, request, 3).unwrap_err();
        assert!(
            matches!(err, LedgerError::InvalidParameters(_)),
            "{request:?} gave {err:?}"
        );
    }
    assert_eq!(m.store.stock_count(), 1);
}

#[test]
fn issuance_cap_applies_when_configured() {
    let store = InMemoryStore::new();
    let engine = TradeEngine::new(LedgerConfig {
        issuance_cap_fraction: Some(dec!(0.2)),
        ..LedgerConfig::default()
    })
    .unwrap();
    let carol = UserId::new("carol");
    engine.open_account(&store, &carol, 1).unwrap();

    // 1000 * 2 = 2000 > 0.2 * 8000
    let err = engine
        .issue_stock(
            &store,
            &IssueRequest::new(carol.clone(), "CAROL", "Carol", dec!(1000), dec!(2)),
            2,
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidParameters(_)));

    // 800 * 2 = 1600 fits
    engine
        .issue_stock(
            &store,
            &IssueRequest::new(carol, "CAROL", "Carol", dec!(800), dec!(2)),
            3,
        )
        .unwrap();
}

// ============================================================================
// TRADING
// ============================================================================

#[test]
fn buy_reference_scenario() {
    let m = market();
    let outcome = m
        .engine
        .execute_buy(&m.store, &TradeRequest::new(m.bob.clone(), m.stock, dec!(100)), 3)
        .unwrap();

    assert_eq!(outcome.shares, dec!(46.42857142));
    assert_eq!(outcome.price_per_share, dec!(2.15384615));
    assert!(outcome.price_impact_pct.unwrap() > dec!(7.69));

    let pool = m.engine.get_pool(&m.store, &m.stock).unwrap();
    assert_eq!(pool.currency_reserve, dec!(1400));
    assert_eq!(pool.stock_reserve, dec!(603.57142858));
    assert!(pool.holds_invariant(dec!(845000)));

    assert_eq!(m.engine.get_balance(&m.store, &m.bob).unwrap().amount, dec!(7900));
    assert_eq!(outcome.transaction.seq, 2);
    assert!(m.store.verify_log().is_ok());
}

#[test]
fn oversell_leaves_all_records_unchanged() {
    let m = market();
    m.engine
        .execute_buy(&m.store, &TradeRequest::new(m.bob.clone(), m.stock, dec!(100)), 3)
        .unwrap();
    let before = m.store.snapshot();

    let err = m
        .engine
        .execute_sell(&m.store, &TradeRequest::new(m.bob.clone(), m.stock, dec!(50)), 4)
        .unwrap_err();

    match err {
        LedgerError::InsufficientShares { requested, held } => {
            assert_eq!(requested, dec!(50));
            assert_eq!(held, dec!(46.42857142));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(m.store.snapshot(), before);
}

#[test]
fn trades_conserve_currency_and_shares() {
    let m = market();
    let start = m.store.snapshot();
    let currency = start.total_currency();
    let shares = start.total_shares(&m.stock);

    for (i, amount) in [dec!(100), dec!(250.5), dec!(3), dec!(999.99999999)].iter().enumerate() {
        let now = 10 + i as u64;
        let balance_before = m.engine.get_balance(&m.store, &m.bob).unwrap().amount;
        let outcome = m
            .engine
            .execute_buy(&m.store, &TradeRequest::new(m.bob.clone(), m.stock, *amount), now)
            .unwrap();
        let balance_after = m.engine.get_balance(&m.store, &m.bob).unwrap().amount;
        assert_eq!(balance_before - balance_after, outcome.currency);
    }

    let held = m.engine.get_holding(&m.store, &m.bob, &m.stock).unwrap().shares;
    let balance_before = m.engine.get_balance(&m.store, &m.bob).unwrap().amount;
    let sold = m
        .engine
        .execute_sell(&m.store, &TradeRequest::new(m.bob.clone(), m.stock, held), 20)
        .unwrap();
    let balance_after = m.engine.get_balance(&m.store, &m.bob).unwrap().amount;
    assert_eq!(balance_after - balance_before, sold.currency);

    let end = m.store.snapshot();
    assert_eq!(end.total_currency(), currency);
    assert_eq!(end.total_shares(&m.stock), shares);
}

#[test]
fn round_trip_returns_less_than_paid() {
    for size in [dec!(10), dec!(100), dec!(1000)] {
        let m = market();
        let bought = m
            .engine
            .execute_buy(&m.store, &TradeRequest::new(m.bob.clone(), m.stock, size), 3)
            .unwrap();
        let sold = m
            .engine
            .execute_sell(&m.store, &TradeRequest::new(m.bob.clone(), m.stock, bought.shares), 4)
            .unwrap();

        // Without fees the curve is path independent; only rounding is lost
        assert!(sold.currency < size, "{size}: got back {}", sold.currency);
        assert!(size - sold.currency < dec!(0.000001));

        let pool = m.engine.get_pool(&m.store, &m.stock).unwrap();
        assert_eq!(pool.stock_reserve, dec!(650));
        assert!(pool.currency_reserve > dec!(1300));
    }
}

#[test]
fn failing_commit_applies_nothing() {
    let store = FlakyStore::new();
    let engine = TradeEngine::default();
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    engine.open_account(&store, &alice, 1).unwrap();
    engine.open_account(&store, &bob, 1).unwrap();
    let stock = engine
        .issue_stock(
            &store,
            &IssueRequest::new(alice, "alice", "Alice", dec!(1000), dec!(2)),
            2,
        )
        .unwrap()
        .stock
        .id;

    let before = store.inner.snapshot();
    store.set_failing(true);

    let err = engine
        .execute_buy(&store, &TradeRequest::new(bob.clone(), stock, dec!(100)), 3)
        .unwrap_err();
    assert!(matches!(err, LedgerError::TradeFailed(StoreError::Unavailable(_))));
    assert_eq!(store.inner.snapshot(), before);

    store.set_failing(false);
    engine
        .execute_buy(&store, &TradeRequest::new(bob, stock, dec!(100)), 4)
        .unwrap();
    assert_eq!(store.inner.log_len(), 2);
}

#[test]
fn stale_read_is_rejected_as_conflict() {
    let m = market();
    let stale = m.store.pool(&m.stock).unwrap().unwrap();

    m.engine
        .execute_buy(&m.store, &TradeRequest::new(m.bob.clone(), m.stock, dec!(100)), 3)
        .unwrap();

    // A writer outside the engine still holding the old version
    let err = m
        .store
        .commit(WriteBatch::new().put_pool(stale.value, stale.version))
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn idempotent_trade_applies_once() {
    let m = market();
    let request =
        TradeRequest::new(m.bob.clone(), m.stock, dec!(100)).with_idempotency_key("order-7");

    let first = m.engine.execute_buy(&m.store, &request, 3).unwrap();
    let second = m.engine.execute_buy(&m.store, &request, 4).unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(second.transaction.seq, first.transaction.seq);
    assert_eq!(m.store.log_len(), 2);
    assert_eq!(m.engine.get_balance(&m.store, &m.bob).unwrap().amount, dec!(7900));
}

#[test]
fn slippage_bound_rejects_without_side_effects() {
    let m = market();
    let quote = m.engine.quote_sell(&m.store, &m.stock, dec!(100)).unwrap();
    let before = m.store.snapshot();

    let request = TradeRequest::new(m.alice.clone(), m.stock, dec!(100))
        .with_min_out(quote.currency_out + dec!(0.00000001));
    let err = m.engine.execute_sell(&m.store, &request, 3).unwrap_err();

    assert!(matches!(err, LedgerError::SlippageExceeded { .. }));
    assert!(err.is_recoverable());
    assert_eq!(m.store.snapshot(), before);

    // Exactly the quoted amount is accepted
    let request = TradeRequest::new(m.alice.clone(), m.stock, dec!(100))
        .with_min_out(quote.currency_out);
    let sold = m.engine.execute_sell(&m.store, &request, 4).unwrap();
    assert_eq!(sold.currency, quote.currency_out);
}

#[test]
fn history_is_newest_first_and_paginated() {
    let m = market();
    for i in 0..5u64 {
        m.engine
            .execute_buy(&m.store, &TradeRequest::new(m.bob.clone(), m.stock, dec!(10)), 10 + i)
            .unwrap();
    }

    let page = m
        .engine
        .transactions(&m.store, &TransactionFilter::for_user(m.bob.clone()).page(0, 3))
        .unwrap();
    assert_eq!(page.iter().map(|t| t.timestamp).collect::<Vec<_>>(), vec![14, 13, 12]);

    let buys = m
        .engine
        .transactions(&m.store, &TransactionFilter::all().kind(TradeKind::Buy))
        .unwrap();
    assert_eq!(buys.len(), 5);

    let holdings = m.engine.holdings_of(&m.store, &m.bob).unwrap();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0].stock_id, m.stock);
}
