//! YOLO Ledger - Binary Entry Point
//!
//! Runs a short issuance and trading session against an in-memory store and
//! prints the resulting records as JSON. The config path is read from
//! `YOLO_LEDGER_CONFIG`; without it the defaults apply.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rust_decimal::Decimal;
use tracing_subscriber::{fmt, EnvFilter};

use yolo_ledger::reporting::{market_stats, price_history, Timeframe};
use yolo_ledger::{
    InMemoryStore, IssueRequest, LedgerConfig, TradeEngine, TradeRequest, UserId,
};

const CONFIG_ENV: &str = "YOLO_LEDGER_CONFIG";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::var(CONFIG_ENV) {
        Ok(path) => LedgerConfig::load(Path::new(&path))?,
        Err(_) => LedgerConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},yolo_ledger=debug", config.log_level)));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    tracing::info!(
        "YOLO ledger starting (creator share {}, starting balance {})",
        config.creator_share,
        config.starting_balance
    );

    let store = InMemoryStore::new();
    let engine = TradeEngine::new(config)?;
    let mut now = now_ms();

    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    engine.open_account(&store, &alice, now)?;
    engine.open_account(&store, &bob, now)?;

    now += 1;
    let issued = engine.issue_stock(
        &store,
        &IssueRequest::new(alice.clone(), "alice", "Alice", Decimal::from(1000), Decimal::from(2)),
        now,
    )?;
    let stock_id = issued.stock.id;

    now += 1;
    let quote = engine.quote_buy(&store, &stock_id, Decimal::from(100))?;
    println!("Quote:\n{}", serde_json::to_string_pretty(&quote)?);

    now += 1;
    let bought = engine.execute_buy(
        &store,
        &TradeRequest::new(bob.clone(), stock_id, Decimal::from(100))
            .with_min_out(quote.stock_out)
            .with_idempotency_key("demo-buy-1"),
        now,
    )?;
    println!("Buy:\n{}", serde_json::to_string_pretty(&bought)?);
    tracing::info!("Buy logged as entry {} ({})", bought.transaction.seq, bought.transaction_hash());

    now += 1;
    let sold = engine.execute_sell(
        &store,
        &TradeRequest::new(bob.clone(), stock_id, bought.shares / Decimal::TWO),
        now,
    )?;
    println!("Sell:\n{}", serde_json::to_string_pretty(&sold)?);

    let stats = market_stats(&store, &stock_id, now)?;
    println!("Market:\n{}", serde_json::to_string_pretty(&stats)?);

    let history = price_history(&store, &stock_id, Timeframe::Day, now, 100)?;
    println!("History:\n{}", serde_json::to_string_pretty(&history)?);

    store.verify_log()?;
    println!("Records:\n{}", store.snapshot().to_json()?);

    tracing::info!(
        "Session complete: {} log entries, head {}",
        store.log_len(),
        hex::encode(yolo_ledger::LedgerStore::log_head(&store)?)
    );

    Ok(())
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
