//! Read-only views over the transaction log for listings and charts.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::journal::TransactionFilter;
use crate::registry;
use crate::store::LedgerStore;
use crate::types::{amount, StockId, Symbol, Timestamp, Transaction};

const HOUR_MS: u64 = 60 * 60 * 1000;
const DAY_MS: u64 = 24 * HOUR_MS;

/// Chart window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Day,
    Week,
    Month,
    Year,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [
        Timeframe::Day,
        Timeframe::Week,
        Timeframe::Month,
        Timeframe::Year,
    ];

    pub fn duration_ms(self) -> u64 {
        match self {
            Timeframe::Day => DAY_MS,
            Timeframe::Week => 7 * DAY_MS,
            Timeframe::Month => 30 * DAY_MS,
            Timeframe::Year => 365 * DAY_MS,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeframe::Day => write!(f, "day"),
            Timeframe::Week => write!(f, "week"),
            Timeframe::Month => write!(f, "month"),
            Timeframe::Year => write!(f, "year"),
        }
    }
}

impl FromStr for Timeframe {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Timeframe::ALL
            .into_iter()
            .find(|timeframe| timeframe.to_string() == wanted)
            .ok_or_else(|| LedgerError::InvalidParameters(format!("unknown timeframe: {}", wanted)))
    }
}

/// Spot price after a log entry settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: Timestamp,
    pub price: Decimal,
}

/// Listing figures for one stock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketStats {
    pub stock_id: StockId,
    pub symbol: Symbol,
    pub price: Decimal,
    pub market_cap: Decimal,
    /// Users holding a positive number of shares
    pub holder_count: usize,
    /// Currency traded in the last 24 hours
    pub volume_24h: Decimal,
    /// Percent move of `price` against the spot price 24 hours ago
    pub change_24h_pct: Option<Decimal>,
    pub trades_24h: usize,
}

/// Price, market cap, holders and 24 hour activity
pub fn market_stats<S: LedgerStore + ?Sized>(
    store: &S,
    stock_id: &StockId,
    now: Timestamp,
) -> Result<MarketStats> {
    let stock = registry::get_stock(store, stock_id)?;
    let holder_count = store
        .holdings_by_stock(stock_id)?
        .iter()
        .filter(|h| h.is_open())
        .count();

    // Newest first
    let log = store.transactions(&TransactionFilter::for_stock(*stock_id).until(now))?;
    let window_start = now.saturating_sub(DAY_MS);

    let recent_trades: Vec<&Transaction> = log
        .iter()
        .filter(|tx| tx.kind.is_trade() && tx.timestamp >= window_start)
        .collect();
    let volume_24h = recent_trades.iter().map(|tx| tx.total_amount).sum();

    let reference = log
        .iter()
        .find(|tx| tx.timestamp <= window_start)
        .or_else(|| log.last())
        .map(|tx| tx.spot_price);
    let change_24h_pct = reference.and_then(|r| change_pct(stock.display_price, r));

    Ok(MarketStats {
        stock_id: stock.id,
        symbol: stock.symbol.clone(),
        price: stock.display_price,
        market_cap: stock.market_cap(),
        holder_count,
        volume_24h,
        change_24h_pct,
        trades_24h: recent_trades.len(),
    })
}

/// Spot prices within `timeframe` up to `now`, oldest first, at most the
/// newest `limit`
pub fn price_history<S: LedgerStore + ?Sized>(
    store: &S,
    stock_id: &StockId,
    timeframe: Timeframe,
    now: Timestamp,
    limit: usize,
) -> Result<Vec<PricePoint>> {
    registry::get_stock(store, stock_id)?;

    let filter = TransactionFilter::for_stock(*stock_id)
        .since(now.saturating_sub(timeframe.duration_ms()))
        .until(now)
        .page(0, limit);

    let mut points: Vec<PricePoint> = store
        .transactions(&filter)?
        .into_iter()
        .map(|tx| PricePoint {
            timestamp: tx.timestamp,
            price: tx.spot_price,
        })
        .collect();
    points.reverse();

    Ok(points)
}

fn change_pct(current: Decimal, reference: Decimal) -> Option<Decimal> {
    let ratio = amount::checked_div(current - reference, reference)?;
    ratio.checked_mul(Decimal::ONE_HUNDRED).map(amount::round)
}
