//! Stock Registry: issuance rules and stock lookups.
//!
//! ## Issuance Split
//!
//! ```text
//! creator_shares = round_down(total_supply * creator_share)
//! pool_shares    = total_supply - creator_shares
//! creator_cost   = unit_price * creator_shares
//! ```
//!
//! The creator pays `creator_cost` out of their balance. The payment leaves
//! circulation; the pool is seeded only with `pool_shares` and
//! `unit_price * pool_shares` of currency.
//!
//! The engine stages the resulting records; nothing here writes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::store::LedgerStore;
use crate::types::{amount, Stock, StockId, Symbol, UserId};

/// Request to mint a new stock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRequest {
    pub owner_id: UserId,
    pub symbol: String,
    pub name: String,
    pub total_supply: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl IssueRequest {
    pub fn new(
        owner_id: UserId,
        symbol: impl Into<String>,
        name: impl Into<String>,
        total_supply: Decimal,
        unit_price: Decimal,
    ) -> Self {
        Self {
            owner_id,
            symbol: symbol.into(),
            name: name.into(),
            total_supply,
            unit_price,
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Normalized symbol and trimmed name
    ///
    /// # Errors
    ///
    /// `InvalidParameters` for a malformed symbol or a blank name.
    pub fn validate(&self, config: &LedgerConfig) -> Result<(Symbol, String)> {
        let symbol = normalize_symbol(&self.symbol, config.max_symbol_len)?;

        let name = self.name.trim();
        if name.is_empty() {
            return Err(LedgerError::InvalidParameters("name must not be blank".to_string()));
        }

        Ok((symbol, name.to_string()))
    }
}

/// Trim and upper-case a ticker, rejecting anything but 1..=max_len
/// alphanumeric characters
///
/// # Example
///
/// ```
/// use yolo_ledger::registry::normalize_symbol;
///
/// assert_eq!(normalize_symbol(" yolo ", 10).unwrap().as_str(), "YOLO");
/// assert!(normalize_symbol("TO-THE-MOON", 20).is_err());
/// ```
pub fn normalize_symbol(raw: &str, max_len: usize) -> Result<Symbol> {
    let symbol = Symbol::new(raw);

    if symbol.is_empty() {
        return Err(LedgerError::InvalidParameters("symbol must not be empty".to_string()));
    }
    if symbol.len() > max_len {
        return Err(LedgerError::InvalidParameters(format!(
            "symbol {} longer than {} characters",
            symbol, max_len
        )));
    }
    if !symbol.is_alphanumeric() {
        return Err(LedgerError::InvalidParameters(format!(
            "symbol {} must be alphanumeric",
            symbol
        )));
    }

    Ok(symbol)
}

// ============================================================================
// Issuance Plan
// ============================================================================

/// Share split and creator payment for one issuance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuancePlan {
    pub total_supply: Decimal,
    pub unit_price: Decimal,
    pub creator_shares: Decimal,
    pub pool_shares: Decimal,
    /// `unit_price * creator_shares`, debited from the creator
    pub creator_cost: Decimal,
    /// `unit_price * total_supply`
    pub notional: Decimal,
}

impl IssuancePlan {
    /// Split `total_supply` at `creator_share`
    ///
    /// # Errors
    ///
    /// `InvalidParameters` if supply or price is not positive, or the supply
    /// is too small to give both sides a share.
    pub fn compute(
        total_supply: Decimal,
        unit_price: Decimal,
        creator_share: Decimal,
    ) -> Result<Self> {
        let total_supply = amount::round_down(total_supply);
        let unit_price = amount::round_down(unit_price);

        if total_supply <= Decimal::ZERO {
            return Err(LedgerError::InvalidParameters(
                "total_supply must be positive".to_string(),
            ));
        }
        if unit_price <= Decimal::ZERO {
            return Err(LedgerError::InvalidParameters(
                "unit_price must be positive".to_string(),
            ));
        }

        let creator_shares = amount::checked_mul(total_supply, creator_share)
            .map(amount::round_down)
            .ok_or(LedgerError::Overflow)?;
        let pool_shares = total_supply - creator_shares;

        if creator_shares.is_zero() || pool_shares.is_zero() {
            return Err(LedgerError::InvalidParameters(format!(
                "total_supply {} too small to split",
                total_supply
            )));
        }

        let creator_cost = amount::checked_mul(unit_price, creator_shares)
            .map(amount::round)
            .ok_or(LedgerError::Overflow)?;
        let notional = amount::checked_mul(unit_price, total_supply)
            .map(amount::round)
            .ok_or(LedgerError::Overflow)?;

        Ok(Self {
            total_supply,
            unit_price,
            creator_shares,
            pool_shares,
            creator_cost,
            notional,
        })
    }

    /// Enforce the optional cap on notional relative to the issuer's balance
    pub fn check_cap(&self, balance: Decimal, config: &LedgerConfig) -> Result<()> {
        let Some(fraction) = config.issuance_cap_fraction else {
            return Ok(());
        };

        let cap = amount::checked_mul(balance, fraction)
            .map(amount::round_down)
            .ok_or(LedgerError::Overflow)?;
        if self.notional > cap {
            return Err(LedgerError::InvalidParameters(format!(
                "issuance value {} exceeds {} of balance ({})",
                self.notional, fraction, cap
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Lookups
// ============================================================================

/// Ordering for [`list_stocks`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockSort {
    /// Most recently issued first
    #[default]
    Newest,
    /// Highest display price first
    Price,
    /// Largest market cap first
    MarketCap,
}

/// Stock by symbol, case-insensitive
pub fn get_by_symbol<S: LedgerStore + ?Sized>(store: &S, symbol: &str) -> Result<Stock> {
    let symbol = Symbol::new(symbol);
    store
        .stock_by_symbol(&symbol)?
        .map(|row| row.value)
        .ok_or_else(|| LedgerError::not_found("stock", symbol))
}

pub fn get_stock<S: LedgerStore + ?Sized>(store: &S, stock_id: &StockId) -> Result<Stock> {
    store
        .stock(stock_id)?
        .map(|row| row.value)
        .ok_or_else(|| LedgerError::not_found("stock", stock_id))
}

/// Every stock, sorted; ties broken by symbol
pub fn list_stocks<S: LedgerStore + ?Sized>(store: &S, sort: StockSort) -> Result<Vec<Stock>> {
    let mut stocks = store.stocks()?;

    match sort {
        StockSort::Newest => stocks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.symbol.cmp(&b.symbol))
        }),
        StockSort::Price => stocks.sort_by(|a, b| {
            b.display_price
                .cmp(&a.display_price)
                .then_with(|| a.symbol.cmp(&b.symbol))
        }),
        StockSort::MarketCap => stocks.sort_by(|a, b| {
            b.market_cap()
                .cmp(&a.market_cap())
                .then_with(|| a.symbol.cmp(&b.symbol))
        }),
    }

    Ok(stocks)
}
