//! Configuration - policy constants and logging, loaded from TOML

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{LedgerError, Result};

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Fraction of a new stock's supply allocated to its creator; the rest
    /// seeds the pool
    pub creator_share: Decimal,

    /// Currency granted to a newly opened account
    pub starting_balance: Decimal,

    /// Cap on `unit_price * total_supply` as a fraction of the issuer's
    /// balance (unset = no cap)
    pub issuance_cap_fraction: Option<Decimal>,

    /// Longest accepted ticker symbol
    pub max_symbol_len: usize,

    /// Log level for the binary's subscriber
    pub log_level: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            creator_share: Decimal::new(35, 2),
            starting_balance: Decimal::from(8000),
            issuance_cap_fraction: None,
            max_symbol_len: 10,
            log_level: "info".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Load from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("Failed to read config: {}", e)))?;

        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| LedgerError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.creator_share <= Decimal::ZERO || self.creator_share >= Decimal::ONE {
            return Err(LedgerError::Config(format!(
                "creator_share must be between 0 and 1 exclusive, got {}",
                self.creator_share
            )));
        }

        if self.starting_balance.is_sign_negative() {
            return Err(LedgerError::Config(format!(
                "starting_balance must not be negative, got {}",
                self.starting_balance
            )));
        }

        if let Some(cap) = self.issuance_cap_fraction {
            if cap <= Decimal::ZERO || cap > Decimal::ONE {
                return Err(LedgerError::Config(format!(
                    "issuance_cap_fraction must be in (0, 1], got {}",
                    cap
                )));
            }
        }

        if self.max_symbol_len == 0 {
            return Err(LedgerError::Config("max_symbol_len must be positive".to_string()));
        }

        Ok(())
    }

    /// Fraction of supply seeded into the pool
    pub fn pool_share(&self) -> Decimal {
        Decimal::ONE - self.creator_share
    }
}
