//! Identity types: users, stocks and ticker symbols.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Milliseconds since the Unix epoch
pub type Timestamp = u64;

/// Authenticated caller identity, supplied by the session layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 32-byte digest used in fixed-size log encodings
    pub fn digest(&self) -> [u8; 32] {
        digest_bytes(self.0.as_bytes())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId::new(s)
    }
}

/// Opaque stock identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockId(Uuid);

impl StockId {
    /// Fresh random identity
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Identity derived from a symbol
    ///
    /// Symbols are never reissued, so this is unique per stock, and replaying
    /// the same issuances yields the same ids.
    pub fn for_symbol(symbol: &Symbol) -> Self {
        let digest = digest_bytes(symbol.as_str().as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Self(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// 32-byte digest used in fixed-size log encodings
    pub fn digest(&self) -> [u8; 32] {
        digest_bytes(self.0.as_bytes())
    }
}

impl fmt::Display for StockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ticker symbol, trimmed and upper-cased
///
/// Two symbols that differ only by case or surrounding whitespace are the
/// same symbol.
///
/// ```
/// use yolo_ledger::types::Symbol;
///
/// assert_eq!(Symbol::new(" yolo "), Symbol::new("YOLO"));
/// assert_eq!(Symbol::new("yolo").as_str(), "YOLO");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(s.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    /// ASCII letters and digits only
    pub fn is_alphanumeric(&self) -> bool {
        self.0.chars().all(|c| c.is_ascii_alphanumeric())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

fn digest_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    hash
}
