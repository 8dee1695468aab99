//! Per-user records: spendable balances and stock holdings.
//!
//! Both record types are values: every mutation returns a new record, which
//! the engine stages into a write batch. Nothing here touches the store.

pub mod balance;
pub mod holding;

pub use balance::Balance;
pub use holding::Holding;
