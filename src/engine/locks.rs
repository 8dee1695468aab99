//! Lock table serializing writers inside one engine.
//!
//! ## Ordering
//!
//! - Trades: pool lock, then user lock
//! - Issuance: registry lock, then user lock
//! - Accounts: user lock only
//!
//! No path takes a pool or registry lock while holding a user lock, so the
//! order is acyclic.
//!
//! ## Lifetime
//!
//! A slot lives only while some caller holds or waits on it. The last
//! [`SlotGuard`] to drop removes the entry, so keys named by rejected
//! requests do not accumulate.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, MutexGuard, RawMutex};

use crate::types::{StockId, UserId};

type Slot = Arc<Mutex<()>>;
type Table<K> = Mutex<HashMap<K, Slot>>;

#[derive(Debug, Default)]
pub(crate) struct LockTable {
    registry: Mutex<()>,
    pools: Table<StockId>,
    users: Table<UserId>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Held for the whole of an issuance so symbol checks cannot interleave
    pub fn registry(&self) -> MutexGuard<'_, ()> {
        self.registry.lock()
    }

    pub fn pool(&self, stock_id: &StockId) -> SlotGuard<'_, StockId> {
        acquire(&self.pools, stock_id)
    }

    pub fn user(&self, user_id: &UserId) -> SlotGuard<'_, UserId> {
        acquire(&self.users, user_id)
    }

    /// Live pool slots
    pub fn pool_slots(&self) -> usize {
        self.pools.lock().len()
    }

    /// Live user slots
    pub fn user_slots(&self) -> usize {
        self.users.lock().len()
    }
}

/// Exclusive hold on one key; releases the slot on drop
pub(crate) struct SlotGuard<'a, K: Eq + Hash> {
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
    table: &'a Table<K>,
    key: K,
}

impl<K: Eq + Hash> Drop for SlotGuard<'_, K> {
    fn drop(&mut self) {
        // Unlock first; the guard owns one reference to the slot
        drop(self.guard.take());

        let mut table = self.table.lock();
        let unused = table
            .get(&self.key)
            .map_or(false, |slot| Arc::strong_count(slot) == 1);
        if unused {
            table.remove(&self.key);
        }
    }
}

fn acquire<'a, K: Eq + Hash + Clone>(table: &'a Table<K>, key: &K) -> SlotGuard<'a, K> {
    // Cloned under the table lock, so a waiter always keeps the slot alive
    let slot = Arc::clone(table.lock().entry(key.clone()).or_default());
    let guard = slot.lock_arc();

    SlotGuard {
        guard: Some(guard),
        table,
        key: key.clone(),
    }
}
