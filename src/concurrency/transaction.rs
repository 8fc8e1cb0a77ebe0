//! A running transaction's identity, strict-2PL phase, isolation level, and
//! the two lock sets it has acquired. The lock manager is the only other
//! piece of code that mutates a transaction's state or lock sets, which is
//! why those fields sit behind locks even though a `Transaction` is normally
//! only touched by the thread that owns it plus the lock manager on its
//! behalf.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::common::rid::Rid;
use crate::common::config::TransactionId;

/// Where a transaction sits in strict two-phase locking. `Growing` may still
/// acquire locks; `Shrinking` may only release them. `Committed`/`Aborted`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// Isolation level, which governs what `LockManager::lock_shared` allows.
/// `ReadUncommitted` never takes shared locks at all (it reads dirty data by
/// design), and `ReadCommitted` releases shared locks immediately rather than
/// holding them until the end of the transaction (not enforced by the lock
/// manager itself — that's the caller's responsibility).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

pub struct Transaction {
    transaction_id: TransactionId,
    isolation_level: IsolationLevel,
    state: Mutex<TransactionState>,
    shared_lock_set: Mutex<HashSet<Rid>>,
    exclusive_lock_set: Mutex<HashSet<Rid>>,
}

impl Transaction {
    pub fn new(transaction_id: TransactionId, isolation_level: IsolationLevel) -> Self {
        Self {
            transaction_id,
            isolation_level,
            state: Mutex::new(TransactionState::Growing),
            shared_lock_set: Mutex::new(HashSet::new()),
            exclusive_lock_set: Mutex::new(HashSet::new()),
        }
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    pub fn holds_shared_lock(&self, rid: &Rid) -> bool {
        self.shared_lock_set.lock().contains(rid)
    }

    pub fn holds_exclusive_lock(&self, rid: &Rid) -> bool {
        self.exclusive_lock_set.lock().contains(rid)
    }

    pub(crate) fn add_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().insert(rid);
    }

    pub(crate) fn add_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().insert(rid);
    }

    pub(crate) fn remove_shared_lock(&self, rid: &Rid) -> bool {
        self.shared_lock_set.lock().remove(rid)
    }

    pub(crate) fn remove_exclusive_lock(&self, rid: &Rid) -> bool {
        self.exclusive_lock_set.lock().remove(rid)
    }

    /// Moves `rid` from the shared set to the exclusive set, as happens when
    /// a shared lock is upgraded in place.
    pub(crate) fn upgrade_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().remove(&rid);
        self.exclusive_lock_set.lock().insert(rid);
    }
}
