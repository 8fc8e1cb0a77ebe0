//! Tuple-granularity lock manager implementing strict two-phase locking
//! under the Wound-Wait deadlock-prevention discipline.
//!
//! One lock request queue exists per [`Rid`], each holding its own
//! [`Condvar`] so a waiter only wakes the transactions actually contending
//! for that resource. All queues share a single [`Mutex`]-protected table —
//! the same coarse-locking shape as the buffer pool's `latch`, and the
//! teacher's own single `latch_` guarding its whole lock table. A separate
//! transaction table lets a waiter look up and wound another transaction by
//! id without that transaction needing to be a caller-visible parameter.
//!
//! Lower `txn_id` means older transaction, which in Wound-Wait means higher
//! priority: an older request wounds (aborts) any younger transaction
//! blocking it, and waits only for transactions that are themselves older.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::common::config::TransactionId;
use crate::common::error::{DbError, DbResult};
use crate::common::rid::Rid;
use crate::concurrency::transaction::{IsolationLevel, Transaction, TransactionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

struct LockRequest {
    txn_id: TransactionId,
    mode: LockMode,
    granted: bool,
}

/// Per-resource request queue. `cv` is reference-counted so a waiter can
/// clone it out of the table guard and then wait on it without holding a
/// live borrow into the table the guard protects.
struct LockRequestQueue {
    requests: VecDeque<LockRequest>,
    cv: Arc<Condvar>,
    upgrading: Option<TransactionId>,
}

impl LockRequestQueue {
    fn new() -> Self {
        Self {
            requests: VecDeque::new(),
            cv: Arc::new(Condvar::new()),
            upgrading: None,
        }
    }
}

pub struct LockManager {
    table: Mutex<HashMap<Rid, LockRequestQueue>>,
    txn_table: Mutex<HashMap<TransactionId, Arc<Transaction>>>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns whether `txn_id`'s state in `txn_table` is `Aborted`. Unknown
/// transactions (shouldn't happen once registered, but keeps this total)
/// are treated as not aborted.
fn is_aborted(txn_table: &HashMap<TransactionId, Arc<Transaction>>, txn_id: TransactionId) -> bool {
    txn_table
        .get(&txn_id)
        .map(|t| t.state() == TransactionState::Aborted)
        .unwrap_or(false)
}

fn wound(txn_table: &HashMap<TransactionId, Arc<Transaction>>, txn_id: TransactionId) {
    if let Some(victim) = txn_table.get(&txn_id) {
        victim.set_state(TransactionState::Aborted);
        trace!(txn_id, "wounded by an older transaction");
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            txn_table: Mutex::new(HashMap::new()),
        }
    }

    fn check_growing_preconditions(&self, txn: &Transaction) -> DbResult<()> {
        if txn.state() == TransactionState::Shrinking {
            txn.set_state(TransactionState::Aborted);
            return Err(DbError::LockOnShrinking(txn.transaction_id()));
        }
        Ok(())
    }

    /// Scans the requests strictly ahead of `txn_id` for a conflicting
    /// *exclusive* request, wounding any younger holder found and reporting
    /// whether an older one still blocks. Used both by `lock_shared`'s
    /// initial scan and every rescan in its wait loop.
    fn shared_blocked_by_exclusive(
        requests: &VecDeque<LockRequest>,
        txn_table: &HashMap<TransactionId, Arc<Transaction>>,
        txn_id: TransactionId,
        wound_younger: bool,
    ) -> (bool, bool) {
        let mut blocked = false;
        let mut killed = false;
        for req in requests.iter() {
            if req.txn_id == txn_id {
                break;
            }
            if req.mode != LockMode::Exclusive || is_aborted(txn_table, req.txn_id) {
                continue;
            }
            if req.txn_id > txn_id {
                if wound_younger {
                    wound(txn_table, req.txn_id);
                    killed = true;
                } else {
                    blocked = true;
                }
            } else {
                blocked = true;
            }
        }
        (blocked, killed)
    }

    pub fn lock_shared(&self, txn: &Arc<Transaction>, rid: Rid) -> DbResult<bool> {
        if txn.state() == TransactionState::Aborted {
            return Ok(false);
        }
        self.check_growing_preconditions(txn)?;
        if txn.isolation_level() == IsolationLevel::ReadUncommitted {
            txn.set_state(TransactionState::Aborted);
            return Err(DbError::LockSharedOnReadUncommitted(txn.transaction_id()));
        }

        txn.set_state(TransactionState::Growing);
        let txn_id = txn.transaction_id();

        let mut table = self.table.lock();
        self.txn_table.lock().insert(txn_id, txn.clone());
        txn.add_shared_lock(rid);

        let queue = table.entry(rid).or_insert_with(LockRequestQueue::new);
        queue.requests.push_back(LockRequest {
            txn_id,
            mode: LockMode::Shared,
            granted: false,
        });

        let (blocked, killed) = {
            let txn_table = self.txn_table.lock();
            Self::shared_blocked_by_exclusive(&queue.requests, &txn_table, txn_id, true)
        };
        if !blocked {
            if let Some(req) = queue.requests.iter_mut().find(|r| r.txn_id == txn_id) {
                req.granted = true;
            }
        }
        if killed {
            queue.cv.notify_all();
        }

        while !table
            .get(&rid)
            .unwrap()
            .requests
            .iter()
            .any(|r| r.txn_id == txn_id && r.granted)
        {
            let queue = table.get_mut(&rid).unwrap();
            let (still_blocked, _) = {
                let txn_table = self.txn_table.lock();
                Self::shared_blocked_by_exclusive(&queue.requests, &txn_table, txn_id, false)
            };
            if !still_blocked {
                if let Some(req) = queue.requests.iter_mut().find(|r| r.txn_id == txn_id) {
                    req.granted = true;
                }
                break;
            }
            if txn.state() == TransactionState::Aborted {
                return Err(DbError::Deadlock(txn_id));
            }
            let cv = queue.cv.clone();
            cv.wait(&mut table);
            if txn.state() == TransactionState::Aborted {
                return Err(DbError::Deadlock(txn_id));
            }
        }

        debug!(txn_id, page_id = rid.page_id(), "shared lock granted");
        Ok(true)
    }

    /// Scans the requests strictly ahead of `txn_id` for any conflicting
    /// (i.e. any, since exclusive conflicts with everything) request.
    fn exclusive_blocked_ahead(
        requests: &VecDeque<LockRequest>,
        txn_table: &HashMap<TransactionId, Arc<Transaction>>,
        txn_id: TransactionId,
        wound_younger: bool,
    ) -> (bool, bool) {
        let mut blocked = false;
        let mut killed = false;
        for req in requests.iter() {
            if req.txn_id == txn_id {
                break;
            }
            if is_aborted(txn_table, req.txn_id) {
                continue;
            }
            if req.txn_id > txn_id {
                if wound_younger {
                    wound(txn_table, req.txn_id);
                    killed = true;
                } else {
                    blocked = true;
                }
            } else {
                blocked = true;
            }
        }
        (blocked, killed)
    }

    /// First-live-entry check used by the exclusive wait loop: walks from
    /// the front skipping aborted holders and reports whether the first
    /// surviving entry is this transaction's own request.
    fn exclusive_is_next(
        requests: &VecDeque<LockRequest>,
        txn_table: &HashMap<TransactionId, Arc<Transaction>>,
        txn_id: TransactionId,
    ) -> bool {
        for req in requests.iter() {
            if is_aborted(txn_table, req.txn_id) {
                continue;
            }
            return req.txn_id == txn_id;
        }
        false
    }

    pub fn lock_exclusive(&self, txn: &Arc<Transaction>, rid: Rid) -> DbResult<bool> {
        if txn.state() == TransactionState::Aborted {
            return Ok(false);
        }
        self.check_growing_preconditions(txn)?;

        txn.set_state(TransactionState::Growing);
        let txn_id = txn.transaction_id();

        let mut table = self.table.lock();
        self.txn_table.lock().insert(txn_id, txn.clone());
        txn.add_exclusive_lock(rid);

        let queue = table.entry(rid).or_insert_with(LockRequestQueue::new);
        queue.requests.push_back(LockRequest {
            txn_id,
            mode: LockMode::Exclusive,
            granted: false,
        });

        let (blocked, killed) = {
            let txn_table = self.txn_table.lock();
            Self::exclusive_blocked_ahead(&queue.requests, &txn_table, txn_id, true)
        };
        if !blocked {
            if let Some(req) = queue.requests.iter_mut().find(|r| r.txn_id == txn_id) {
                req.granted = true;
            }
        }
        if killed {
            queue.cv.notify_all();
        }

        while !table
            .get(&rid)
            .unwrap()
            .requests
            .iter()
            .any(|r| r.txn_id == txn_id && r.granted)
        {
            let queue = table.get_mut(&rid).unwrap();
            let is_next = {
                let txn_table = self.txn_table.lock();
                Self::exclusive_is_next(&queue.requests, &txn_table, txn_id)
            };
            if is_next {
                if let Some(req) = queue.requests.iter_mut().find(|r| r.txn_id == txn_id) {
                    req.granted = true;
                }
                break;
            }
            if txn.state() == TransactionState::Aborted {
                return Err(DbError::Deadlock(txn_id));
            }
            let cv = queue.cv.clone();
            cv.wait(&mut table);
            if txn.state() == TransactionState::Aborted {
                return Err(DbError::Deadlock(txn_id));
            }
        }

        debug!(txn_id, page_id = rid.page_id(), "exclusive lock granted");
        Ok(true)
    }

    pub fn lock_upgrade(&self, txn: &Arc<Transaction>, rid: Rid) -> DbResult<bool> {
        if txn.state() == TransactionState::Aborted {
            return Ok(false);
        }
        let txn_id = txn.transaction_id();

        let mut table = self.table.lock();
        self.txn_table.lock().insert(txn_id, txn.clone());
        {
            let queue = table.entry(rid).or_insert_with(LockRequestQueue::new);
            if queue.upgrading.is_some() {
                txn.set_state(TransactionState::Aborted);
                return Err(DbError::UpgradeConflict(txn_id));
            }
            queue.upgrading = Some(txn_id);
        }

        loop {
            let queue = table.get_mut(&rid).unwrap();
            let mut can_grant = true;
            let mut killed = false;
            let mut target_idx = None;
            {
                let txn_table = self.txn_table.lock();
                for (i, req) in queue.requests.iter().enumerate() {
                    if !req.granted {
                        break;
                    }
                    if req.txn_id == txn_id {
                        target_idx = Some(i);
                    } else if is_aborted(&txn_table, req.txn_id) {
                        continue;
                    } else if req.txn_id > txn_id {
                        wound(&txn_table, req.txn_id);
                        killed = true;
                    } else {
                        can_grant = false;
                    }
                }
            }

            if killed {
                queue.cv.notify_all();
            }
            if can_grant {
                let idx = target_idx.expect("upgrading transaction must hold a granted request");
                queue.requests[idx].mode = LockMode::Exclusive;
                queue.upgrading = None;
                break;
            }
            if txn.state() == TransactionState::Aborted {
                return Err(DbError::Deadlock(txn_id));
            }
            let cv = queue.cv.clone();
            cv.wait(&mut table);
            if txn.state() == TransactionState::Aborted {
                return Err(DbError::Deadlock(txn_id));
            }
        }

        txn.upgrade_lock(rid);
        debug!(txn_id, page_id = rid.page_id(), "lock upgraded to exclusive");
        Ok(true)
    }

    pub fn unlock(&self, txn: &Transaction, rid: Rid) -> bool {
        if txn.state() == TransactionState::Growing && txn.isolation_level() == IsolationLevel::RepeatableRead {
            txn.set_state(TransactionState::Shrinking);
        }

        let txn_id = txn.transaction_id();
        let mut table = self.table.lock();
        let found = if let Some(queue) = table.get_mut(&rid) {
            let before = queue.requests.len();
            queue.requests.retain(|r| r.txn_id != txn_id);
            let removed = queue.requests.len() != before;
            if removed {
                queue.cv.notify_all();
            }
            removed
        } else {
            false
        };

        txn.remove_shared_lock(&rid);
        txn.remove_exclusive_lock(&rid);
        found
    }
}
