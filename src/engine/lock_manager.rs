//! Strict two-phase locking over the fixed slot space.
//!
//! Each slot has at most one [`LockEntry`]: either a set of shared holders or
//! a single exclusive holder. A transaction that cannot be granted a lock is
//! appended to that slot's FIFO wait queue. Anti-starvation rule: a shared
//! request may jump ahead of other queued shared requests only if the queue
//! has no waiting exclusive request ahead of it — in practice this means we
//! never let a shared grant skip past an earlier-queued exclusive waiter.

use std::collections::{HashMap, HashSet, VecDeque};

use log::{debug, info, warn};

use super::types::{DataId, LockMode, TxnId};

#[derive(Debug, Clone)]
struct LockEntry {
    mode: LockMode,
    holders: HashSet<TxnId>,
}

impl LockEntry {
    fn shared(txn_id: TxnId) -> Self {
        let mut holders = HashSet::new();
        holders.insert(txn_id);
        Self {
            mode: LockMode::Shared,
            holders,
        }
    }

    fn exclusive(txn_id: TxnId) -> Self {
        let mut holders = HashSet::new();
        holders.insert(txn_id);
        Self {
            mode: LockMode::Exclusive,
            holders,
        }
    }
}

/// Outcome of a lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// The lock was granted immediately (including upgrades and re-entrant
    /// grants to a slot the transaction already holds).
    Granted,
    /// The transaction was appended to the wait queue and must retry later.
    Queued,
}

/// Running counters, kept for observability. Not consulted by any decision
/// in the manager itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockManagerStats {
    pub granted: u64,
    pub queued: u64,
    pub aborted: u64,
}

#[derive(Debug, Clone, Copy)]
struct WaitRequest {
    txn_id: TxnId,
    mode: LockMode,
}

pub struct LockManager {
    table: HashMap<DataId, LockEntry>,
    wait_queues: HashMap<DataId, VecDeque<WaitRequest>>,
    /// Number of consecutive deadlock-check ticks each blocked transaction
    /// has remained blocked. Reset to zero whenever the transaction is
    /// granted a lock or starts a fresh wait.
    wait_cycles: HashMap<TxnId, u64>,
    timeout_cycles: u64,
    stats: LockManagerStats,
}

impl LockManager {
    pub fn new(timeout_cycles: u64) -> Self {
        Self {
            table: HashMap::new(),
            wait_queues: HashMap::new(),
            wait_cycles: HashMap::new(),
            timeout_cycles,
            stats: LockManagerStats::default(),
        }
    }

    pub fn stats(&self) -> LockManagerStats {
        self.stats
    }

    /// Attempt to acquire `mode` on `data_id` for `txn_id`.
    ///
    /// Grants immediately when:
    /// - the slot is unlocked,
    /// - `txn_id` is the sole holder and the request is an upgrade or a
    ///   repeat of its own lock,
    /// - the request is shared and the current holders are all shared and
    ///   the wait queue for this slot is empty (no exclusive waiter ahead).
    ///
    /// Otherwise the transaction is enqueued and `Queued` is returned.
    pub fn acquire(&mut self, txn_id: TxnId, data_id: DataId, mode: LockMode) -> AcquireResult {
        if let Some(entry) = self.table.get_mut(&data_id) {
            if entry.holders.contains(&txn_id) {
                if entry.mode == LockMode::Exclusive || mode == LockMode::Shared {
                    self.grant(txn_id);
                    return AcquireResult::Granted;
                }
                // Upgrade shared -> exclusive: only legal if sole holder.
                if entry.holders.len() == 1 {
                    entry.mode = LockMode::Exclusive;
                    debug!("txn {} upgraded lock on slot {} to exclusive", txn_id, data_id);
                    self.grant(txn_id);
                    return AcquireResult::Granted;
                }
                self.enqueue(txn_id, data_id, mode);
                return AcquireResult::Queued;
            }

            let queue_has_waiters = self
                .wait_queues
                .get(&data_id)
                .map(|q| !q.is_empty())
                .unwrap_or(false);

            if mode == LockMode::Shared && entry.mode == LockMode::Shared && !queue_has_waiters {
                entry.holders.insert(txn_id);
                self.grant(txn_id);
                return AcquireResult::Granted;
            }

            self.enqueue(txn_id, data_id, mode);
            return AcquireResult::Queued;
        }

        let entry = match mode {
            LockMode::Shared => LockEntry::shared(txn_id),
            LockMode::Exclusive => LockEntry::exclusive(txn_id),
        };
        self.table.insert(data_id, entry);
        self.grant(txn_id);
        AcquireResult::Granted
    }

    fn enqueue(&mut self, txn_id: TxnId, data_id: DataId, mode: LockMode) {
        let queue = self.wait_queues.entry(data_id).or_default();
        if !queue.iter().any(|r| r.txn_id == txn_id) {
            queue.push_back(WaitRequest { txn_id, mode });
        }
        self.wait_cycles.entry(txn_id).or_insert(0);
        self.stats.queued += 1;
        debug!("txn {} queued for slot {} ({})", txn_id, data_id, mode);
    }

    fn grant(&mut self, txn_id: TxnId) {
        self.wait_cycles.remove(&txn_id);
        self.stats.granted += 1;
    }

    /// Release every lock `txn_id` holds and purge it from every wait queue,
    /// then promote whichever waiters are now grantable. Called on commit,
    /// rollback, and deadlock abort.
    pub fn release_all(&mut self, txn_id: TxnId) {
        let held_slots: Vec<DataId> = self
            .table
            .iter()
            .filter(|(_, entry)| entry.holders.contains(&txn_id))
            .map(|(data_id, _)| *data_id)
            .collect();

        for data_id in &held_slots {
            if let Some(entry) = self.table.get_mut(data_id) {
                entry.holders.remove(&txn_id);
                if entry.holders.is_empty() {
                    self.table.remove(data_id);
                }
            }
        }

        for queue in self.wait_queues.values_mut() {
            queue.retain(|r| r.txn_id != txn_id);
        }
        self.wait_cycles.remove(&txn_id);

        let affected: Vec<DataId> = held_slots
            .into_iter()
            .chain(self.wait_queues.keys().copied())
            .collect();
        for data_id in affected {
            self.promote_waiters(data_id);
        }
    }

    /// Grant as many queued requests on `data_id` as are currently
    /// compatible, preserving FIFO order: stop at the first waiter that
    /// cannot yet be granted so a later-queued shared waiter never leapfrogs
    /// an earlier exclusive one.
    fn promote_waiters(&mut self, data_id: DataId) {
        loop {
            let Some(queue) = self.wait_queues.get(&data_id) else {
                return;
            };
            let Some(next) = queue.front().copied() else {
                self.wait_queues.remove(&data_id);
                return;
            };

            let can_grant = match self.table.get(&data_id) {
                None => true,
                Some(entry) => match (entry.mode, next.mode) {
                    (LockMode::Shared, LockMode::Shared) => true,
                    _ => false,
                },
            };

            if !can_grant {
                return;
            }

            let queue = self.wait_queues.get_mut(&data_id).unwrap();
            queue.pop_front();

            match self.table.get_mut(&data_id) {
                Some(entry) => {
                    entry.holders.insert(next.txn_id);
                }
                None => {
                    let entry = match next.mode {
                        LockMode::Shared => LockEntry::shared(next.txn_id),
                        LockMode::Exclusive => LockEntry::exclusive(next.txn_id),
                    };
                    self.table.insert(data_id, entry);
                }
            }
            info!("txn {} promoted to {} lock on slot {}", next.txn_id, next.mode, data_id);
            self.grant(next.txn_id);
        }
    }

    /// Advance the wait-cycle counter for every currently blocked
    /// transaction. Call once per simulation cycle, before
    /// [`LockManager::check_deadlocks`].
    pub fn tick(&mut self) {
        for count in self.wait_cycles.values_mut() {
            *count += 1;
        }
    }

    /// Returns the transaction ids that have been blocked for at least
    /// `timeout_cycles` consecutive ticks, releasing their locks and
    /// removing them from all wait queues. The caller (the transaction
    /// manager) is responsible for the undo pass, the `R` log record, and
    /// the state transition to `RolledBack`.
    pub fn check_deadlocks(&mut self) -> Vec<TxnId> {
        let victims: Vec<TxnId> = self
            .wait_cycles
            .iter()
            .filter(|(_, &count)| count >= self.timeout_cycles)
            .map(|(&txn_id, _)| txn_id)
            .collect();

        for &txn_id in &victims {
            warn!(
                "txn {} aborted as deadlock victim after {} cycles blocked",
                txn_id, self.timeout_cycles
            );
            self.stats.aborted += 1;
            self.release_all(txn_id);
        }
        victims
    }

    pub fn is_blocked(&self, txn_id: TxnId) -> bool {
        self.wait_cycles.contains_key(&txn_id)
    }
}
