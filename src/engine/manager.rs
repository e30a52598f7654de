//! Transaction manager: the coordinator between a transaction's lifecycle,
//! the lock manager, the DB buffer, and the write-ahead log.
//!
//! There are no OS threads and no async tasks here. A transaction that
//! cannot acquire a lock does not block a call stack; it records its
//! pending operation and returns to the driver with `Blocked` state. The
//! driver retries blocked transactions on a later cycle via
//! [`TransactionManager::resume_blocked`].

use std::collections::HashMap;

use log::info;

use crate::db::DbHandler;
use crate::error::Result;

use super::lock_manager::{AcquireResult, LockManager};
use super::log::LogRecord;
use super::recovery::RecoveryManager;
use super::types::{DataId, LockMode, Operation, TransactionState, TxnId};

struct TransactionRecord {
    state: TransactionState,
    operations: Vec<Operation>,
    /// Set when a write is blocked on a lock: the slot to retry once the
    /// lock manager grants it.
    pending_write: Option<DataId>,
}

impl TransactionRecord {
    fn new() -> Self {
        Self {
            state: TransactionState::Active,
            operations: Vec::new(),
            pending_write: None,
        }
    }

    fn operation_count(&self) -> usize {
        self.operations.len()
    }
}

pub struct TransactionManager {
    next_txn_id: TxnId,
    transactions: HashMap<TxnId, TransactionRecord>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_txn_id: 1,
            transactions: HashMap::new(),
        }
    }

    pub fn state_of(&self, txn_id: TxnId) -> Option<TransactionState> {
        self.transactions.get(&txn_id).map(|t| t.state)
    }

    pub fn active_txn_ids(&self) -> Vec<TxnId> {
        self.transactions
            .iter()
            .filter(|(_, t)| !t.state.is_terminal())
            .map(|(&id, _)| id)
            .collect()
    }

    /// Number of writes `txn_id` has successfully performed so far. Used by
    /// the driver to commit a transaction once it reaches `trans_size`.
    pub fn operation_count(&self, txn_id: TxnId) -> usize {
        self.transactions
            .get(&txn_id)
            .map(|t| t.operation_count())
            .unwrap_or(0)
    }

    /// Begin a new transaction: allocate an id, log `S`, and record it as
    /// `Active`.
    pub fn start_transaction(&mut self, wal: &mut RecoveryManager) -> Result<TxnId> {
        let txn_id = self.next_txn_id;
        self.next_txn_id += 1;
        wal.write(&LogRecord::Start { txn_id })?;
        self.transactions.insert(txn_id, TransactionRecord::new());
        info!("txn {} started", txn_id);
        Ok(txn_id)
    }

    /// Attempt a write on behalf of `txn_id` at `data_id`. Acquires an
    /// exclusive lock (via upgrade if the transaction already holds shared);
    /// if granted, derives `new_value` as the toggle of the slot's current
    /// value, performs the write, logs an `F` record, and records the
    /// operation for undo. If the lock is not yet available, transitions the
    /// transaction to `Blocked` and stashes the slot to retry later.
    pub fn submit_write(
        &mut self,
        txn_id: TxnId,
        data_id: DataId,
        locks: &mut LockManager,
        db: &mut DbHandler,
        wal: &mut RecoveryManager,
    ) -> Result<()> {
        match locks.acquire(txn_id, data_id, LockMode::Exclusive) {
            AcquireResult::Granted => self.perform_write(txn_id, data_id, db, wal),
            AcquireResult::Queued => {
                if let Some(record) = self.transactions.get_mut(&txn_id) {
                    record.state = TransactionState::Blocked;
                    record.pending_write = Some(data_id);
                }
                Ok(())
            }
        }
    }

    fn perform_write(
        &mut self,
        txn_id: TxnId,
        data_id: DataId,
        db: &mut DbHandler,
        wal: &mut RecoveryManager,
    ) -> Result<()> {
        let old_value = db.get(data_id).unwrap_or(0);
        let new_value = 1 - old_value;
        db.update(data_id, new_value);
        wal.write(&LogRecord::Write {
            txn_id,
            data_id,
            old_value,
            new_value,
        })?;
        if let Some(record) = self.transactions.get_mut(&txn_id) {
            record.state = TransactionState::Active;
            record.pending_write = None;
            record.operations.push(Operation {
                data_id,
                old_value,
                new_value,
            });
        }
        Ok(())
    }

    /// Retry every `Blocked` transaction's pending write. A transaction
    /// stays blocked until the lock manager is no longer tracking it as a
    /// waiter (i.e. it has been granted, possibly by [`LockManager::release_all`]
    /// promoting it on a previous cycle).
    pub fn resume_blocked(
        &mut self,
        locks: &mut LockManager,
        db: &mut DbHandler,
        wal: &mut RecoveryManager,
    ) -> Result<()> {
        let blocked: Vec<TxnId> = self
            .transactions
            .iter()
            .filter(|(_, t)| t.state == TransactionState::Blocked)
            .map(|(&id, _)| id)
            .collect();

        for txn_id in blocked {
            if locks.is_blocked(txn_id) {
                continue;
            }
            let pending = self.transactions.get(&txn_id).and_then(|t| t.pending_write);
            if let Some(data_id) = pending {
                self.perform_write(txn_id, data_id, db, wal)?;
            }
        }
        Ok(())
    }

    /// Commit: log `C`, release every lock the transaction holds, and
    /// transition to `Committed`.
    pub fn commit_transaction(
        &mut self,
        txn_id: TxnId,
        locks: &mut LockManager,
        wal: &mut RecoveryManager,
    ) -> Result<()> {
        wal.write(&LogRecord::Commit { txn_id })?;
        locks.release_all(txn_id);
        if let Some(record) = self.transactions.get_mut(&txn_id) {
            record.state = TransactionState::Committed;
        }
        info!("txn {} committed", txn_id);
        Ok(())
    }

    /// Roll back: undo recorded operations in reverse order, log `R`,
    /// release every lock, and transition to `RolledBack`.
    pub fn rollback_transaction(
        &mut self,
        txn_id: TxnId,
        locks: &mut LockManager,
        db: &mut DbHandler,
        wal: &mut RecoveryManager,
    ) -> Result<()> {
        self.undo_and_finish(txn_id, db, wal)?;
        locks.release_all(txn_id);
        Ok(())
    }

    /// Finish a transaction the lock manager has already aborted as a
    /// deadlock victim: its locks are already released, so this only needs
    /// to undo its writes and log `R`.
    pub fn finish_deadlock_victim(
        &mut self,
        txn_id: TxnId,
        db: &mut DbHandler,
        wal: &mut RecoveryManager,
    ) -> Result<()> {
        self.undo_and_finish(txn_id, db, wal)
    }

    fn undo_and_finish(&mut self, txn_id: TxnId, db: &mut DbHandler, wal: &mut RecoveryManager) -> Result<()> {
        if let Some(record) = self.transactions.get_mut(&txn_id) {
            for op in record.operations.iter().rev() {
                db.set_unchecked(op.data_id, op.old_value);
            }
            record.state = TransactionState::RolledBack;
            record.pending_write = None;
        }
        wal.write(&LogRecord::Rollback { txn_id })?;
        info!("txn {} rolled back", txn_id);
        Ok(())
    }
}
