//! Core identifiers and the transaction state machine.

use std::fmt;

/// Identifies a transaction. Assigned monotonically by the simulation
/// driver; never reused within a run.
pub type TxnId = u64;

/// Identifies a slot in the database buffer, `[0, n_slots)`. Signed so that
/// an out-of-range request (including negative indices) can be represented
/// and rejected uniformly.
pub type DataId = i64;

/// Locking mode requested or held on a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => write!(f, "shared"),
            LockMode::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// Lifecycle state of a transaction.
///
/// ```text
///         start_transaction
///    ∅ ────────────────────▶ Active
///                             │    │
///         submit_operation    │    │ acquire fails
///         (granted)      ◀────┤    ▼
///                             │  Blocked ──▶ (deadlock abort → RolledBack)
///                             │    │ unblock on queue grant
///                             │    ▼
///                             ├──▶ Active (resumes)
///                commit ─────▶│
///                             ▼
///                          Committed (terminal)
///                rollback ───▶ RolledBack (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Blocked,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::RolledBack)
    }
}

/// A single recorded write, kept for undo on rollback.
#[derive(Debug, Clone, Copy)]
pub struct Operation {
    pub data_id: DataId,
    pub old_value: i64,
    pub new_value: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn committed_and_rolled_back_are_terminal() {
        assert!(TransactionState::Committed.is_terminal());
        assert!(TransactionState::RolledBack.is_terminal());
        assert!(!TransactionState::Active.is_terminal());
        assert!(!TransactionState::Blocked.is_terminal());
    }
}
