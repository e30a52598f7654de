//! Concurrency control and crash recovery core: lock manager, write-ahead
//! log, transaction manager, and the simulation driver that ties them
//! together.

pub mod driver;
pub mod lock_manager;
pub mod log;
pub mod manager;
pub mod recovery;
pub mod types;

pub use driver::Simulation;
pub use lock_manager::{AcquireResult, LockManager, LockManagerStats};
pub use log::LogRecord;
pub use manager::TransactionManager;
pub use recovery::RecoveryManager;
pub use types::{DataId, LockMode, Operation, TransactionState, TxnId};
