//! Integration tests driving the full concurrency-control and recovery
//! stack through its public surface, using real temp-directory files.

use adbsim::config::SimulationConfig;
use adbsim::db::DbHandler;
use adbsim::engine::{LockManager, LockMode, LogRecord, RecoveryManager, Simulation, TransactionManager, TransactionState};
use tempfile::tempdir;

fn config_in(dir: &std::path::Path) -> SimulationConfig {
    SimulationConfig {
        db_path: dir.join("db"),
        log_path: dir.join("log.csv"),
        log_file_path: dir.join("adbsim.log"),
        n_slots: 8,
        flush_threshold: 25,
        timeout_cycles: 3,
        ..SimulationConfig::default()
    }
}

#[test]
fn toggling_a_slot_twice_round_trips_through_commit() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    let mut locks = LockManager::new(config.timeout_cycles);
    let mut db = DbHandler::new(&config);
    db.load();
    let mut wal = RecoveryManager::new(&config);
    let mut txns = TransactionManager::new();

    let txn = txns.start_transaction(&mut wal).unwrap();
    txns.submit_write(txn, 3, &mut locks, &mut db, &mut wal).unwrap();
    txns.submit_write(txn, 3, &mut locks, &mut db, &mut wal).unwrap();
    txns.commit_transaction(txn, &mut locks, &mut wal).unwrap();

    assert_eq!(db.get(3), Some(0));
}

#[test]
fn two_transactions_deadlocked_on_each_others_slot_produce_one_victim() {
    let dir = tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.timeout_cycles = 2;
    let mut locks = LockManager::new(config.timeout_cycles);
    let mut db = DbHandler::new(&config);
    db.load();
    let mut wal = RecoveryManager::new(&config);
    let mut txns = TransactionManager::new();

    let txn1 = txns.start_transaction(&mut wal).unwrap();
    let txn2 = txns.start_transaction(&mut wal).unwrap();

    // txn1 takes slot 0, txn2 takes slot 1.
    txns.submit_write(txn1, 0, &mut locks, &mut db, &mut wal).unwrap();
    txns.submit_write(txn2, 1, &mut locks, &mut db, &mut wal).unwrap();

    // txn2 blocks on slot 0 one tick before txn1 blocks on slot 1, so the
    // two waits cross the timeout on different cycles.
    txns.submit_write(txn2, 0, &mut locks, &mut db, &mut wal).unwrap();
    locks.tick();
    txns.submit_write(txn1, 1, &mut locks, &mut db, &mut wal).unwrap();

    assert_eq!(txns.state_of(txn1), Some(TransactionState::Blocked));
    assert_eq!(txns.state_of(txn2), Some(TransactionState::Blocked));

    locks.tick();
    let victims = locks.check_deadlocks();
    assert_eq!(victims, vec![txn2], "txn2 crossed the timeout a cycle earlier than txn1");

    for txn_id in &victims {
        txns.finish_deadlock_victim(*txn_id, &mut db, &mut wal).unwrap();
    }

    // Releasing txn2's locks frees slot 1 for txn1, which can now proceed
    // and commit.
    txns.resume_blocked(&mut locks, &mut db, &mut wal).unwrap();
    assert_eq!(txns.state_of(txn1), Some(TransactionState::Active));
    txns.commit_transaction(txn1, &mut locks, &mut wal).unwrap();
    assert_eq!(txns.state_of(txn1), Some(TransactionState::Committed));
}

#[test]
fn shared_lock_upgrade_succeeds_for_sole_holder() {
    let mut locks = LockManager::new(5);
    use adbsim::engine::AcquireResult;
    assert_eq!(locks.acquire(1, 0, LockMode::Shared), AcquireResult::Granted);
    assert_eq!(locks.acquire(1, 0, LockMode::Exclusive), AcquireResult::Granted);
}

#[test]
fn rollback_then_recovery_never_replays_the_uncommitted_write() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    let mut locks = LockManager::new(config.timeout_cycles);
    let mut db = DbHandler::new(&config);
    db.load();
    let mut wal = RecoveryManager::new(&config);
    let mut txns = TransactionManager::new();

    let txn = txns.start_transaction(&mut wal).unwrap();
    txns.submit_write(txn, 5, &mut locks, &mut db, &mut wal).unwrap();
    txns.rollback_transaction(txn, &mut locks, &mut db, &mut wal).unwrap();
    db.flush().unwrap();

    // Fresh handles, as if the process restarted.
    let mut db2 = DbHandler::new(&config);
    db2.load();
    let wal2 = RecoveryManager::new(&config);
    wal2.recover(&mut db2).unwrap();

    assert_eq!(db2.get(5), Some(0));

    let records = wal2.read_all().unwrap();
    assert!(records.iter().any(|r| matches!(r, LogRecord::Rollback { txn_id } if *txn_id == txn)));
}

#[test]
fn committed_write_survives_recovery_after_a_simulated_crash() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    let mut locks = LockManager::new(config.timeout_cycles);
    let mut db = DbHandler::new(&config);
    db.load();
    let mut wal = RecoveryManager::new(&config);
    let mut txns = TransactionManager::new();

    let committed = txns.start_transaction(&mut wal).unwrap();
    txns.submit_write(committed, 2, &mut locks, &mut db, &mut wal).unwrap();
    txns.commit_transaction(committed, &mut locks, &mut wal).unwrap();

    // A second transaction starts a write but the process "crashes" before
    // it commits or rolls back: no R or C record is ever written for it.
    let crashed = txns.start_transaction(&mut wal).unwrap();
    txns.submit_write(crashed, 4, &mut locks, &mut db, &mut wal).unwrap();

    // No explicit db.flush(): recovery must reconstruct slot 2 from the WAL
    // regardless of whether the DB file already reflects it.
    let mut fresh_db = DbHandler::new(&config);
    fresh_db.load();
    let fresh_wal = RecoveryManager::new(&config);
    fresh_wal.recover(&mut fresh_db).unwrap();

    assert_eq!(fresh_db.get(2), Some(1));
    assert_eq!(fresh_db.get(4), Some(0));
}

#[test]
fn auto_flush_triggers_at_the_configured_write_threshold() {
    let dir = tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.flush_threshold = 3;
    let mut db = DbHandler::new(&config);
    db.load();

    db.update(0, 1);
    db.update(1, 1);
    assert!(!config.db_path.exists());
    db.update(2, 1);
    assert!(config.db_path.exists(), "db file should exist after hitting the flush threshold");
}

#[test]
fn full_simulation_run_leaves_no_active_transactions_when_graceful() {
    let dir = tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.cycles = 40;
    config.start_prob = 0.6;
    config.write_prob = 0.6;
    config.rollback_prob = 0.1;
    config.graceful_shutdown = true;

    let mut sim = Simulation::new(config);
    sim.recover().unwrap();
    sim.run().unwrap();
}
