//! The simulation driver: a deterministic, single-threaded cycle loop.
//!
//! Each cycle runs, in order: recovery is a one-time step before the loop
//! starts, then per cycle: maybe start a new transaction, let every active
//! transaction that has reached `trans_size` commit (otherwise roll a
//! write/rollback/no-op), retry blocked transactions, advance the deadlock
//! timeout clock and abort any transaction that has timed out, and flush the
//! WAL and DB buffer together once the WAL's write count reaches the flush
//! threshold. There are no threads and no suspension points; a "blocked"
//! transaction is just a flag checked again on the next cycle.

use log::info;
use rand::rngs::ThreadRng;
use rand::Rng;

use crate::config::SimulationConfig;
use crate::db::DbHandler;
use crate::error::Result;

use super::lock_manager::LockManager;
use super::manager::TransactionManager;
use super::recovery::RecoveryManager;
use super::types::TransactionState;

/// What an active transaction does on a given cycle.
enum Action {
    Write,
    Rollback,
    Noop,
}

pub struct Simulation {
    config: SimulationConfig,
    db: DbHandler,
    locks: LockManager,
    wal: RecoveryManager,
    txns: TransactionManager,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        let locks = LockManager::new(config.timeout_cycles);
        let mut db = DbHandler::new(&config);
        db.load();
        let wal = RecoveryManager::new(&config);
        let txns = TransactionManager::new();
        Self {
            config,
            db,
            locks,
            wal,
            txns,
        }
    }

    /// Replay the WAL against the loaded DB buffer. Every run is
    /// self-recovering: this must run once, before the cycle loop, whether
    /// or not the previous run crashed.
    pub fn recover(&mut self) -> Result<()> {
        self.wal.recover(&mut self.db)
    }

    /// Run the configured number of cycles, then resolve the run's end
    /// state: graceful shutdown flushes and rolls back every still-active
    /// transaction; otherwise the run ends mid-flight, simulating a crash,
    /// and leaves recovery to the next run's [`Simulation::recover`] call.
    pub fn run(&mut self) -> Result<()> {
        let mut rng = rand::thread_rng();
        for cycle in 0..self.config.cycles {
            self.run_cycle(cycle, &mut rng)?;
        }

        if self.config.graceful_shutdown {
            self.shutdown_gracefully()?;
        }

        let stats = self.locks.stats();
        info!(
            "simulation finished after {} cycles: {} granted, {} queued, {} aborted",
            self.config.cycles, stats.granted, stats.queued, stats.aborted
        );
        Ok(())
    }

    fn run_cycle(&mut self, _cycle: u64, rng: &mut ThreadRng) -> Result<()> {
        if rng.gen_bool(self.config.start_prob) {
            self.txns.start_transaction(&mut self.wal)?;
        }

        for txn_id in self.txns.active_txn_ids() {
            if self.txns.state_of(txn_id) == Some(TransactionState::Blocked) {
                continue;
            }
            if self.txns.operation_count(txn_id) as u32 >= self.config.trans_size {
                self.txns.commit_transaction(txn_id, &mut self.locks, &mut self.wal)?;
                continue;
            }
            match self.roll_action(rng) {
                Action::Write => {
                    let data_id = rng.gen_range(0..self.config.n_slots as i64);
                    self.txns
                        .submit_write(txn_id, data_id, &mut self.locks, &mut self.db, &mut self.wal)?;
                }
                Action::Rollback => {
                    self.txns
                        .rollback_transaction(txn_id, &mut self.locks, &mut self.db, &mut self.wal)?;
                }
                Action::Noop => {}
            }
        }

        self.txns.resume_blocked(&mut self.locks, &mut self.db, &mut self.wal)?;

        self.locks.tick();
        for txn_id in self.locks.check_deadlocks() {
            self.txns.finish_deadlock_victim(txn_id, &mut self.db, &mut self.wal)?;
        }

        if self.wal.write_count() >= self.config.flush_threshold {
            self.wal.flush_logs()?;
            self.db.flush()?;
        }
        Ok(())
    }

    fn roll_action(&self, rng: &mut ThreadRng) -> Action {
        let roll: f64 = rng.gen();
        if roll < self.config.write_prob {
            Action::Write
        } else if roll < self.config.write_prob + self.config.rollback_prob {
            Action::Rollback
        } else {
            Action::Noop
        }
    }

    fn shutdown_gracefully(&mut self) -> Result<()> {
        for txn_id in self.txns.active_txn_ids() {
            self.txns
                .rollback_transaction(txn_id, &mut self.locks, &mut self.db, &mut self.wal)?;
        }
        self.db.flush()?;
        self.wal.truncate()?;
        info!("graceful shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_at(dir: &std::path::Path) -> SimulationConfig {
        SimulationConfig {
            db_path: dir.join("db"),
            log_path: dir.join("log.csv"),
            log_file_path: dir.join("adbsim.log"),
            cycles: 20,
            trans_size: 3,
            start_prob: 0.5,
            write_prob: 0.5,
            rollback_prob: 0.1,
            timeout_cycles: 3,
            n_slots: 8,
            flush_threshold: 5,
            graceful_shutdown: false,
        }
    }

    #[test]
    fn run_completes_without_error_and_recovers_afterward() {
        let dir = tempdir().unwrap();
        let config = config_at(dir.path());
        let mut sim = Simulation::new(config.clone());
        sim.recover().unwrap();
        sim.run().unwrap();

        // A fresh simulation over the same files must recover cleanly.
        let mut sim2 = Simulation::new(config);
        sim2.recover().unwrap();
    }

    #[test]
    fn graceful_shutdown_leaves_no_active_transactions() {
        let dir = tempdir().unwrap();
        let mut config = config_at(dir.path());
        config.graceful_shutdown = true;
        let mut sim = Simulation::new(config);
        sim.recover().unwrap();
        sim.run().unwrap();
        assert!(sim.txns.active_txn_ids().is_empty());
    }

    #[test]
    fn transaction_auto_commits_once_it_reaches_trans_size() {
        let dir = tempdir().unwrap();
        let mut config = config_at(dir.path());
        config.trans_size = 2;
        let mut sim = Simulation::new(config);
        sim.recover().unwrap();

        let txn = sim.txns.start_transaction(&mut sim.wal).unwrap();
        sim.txns
            .submit_write(txn, 0, &mut sim.locks, &mut sim.db, &mut sim.wal)
            .unwrap();
        sim.txns
            .submit_write(txn, 1, &mut sim.locks, &mut sim.db, &mut sim.wal)
            .unwrap();
        assert_eq!(sim.txns.operation_count(txn), 2);
        assert_eq!(sim.txns.state_of(txn), Some(TransactionState::Active));

        let mut rng = rand::thread_rng();
        sim.run_cycle(0, &mut rng).unwrap();

        assert_eq!(sim.txns.state_of(txn), Some(TransactionState::Committed));
    }

    #[test]
    fn combined_flush_is_driven_by_wal_write_count_not_elapsed_cycles() {
        let dir = tempdir().unwrap();
        let mut config = config_at(dir.path());
        config.start_prob = 0.0;
        config.write_prob = 0.0;
        config.rollback_prob = 0.0;
        config.flush_threshold = 2;
        let mut sim = Simulation::new(config);
        sim.recover().unwrap();

        let txn = sim.txns.start_transaction(&mut sim.wal).unwrap();
        sim.txns
            .submit_write(txn, 0, &mut sim.locks, &mut sim.db, &mut sim.wal)
            .unwrap();
        sim.txns
            .submit_write(txn, 1, &mut sim.locks, &mut sim.db, &mut sim.wal)
            .unwrap();
        assert!(sim.wal.write_count() >= 2);
        assert!(!sim.config.db_path.exists());

        let mut rng = rand::thread_rng();
        sim.run_cycle(0, &mut rng).unwrap();

        assert_eq!(sim.wal.write_count(), 0);
        assert!(sim.config.db_path.exists(), "reaching the write-count threshold must flush the DB too");
    }
}
