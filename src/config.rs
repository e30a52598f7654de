//! Runtime configuration for a single simulation run.
//!
//! `SimulationConfig` is the typed, validated form of the CLI surface: the
//! workload parameters a user supplies, plus the fixed engineering constants
//! (slot count, flush threshold, file paths) that the core treats as
//! defaults rather than command-line knobs. It is built once at startup and
//! handed out by reference; nothing mutates it afterward.

use std::path::PathBuf;

use crate::error::{Result, SimError};

/// Number of data slots in the simulated database.
pub const N_SLOTS: usize = 32;

/// Number of successful writes (or log records) between automatic flushes.
pub const FLUSH_THRESHOLD: u64 = 25;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Number of logical cycles to run before stopping.
    pub cycles: u64,
    /// Maximum number of write operations a transaction issues before it
    /// commits on its own.
    pub trans_size: u32,
    /// Probability per cycle of starting a new transaction.
    pub start_prob: f64,
    /// Probability per cycle of an active transaction issuing a write.
    pub write_prob: f64,
    /// Probability per cycle of an active transaction rolling back.
    pub rollback_prob: f64,
    /// Number of cycles a transaction may remain blocked before the lock
    /// manager aborts it as a deadlock victim.
    pub timeout_cycles: u64,
    /// Number of slots in the database buffer.
    pub n_slots: usize,
    /// Writes between automatic flushes of the WAL and the DB file.
    pub flush_threshold: u64,
    /// Path to the durable DB file.
    pub db_path: PathBuf,
    /// Path to the write-ahead log.
    pub log_path: PathBuf,
    /// Path to the rotating adbsim log file.
    pub log_file_path: PathBuf,
    /// If set, the driver flushes and rolls back all active transactions at
    /// the end of the run instead of simulating a crash.
    pub graceful_shutdown: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            cycles: 100,
            trans_size: 5,
            start_prob: 0.3,
            write_prob: 0.5,
            rollback_prob: 0.1,
            timeout_cycles: 5,
            n_slots: N_SLOTS,
            flush_threshold: FLUSH_THRESHOLD,
            db_path: PathBuf::from("db"),
            log_path: PathBuf::from("log.csv"),
            log_file_path: PathBuf::from("adbsim.log"),
            graceful_shutdown: false,
        }
    }
}

impl SimulationConfig {
    /// Parse the six positional workload parameters plus the optional
    /// `--graceful-shutdown` flag from a raw argument list (as would come
    /// from `std::env::args().collect::<Vec<_>>()`, `argv[0]` included).
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut positional: Vec<&String> = Vec::new();
        let mut graceful_shutdown = false;

        for arg in args.iter().skip(1) {
            match arg.as_str() {
                "--graceful-shutdown" => graceful_shutdown = true,
                _ => positional.push(arg),
            }
        }

        if positional.len() != 6 {
            return Err(SimError::InvalidInput(format!(
                "expected 6 positional arguments (cycles trans_size start_prob write_prob rollback_prob timeout), got {}",
                positional.len()
            )));
        }

        let cycles = parse_field(positional[0], "cycles")?;
        let trans_size = parse_field(positional[1], "trans_size")?;
        let start_prob = parse_field(positional[2], "start_prob")?;
        let write_prob = parse_field(positional[3], "write_prob")?;
        let rollback_prob = parse_field(positional[4], "rollback_prob")?;
        let timeout_cycles = parse_field(positional[5], "timeout")?;

        let config = Self {
            cycles,
            trans_size,
            start_prob,
            write_prob,
            rollback_prob,
            timeout_cycles,
            graceful_shutdown,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the workload parameters per the CLI contract: `cycles` and
    /// `trans_size` must be positive, all probabilities must lie in
    /// `[0, 1]`, and `write_prob + rollback_prob` must not exceed `1`.
    pub fn validate(&self) -> Result<()> {
        if self.cycles == 0 {
            return Err(SimError::InvalidInput("cycles must be > 0".to_string()));
        }
        if self.trans_size == 0 {
            return Err(SimError::InvalidInput("trans_size must be > 0".to_string()));
        }
        for (name, value) in [
            ("start_prob", self.start_prob),
            ("write_prob", self.write_prob),
            ("rollback_prob", self.rollback_prob),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SimError::InvalidInput(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.write_prob + self.rollback_prob > 1.0 {
            return Err(SimError::InvalidInput(format!(
                "write_prob + rollback_prob must be <= 1, got {}",
                self.write_prob + self.rollback_prob
            )));
        }
        Ok(())
    }
}

fn parse_field<T: std::str::FromStr>(raw: &str, name: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| SimError::InvalidInput(format!("invalid {}: '{}'", name, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(rest: &[&str]) -> Vec<String> {
        std::iter::once("adbsim".to_string())
            .chain(rest.iter().map(|s| s.to_string()))
            .collect()
    }

    #[test]
    fn parses_valid_positional_args() {
        let config = SimulationConfig::from_args(&args(&["100", "5", "0.3", "0.5", "0.1", "5"])).unwrap();
        assert_eq!(config.cycles, 100);
        assert_eq!(config.trans_size, 5);
        assert_eq!(config.timeout_cycles, 5);
        assert!(!config.graceful_shutdown);
    }

    #[test]
    fn recognizes_graceful_shutdown_flag_anywhere() {
        let config = SimulationConfig::from_args(&args(&[
            "--graceful-shutdown",
            "100",
            "5",
            "0.3",
            "0.5",
            "0.1",
            "5",
        ]))
        .unwrap();
        assert!(config.graceful_shutdown);
    }

    #[test]
    fn rejects_wrong_arity() {
        let err = SimulationConfig::from_args(&args(&["100", "5"])).unwrap_err();
        assert!(matches!(err, SimError::InvalidInput(_)));
    }

    #[test]
    fn rejects_zero_cycles() {
        let err = SimulationConfig::from_args(&args(&["0", "5", "0.3", "0.5", "0.1", "5"])).unwrap_err();
        assert!(matches!(err, SimError::InvalidInput(_)));
    }

    #[test]
    fn rejects_probability_sum_over_one() {
        let err = SimulationConfig::from_args(&args(&["100", "5", "0.3", "0.7", "0.5", "5"])).unwrap_err();
        assert!(matches!(err, SimError::InvalidInput(_)));
    }

    #[test]
    fn rejects_out_of_range_probability() {
        let err = SimulationConfig::from_args(&args(&["100", "5", "1.5", "0.5", "0.1", "5"])).unwrap_err();
        assert!(matches!(err, SimError::InvalidInput(_)));
    }
}
