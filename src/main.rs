//! adbsim - simulates strict two-phase locking and crash recovery over a
//! fixed-width bit database.
//!
//! Usage:
//!   adbsim [--graceful-shutdown] <cycles> <trans_size> <start_prob> <write_prob> <rollback_prob> <timeout_cycles>
//!
//! Every run begins by replaying `log.csv` against `db` (self-recovering),
//! then drives `cycles` iterations of the workload described by the
//! remaining arguments. Without `--graceful-shutdown` the run ends mid-flight
//! on purpose, simulating a crash, so the next invocation exercises recovery.

use std::process::ExitCode;

use adbsim::{SimError, Simulation, SimulationConfig};
use flexi_logger::{Age, Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming};
use log::error;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config = match SimulationConfig::from_args(&args) {
        Ok(config) => config,
        Err(SimError::InvalidInput(msg)) => {
            eprintln!("adbsim: {}", msg);
            eprintln!(
                "usage: adbsim [--graceful-shutdown] <cycles> <trans_size> <start_prob> <write_prob> <rollback_prob> <timeout_cycles>"
            );
            return ExitCode::from(2);
        }
        Err(e) => {
            eprintln!("adbsim: {}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = init_logging(&config) {
        eprintln!("adbsim: failed to initialize logging: {}", e);
        return ExitCode::from(1);
    }

    let mut simulation = Simulation::new(config);
    if let Err(e) = simulation.recover() {
        error!("recovery failed: {}", e);
        return ExitCode::from(1);
    }
    if let Err(e) = simulation.run() {
        error!("simulation run failed: {}", e);
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

fn init_logging(config: &SimulationConfig) -> Result<(), flexi_logger::FlexiLoggerError> {
    let file_spec = FileSpec::try_from(&config.log_file_path)?;
    Logger::try_with_str("debug")?
        .log_to_file(file_spec)
        .duplicate_to_stderr(Duplicate::Info)
        .append()
        .rotate(Criterion::Age(Age::Day), Naming::Timestamps, Cleanup::KeepLogFiles(7))
        .start()?;
    Ok(())
}
