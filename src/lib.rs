//! adbsim - a simulation of the concurrency-control and crash-recovery core
//! of a small transactional key-value store.
//!
//! Architecture:
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Simulation Driver                         │
//! │      (per-cycle workload: start / write / rollback)         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                    ┌─────────┴─────────┐
//!                    ▼                   ▼
//! ┌──────────────────────────┐ ┌────────────────────────────────┐
//! │   Transaction Manager    │ │        Lock Manager            │
//! │  (states, undo, commit)  │ │  (S2PL, wait queues, timeout)  │
//! └──────────────────────────┘ └────────────────────────────────┘
//!                    │
//!          ┌─────────┴─────────┐
//!          ▼                   ▼
//! ┌──────────────────┐ ┌────────────────────┐
//! │  Recovery Manager │ │     DB Handler     │
//! │  (WAL, redo-only) │ │  (fixed bit buffer)│
//! └──────────────────┘ └────────────────────┘
//! ```

pub mod config;
pub mod db;
pub mod engine;
pub mod error;

pub use config::SimulationConfig;
pub use db::DbHandler;
pub use engine::Simulation;
pub use error::{Result, SimError};
