//! DBHandler — the durable fixed-width bit buffer.
//!
//! Owns the in-memory database buffer and its on-disk form: a single line
//! of N comma-separated decimal integers. This is deliberately the
//! simplest component in the core; the Transaction Manager mutates the
//! buffer directly, so `update` only needs to bounds-check and count writes
//! toward the next flush.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::config::SimulationConfig;
use crate::error::Result;

pub struct DbHandler {
    path: PathBuf,
    n_slots: usize,
    flush_threshold: u64,
    buffer: Vec<i64>,
    write_count: u64,
}

impl DbHandler {
    /// Create a handler with an all-zero buffer; call [`DbHandler::load`]
    /// to populate it from disk.
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            path: config.db_path.clone(),
            n_slots: config.n_slots,
            flush_threshold: config.flush_threshold,
            buffer: vec![0; config.n_slots],
            write_count: 0,
        }
    }

    /// Read the DB file into the buffer. Never fails to the caller: a
    /// missing file, an empty file, or a parse error all fall back to a
    /// zeroed buffer, logged at WARN.
    pub fn load(&mut self) {
        match self.try_load() {
            Ok(Some(buffer)) => {
                self.buffer = buffer;
                info!("Database loaded from {}", self.path.display());
            }
            Ok(None) => {
                warn!(
                    "Database file {} missing or empty; initializing with default values",
                    self.path.display()
                );
                self.buffer = vec![0; self.n_slots];
            }
            Err(e) => {
                warn!(
                    "Invalid database file {}: {}; initializing with default values",
                    self.path.display(),
                    e
                );
                self.buffer = vec![0; self.n_slots];
            }
        }
    }

    fn try_load(&self) -> Result<Option<Vec<i64>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let values: std::result::Result<Vec<i64>, _> =
            line.split(',').map(|field| field.trim().parse::<i64>()).collect();
        let values = values.map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        if values.len() != self.n_slots {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("expected {} slots, found {}", self.n_slots, values.len()),
            )
            .into());
        }
        Ok(Some(values))
    }

    /// Write the buffer to disk atomically (write to a temp file, then
    /// rename over the destination) and reset the write counter.
    pub fn flush(&mut self) -> Result<()> {
        write_buffer(&self.path, &self.buffer)?;
        self.write_count = 0;
        info!("Database flushed to {}", self.path.display());
        Ok(())
    }

    /// Overwrite a single slot. Returns `false` without mutating state if
    /// `data_id` is out of range. Flushes automatically once
    /// `flush_threshold` writes have accumulated.
    pub fn update(&mut self, data_id: i64, new_value: i64) -> bool {
        if data_id < 0 || data_id as usize >= self.buffer.len() {
            error!("Invalid data_id {}; no update performed", data_id);
            return false;
        }
        let idx = data_id as usize;
        let old_value = self.buffer[idx];
        self.buffer[idx] = new_value;
        info!("Buffer updated at index {}: {} -> {}", idx, old_value, new_value);
        self.write_count += 1;

        if self.write_count >= self.flush_threshold {
            if let Err(e) = self.flush() {
                error!("Flush threshold reached but flush failed: {}", e);
            }
        }
        true
    }

    /// Read a single slot's current value. Used by the Transaction Manager
    /// to compute `old_value` before a write, and by undo to restore it.
    pub fn get(&self, data_id: i64) -> Option<i64> {
        if data_id < 0 {
            return None;
        }
        self.buffer.get(data_id as usize).copied()
    }

    /// Directly set a slot without bounds-checking or counting a write.
    /// Used by undo, which restores a value that was already validated by
    /// the original `update` call.
    pub fn set_unchecked(&mut self, data_id: i64, value: i64) {
        if let Some(slot) = self.buffer.get_mut(data_id as usize) {
            *slot = value;
        }
    }

    pub fn buffer(&self) -> &[i64] {
        &self.buffer
    }

    pub fn write_count(&self) -> u64 {
        self.write_count
    }
}

fn write_buffer(path: &Path, buffer: &[i64]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;
    let line = buffer
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",");
    writeln!(file, "{}", line)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;
    Ok(())
}
