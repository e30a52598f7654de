//! Error types for adbsim
//!
//! Defines a unified error type that can represent errors from every
//! component. Internal inconsistencies (double-start, commit of an unknown
//! transaction, a malformed log line) are logged and handled in place rather
//! than surfaced here — this type only carries the errors that are meant to
//! propagate out of a call and change control flow (bad CLI input, I/O
//! failure while opening the WAL or DB file).

use std::fmt;
use std::io;

/// Unified error type for adbsim operations.
#[derive(Debug)]
pub enum SimError {
    /// I/O error opening or writing the WAL/DB files.
    Io(io::Error),
    /// Bad CLI input: wrong arity, an unparsable number, or an
    /// out-of-range/inconsistent probability.
    InvalidInput(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Io(e) => write!(f, "{}", e),
            SimError::InvalidInput(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SimError {}

impl From<io::Error> for SimError {
    fn from(e: io::Error) -> Self {
        SimError::Io(e)
    }
}

/// Result type alias for adbsim operations.
pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_displays_message() {
        let e = SimError::InvalidInput("write_prob + rollback_prob must be <= 1".to_string());
        assert_eq!(e.to_string(), "write_prob + rollback_prob must be <= 1");
    }

    #[test]
    fn io_error_wraps_and_displays() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let e: SimError = io_err.into();
        assert!(e.to_string().contains("missing"));
    }
}
