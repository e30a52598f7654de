//! WAL log record: the tagged union persisted, one per line, to `log.csv`.

use std::fmt;

use super::types::{DataId, TxnId};

/// A single WAL record. Persists as a CSV line:
///
/// ```text
/// <txid>,S
/// <txid>,F,<data_id>,<old_value>,<new_value>
/// <txid>,R
/// <txid>,C
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// Transaction start.
    Start { txn_id: TxnId },
    /// A write: the slot's value before and after.
    Write {
        txn_id: TxnId,
        data_id: DataId,
        old_value: i64,
        new_value: i64,
    },
    /// Transaction rollback.
    Rollback { txn_id: TxnId },
    /// Transaction commit.
    Commit { txn_id: TxnId },
}

impl LogRecord {
    pub fn txn_id(&self) -> TxnId {
        match self {
            LogRecord::Start { txn_id }
            | LogRecord::Write { txn_id, .. }
            | LogRecord::Rollback { txn_id }
            | LogRecord::Commit { txn_id } => *txn_id,
        }
    }

    /// Serialize to the CSV line form, without a trailing newline.
    pub fn to_csv_line(&self) -> String {
        match self {
            LogRecord::Start { txn_id } => format!("{},S", txn_id),
            LogRecord::Write {
                txn_id,
                data_id,
                old_value,
                new_value,
            } => format!("{},F,{},{},{}", txn_id, data_id, old_value, new_value),
            LogRecord::Rollback { txn_id } => format!("{},R", txn_id),
            LogRecord::Commit { txn_id } => format!("{},C", txn_id),
        }
    }

    /// Parse a single CSV line (no trailing newline expected). Returns
    /// `Err` with a human-readable reason on any malformed line; the
    /// recovery manager logs and skips these rather than aborting.
    pub fn parse_csv_line(line: &str) -> Result<LogRecord, ParseLogError> {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 2 {
            return Err(ParseLogError(format!("too few fields in '{}'", line)));
        }
        let txn_id: TxnId = fields[0]
            .parse()
            .map_err(|_| ParseLogError(format!("bad txn_id in '{}'", line)))?;

        match fields[1] {
            "S" if fields.len() == 2 => Ok(LogRecord::Start { txn_id }),
            "R" if fields.len() == 2 => Ok(LogRecord::Rollback { txn_id }),
            "C" if fields.len() == 2 => Ok(LogRecord::Commit { txn_id }),
            "F" if fields.len() == 5 => {
                let data_id: DataId = fields[2]
                    .parse()
                    .map_err(|_| ParseLogError(format!("bad data_id in '{}'", line)))?;
                let old_value: i64 = fields[3]
                    .parse()
                    .map_err(|_| ParseLogError(format!("bad old_value in '{}'", line)))?;
                let new_value: i64 = fields[4]
                    .parse()
                    .map_err(|_| ParseLogError(format!("bad new_value in '{}'", line)))?;
                Ok(LogRecord::Write {
                    txn_id,
                    data_id,
                    old_value,
                    new_value,
                })
            }
            tag => Err(ParseLogError(format!("unrecognized record '{}' in '{}'", tag, line))),
        }
    }
}

/// Reason a log line failed to parse. Carries a message only; the
/// recovery manager logs it at ERROR and moves on to the next line.
#[derive(Debug)]
pub struct ParseLogError(pub String);

impl fmt::Display for ParseLogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        let records = vec![
            LogRecord::Start { txn_id: 1 },
            LogRecord::Write {
                txn_id: 1,
                data_id: 5,
                old_value: 0,
                new_value: 1,
            },
            LogRecord::Rollback { txn_id: 1 },
            LogRecord::Commit { txn_id: 2 },
        ];
        for record in records {
            let line = record.to_csv_line();
            let parsed = LogRecord::parse_csv_line(&line).unwrap();
            assert_eq!(parsed, record);
        }
    }

    #[test]
    fn write_record_has_five_fields_in_order() {
        let record = LogRecord::Write {
            txn_id: 7,
            data_id: 3,
            old_value: 1,
            new_value: 0,
        };
        assert_eq!(record.to_csv_line(), "7,F,3,1,0");
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(LogRecord::parse_csv_line("").is_err());
        assert!(LogRecord::parse_csv_line("abc,S").is_err());
        assert!(LogRecord::parse_csv_line("1,X").is_err());
        assert!(LogRecord::parse_csv_line("1,F,2,3").is_err());
        assert!(LogRecord::parse_csv_line("1,F,not_a_number,0,1").is_err());
    }
}
