//! The record type flowing through both streams.

use serde::{Deserialize, Serialize};

/// A keyed log record.
///
/// Records are plain values: joining two of them produces a new record
/// rather than mutating either side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LogRecord {
    /// Join key
    pub key: String,
    /// Payload summed by the join
    pub value: i64,
}

impl LogRecord {
    /// Create a new record.
    pub fn new(key: impl Into<String>, value: i64) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Join with a matching record by summing values.
    ///
    /// The sum wraps on overflow.
    pub fn sum_with(&self, other: &LogRecord) -> LogRecord {
        LogRecord {
            key: self.key.clone(),
            value: self.value.wrapping_add(other.value),
        }
    }
}
