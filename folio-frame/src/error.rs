use chrono::{DateTime, Utc};
use smol_str::SmolStr;
use thiserror::Error;

/// All errors raised by [`crate::Frame`] construction and operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("interval invalid: no intersection between aligned frames")]
    IntervalInvalid,

    #[error("length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("column arity mismatch: frame has {expected} columns, found {found} values")]
    ColumnArity { expected: usize, found: usize },

    #[error("column not found: {0}")]
    ColumnNotFound(SmolStr),

    #[error("duplicate column: {0}")]
    DuplicateColumn(SmolStr),

    #[error("date not strictly increasing: {date} does not extend index past {last}")]
    NonMonotonicDate {
        date: DateTime<Utc>,
        last: DateTime<Utc>,
    },
}
