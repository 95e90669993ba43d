use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors raised by schedule parsing and range generation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Error)]
pub enum ScheduleError {
    #[error("schedule parse: {0}")]
    Parse(String),

    #[error("interval invalid: begin {begin} > end {end}")]
    IntervalInvalid {
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}
