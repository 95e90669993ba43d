use crate::ctx::CtxError;
use chrono::{DateTime, Utc};
use folio_frame::FrameError;
use smol_str::SmolStr;
use thiserror::Error;

/// All errors raised by the data request layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("security not found: {0}")]
    SecurityNotFound(SmolStr),

    #[error("no price data available for [{begin}, {end}]")]
    Unavailable {
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("frame: {0}")]
    Frame(#[from] FrameError),

    #[error("{0}")]
    Ctx(#[from] CtxError),
}

impl DataError {
    /// True for `Cancelled` / `DeadlineExceeded`.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Ctx(_))
    }
}
