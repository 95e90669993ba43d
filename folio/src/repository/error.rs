use folio_data::CtxError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors raised by the persistence bridge.
///
/// Treated as transient per-portfolio in batch jobs (log, roll back, skip)
/// and fatal for single-portfolio requests.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum RepositoryError {
    #[error("expected data not present")]
    ExpectedDataNotPresent,

    #[error("unauthorized for user {0}")]
    Unauthorized(String),

    #[error("transaction already finished")]
    TxFinished,

    #[error("storage: {0}")]
    Storage(String),

    #[error("{0}")]
    Ctx(#[from] CtxError),
}
