use crate::{
    performance::error::PerformanceError, portfolio::error::PortfolioError,
    queue::QueueError, repository::error::RepositoryError,
};
use folio_calendar::ScheduleError;
use folio_data::{CtxError, DataError};
use folio_frame::FrameError;
use folio_strategy::StrategyError;
use thiserror::Error;

/// Top-level error of the Folio engine, composing every subsystem taxonomy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FolioError {
    #[error("strategy: {0}")]
    Strategy(#[from] StrategyError),

    #[error("data: {0}")]
    Data(#[from] DataError),

    #[error("portfolio: {0}")]
    Portfolio(#[from] PortfolioError),

    #[error("performance: {0}")]
    Performance(#[from] PerformanceError),

    #[error("repository: {0}")]
    Repository(#[from] RepositoryError),

    #[error("queue: {0}")]
    Queue(#[from] QueueError),

    #[error("frame: {0}")]
    Frame(#[from] FrameError),

    #[error("schedule: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("{0}")]
    Ctx(#[from] CtxError),
}
