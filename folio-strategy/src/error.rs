use folio_calendar::ScheduleError;
use folio_data::DataError;
use folio_frame::FrameError;
use smol_str::SmolStr;
use thiserror::Error;

/// All errors raised by strategy lookup, construction and computation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    #[error("strategy not found: {0}")]
    UnknownStrategy(SmolStr),

    #[error("invalid strategy arguments: {0}")]
    InvalidArguments(String),

    #[error("invalid period: {0}")]
    InvalidPeriod(SmolStr),

    #[error("strategy produced an empty plan")]
    EmptyPlan,

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("frame: {0}")]
    Frame(#[from] FrameError),

    #[error("schedule: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("data: {0}")]
    Data(#[from] DataError),
}
