use chrono::NaiveDate;
use folio_calendar::ScheduleError;
use folio_data::DataError;
use smol_str::SmolStr;
use thiserror::Error;

/// All errors raised by the performance engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PerformanceError {
    #[error("no close price for {figi} on {date}")]
    PriceUnavailable { figi: SmolStr, date: NaiveDate },

    #[error("data: {0}")]
    Data(#[from] DataError),

    #[error("schedule: {0}")]
    Schedule(#[from] ScheduleError),
}
