use chrono::NaiveDate;
use folio_data::DataError;
use folio_strategy::StrategyError;
use smol_str::SmolStr;
use thiserror::Error;

/// All errors raised by the portfolio ledger engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PortfolioError {
    #[error("no close price for {figi} on {date}")]
    PriceUnavailable { figi: SmolStr, date: NaiveDate },

    #[error("withdrawal of {requested} exceeds cash balance {available}")]
    InsufficientCash { requested: f64, available: f64 },

    #[error("data: {0}")]
    Data(#[from] DataError),

    #[error("strategy: {0}")]
    Strategy(#[from] StrategyError),
}
