use folio_instrument::Security;
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};
use std::fmt;

/// End-of-day metrics served by a [`crate::MetricService`].
///
/// `AdjustedClose` is split-adjusted and dividend-handled; `Close` is raw.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Open,
    High,
    Low,
    Close,
    AdjustedClose,
    Splits,
    Dividends,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::High => "high",
            Self::Low => "low",
            Self::Close => "close",
            Self::AdjustedClose => "adj_close",
            Self::Splits => "splits",
            Self::Dividends => "dividends",
        };
        f.write_str(name)
    }
}

/// Column naming convention for served frames: `"<composite_figi>:<metric>"`.
pub fn column_name(security: &Security, metric: Metric) -> SmolStr {
    format_smolstr!("{}:{}", security.composite_figi, metric)
}
