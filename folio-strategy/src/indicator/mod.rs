use crate::error::StrategyError;
use folio_frame::{Frame, FrameError};
use smol_str::SmolStr;

/// Weights of the accelerating 12-6-3-1 momentum blend, applied to the 1, 3,
/// 6 and 12 month returns respectively.
const MOMENTUM_12631_WEIGHTS: [(usize, f64); 4] = [(1, 12.0), (3, 4.0), (6, 2.0), (12, 1.0)];

/// Strip the `:<metric>` suffix of a served column name, leaving the
/// composite FIGI.
pub fn figi_of(column: &SmolStr) -> SmolStr {
    match column.split_once(':') {
        Some((figi, _)) => SmolStr::new(figi),
        None => column.clone(),
    }
}

/// Average momentum across the provided lookback periods, minus the monthly
/// risk-free adjustment when a risk-free series is supplied.
///
/// `prices` must be monthly-resampled; `risk_free` is the annualised percent
/// rate aligned row-for-row with `prices` (the adjustment subtracted per leg
/// is `rate / 12 / 100`). The first `max(periods)` rows are NaN. Output
/// columns are keyed by composite FIGI.
pub fn momentum(
    prices: &Frame,
    periods: &[usize],
    risk_free: Option<&Frame>,
) -> Result<Frame, StrategyError> {
    let adjustment = monthly_risk_free(prices, risk_free)?;

    let scored = weighted_momentum(prices, &|row, col: &[f64]| {
        let mut sum = 0.0;
        for period in periods {
            if row < *period {
                return f64::NAN;
            }
            sum += col[row] / col[row - period] - 1.0 - adjustment[row];
        }
        sum / periods.len() as f64
    });
    Ok(scored.rename_columns(figi_of)?)
}

/// The DAA-convention weighted momentum: `12*r1 + 4*r3 + 2*r6 + r12` over 1,
/// 3, 6 and 12 month returns. The first 12 rows are NaN. Output columns are
/// keyed by composite FIGI.
pub fn momentum_12631(prices: &Frame) -> Result<Frame, StrategyError> {
    let scored = weighted_momentum(prices, &|row, col: &[f64]| {
        let mut sum = 0.0;
        for (period, weight) in MOMENTUM_12631_WEIGHTS {
            if row < period {
                return f64::NAN;
            }
            sum += weight * (col[row] / col[row - period] - 1.0);
        }
        sum
    });
    Ok(scored.rename_columns(figi_of)?)
}

/// Simple moving average; delegates to the frame op.
pub fn sma(prices: &Frame, width: usize) -> Frame {
    prices.sma(width)
}

fn weighted_momentum(prices: &Frame, score: &dyn Fn(usize, &[f64]) -> f64) -> Frame {
    let mut names = Vec::with_capacity(prices.col_count());
    let mut cols = Vec::with_capacity(prices.col_count());
    for name in prices.names() {
        let col = prices.column(name).expect("column exists");
        names.push(name.clone());
        cols.push((0..col.len()).map(|row| score(row, col)).collect());
    }
    Frame::from_columns(prices.dates().to_vec(), names, cols)
        .expect("shape preserved from input frame")
}

fn monthly_risk_free(
    prices: &Frame,
    risk_free: Option<&Frame>,
) -> Result<Vec<f64>, StrategyError> {
    match risk_free {
        None => Ok(vec![0.0; prices.len()]),
        Some(rates) => {
            let Some(column) = rates.names().first().map(|n| rates.column(n).unwrap()) else {
                return Ok(vec![0.0; prices.len()]);
            };
            if rates.len() != prices.len() {
                return Err(StrategyError::Frame(FrameError::LengthMismatch {
                    expected: prices.len(),
                    found: rates.len(),
                }));
            }
            Ok(column.iter().map(|rate| rate / 12.0 / 100.0).collect())
        }
    }
}
