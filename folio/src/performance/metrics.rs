use crate::{
    performance::{GROWTH_BASIS, Performance, TRADING_DAYS_PER_YEAR, algorithm::WelfordOnline},
    portfolio::{Portfolio, transaction::TransactionKind},
};
use chrono::{DateTime, TimeDelta, Utc};
use fnv::FnvHashMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::VecDeque;

/// Long-term capital-gains rate applied to lots held longer than a year.
const LONG_TERM_RATE: f64 = 0.15;

/// Short-term capital-gains rate.
const SHORT_TERM_RATE: f64 = 0.35;

/// Holding period separating short- from long-term gains.
const LONG_TERM_DAYS: i64 = 365;

/// A peak-to-trough decline of the strategy trajectory.
///
/// `begin` is the peak, `end` the trough, `recovery` the instant the prior
/// peak was regained - `None` while the drawdown is still ongoing at series
/// end. `loss_percent` is positive.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DrawdownEvent {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub recovery: Option<DateTime<Utc>>,
    pub loss_percent: f64,
}

impl DrawdownEvent {
    /// Time from peak to trough.
    pub fn duration(&self) -> TimeDelta {
        self.end.signed_duration_since(self.begin)
    }
}

/// Aggregated risk/return metrics of one simulated portfolio.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct PortfolioMetrics {
    pub cagr_3yr: f64,
    pub cagr_5yr: f64,
    pub cagr_10yr: f64,
    pub std_dev: f64,
    pub downside_deviation: f64,
    pub max_drawdown: Option<DrawdownEvent>,
    pub avg_drawdown: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub ulcer_index_avg: f64,
    pub ulcer_index_p50: f64,
    pub ulcer_index_p90: f64,
    pub ulcer_index_p99: f64,
    pub tax_adjusted_return: f64,
}

impl PortfolioMetrics {
    /// Derive the bundle from a computed [`Performance`] and the portfolio's
    /// ledger.
    pub fn calculate(performance: &Performance, portfolio: &Portfolio) -> Self {
        let measurements = &performance.measurements;
        if measurements.len() < 2 {
            return Self::default();
        }

        let growth = measurements
            .iter()
            .map(|m| m.strategy_growth_of_10k)
            .collect::<Vec<_>>();
        let dates = measurements.iter().map(|m| m.time).collect::<Vec<_>>();

        // Daily return dispersion, skipping the synthetic day-zero return.
        let mut welford = WelfordOnline::new();
        let mut downside = 0.0;
        let mut risk_free = WelfordOnline::new();
        for (prev, current) in measurements.iter().tuple_windows() {
            welford.update(current.percent_return);
            downside += current.percent_return.min(0.0).powi(2);
            let rf_return = if prev.risk_free_growth_of_10k.abs() > f64::EPSILON {
                current.risk_free_growth_of_10k / prev.risk_free_growth_of_10k - 1.0
            } else {
                0.0
            };
            risk_free.update(rf_return);
        }
        let std_dev = welford.sample_std_dev();
        let downside_deviation = (downside / welford.count() as f64).sqrt();

        let events = drawdowns(&dates, &growth);
        let max_drawdown = events
            .iter()
            .max_by(|a, b| {
                a.loss_percent
                    .partial_cmp(&b.loss_percent)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned();
        let avg_drawdown = if events.is_empty() {
            0.0
        } else {
            events.iter().map(|e| e.loss_percent).sum::<f64>() / events.len() as f64
        };

        let annualise = TRADING_DAYS_PER_YEAR.sqrt();
        let excess = welford.mean() - risk_free.mean();
        let sharpe_ratio = if std_dev > 0.0 {
            excess / std_dev * annualise
        } else {
            f64::NAN
        };
        let sortino_ratio = if downside_deviation > 0.0 {
            excess / downside_deviation * annualise
        } else {
            f64::NAN
        };

        let ulcer = measurements
            .iter()
            .map(|m| m.ulcer_index)
            .filter(|ui| !ui.is_nan())
            .collect::<Vec<_>>();

        Self {
            cagr_3yr: horizon_cagr(&growth, 3),
            cagr_5yr: horizon_cagr(&growth, 5),
            cagr_10yr: horizon_cagr(&growth, 10),
            std_dev,
            downside_deviation,
            max_drawdown,
            avg_drawdown,
            sharpe_ratio,
            sortino_ratio,
            ulcer_index_avg: mean(&ulcer),
            ulcer_index_p50: percentile(&ulcer, 50.0),
            ulcer_index_p90: percentile(&ulcer, 90.0),
            ulcer_index_p99: percentile(&ulcer, 99.0),
            tax_adjusted_return: tax_adjusted_return(performance, portfolio),
        }
    }
}

/// Every drawdown of the trajectory, in order, including one still ongoing at
/// series end.
pub fn drawdowns(dates: &[DateTime<Utc>], values: &[f64]) -> Vec<DrawdownEvent> {
    let mut events = Vec::new();
    let Some(first) = values.first() else {
        return events;
    };

    let mut peak = *first;
    let mut peak_idx = 0;
    let mut open: Option<(usize, f64)> = None;

    for (idx, value) in values.iter().enumerate().skip(1) {
        match open {
            Some((trough_idx, trough)) => {
                let (trough_idx, trough) = if *value < trough {
                    (idx, *value)
                } else {
                    (trough_idx, trough)
                };
                if *value >= peak {
                    events.push(DrawdownEvent {
                        begin: dates[peak_idx],
                        end: dates[trough_idx],
                        recovery: Some(dates[idx]),
                        loss_percent: 100.0 * (peak - trough) / peak,
                    });
                    open = None;
                    peak = *value;
                    peak_idx = idx;
                } else {
                    open = Some((trough_idx, trough));
                }
            }
            None => {
                if *value < peak {
                    open = Some((idx, *value));
                } else {
                    peak = *value;
                    peak_idx = idx;
                }
            }
        }
    }

    if let Some((trough_idx, trough)) = open {
        events.push(DrawdownEvent {
            begin: dates[peak_idx],
            end: dates[trough_idx],
            recovery: None,
            loss_percent: 100.0 * (peak - trough) / peak,
        });
    }

    events
}

/// `(value_T / value_{T - k*252})^(1/k) - 1`, NaN when the horizon does not
/// exist.
fn horizon_cagr(growth: &[f64], years: usize) -> f64 {
    let horizon = years * TRADING_DAYS_PER_YEAR as usize;
    if growth.len() <= horizon {
        return f64::NAN;
    }
    let last = growth[growth.len() - 1];
    let base = growth[growth.len() - 1 - horizon];
    if base.abs() < f64::EPSILON {
        return f64::NAN;
    }
    (last / base).powf(1.0 / years as f64) - 1.0
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Nearest-rank percentile over an unsorted sample.
fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = ((pct / 100.0 * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
    sorted[rank - 1]
}

/// Re-derive the inception CAGR after taxing realized ledger gains: FIFO lot
/// matching, long-term rate beyond one year, short-term otherwise. Net
/// losses within a class offset gains in that class only.
fn tax_adjusted_return(performance: &Performance, portfolio: &Portfolio) -> f64 {
    let Some(last) = performance.measurements.last() else {
        return 0.0;
    };
    if performance.measurements.len() < 2 {
        return 0.0;
    }

    let mut lots: FnvHashMap<SmolStr, VecDeque<(DateTime<Utc>, f64, f64)>> =
        FnvHashMap::default();
    let mut long_term = 0.0;
    let mut short_term = 0.0;

    for transaction in &portfolio.transactions {
        let Some(security) = &transaction.security else {
            continue;
        };
        match transaction.kind {
            TransactionKind::Buy => {
                lots.entry(security.composite_figi.clone())
                    .or_default()
                    .push_back((
                        transaction.date,
                        transaction.shares,
                        transaction.price_per_share,
                    ));
            }
            TransactionKind::Split => {
                // Adjust open lots so matched gains stay price-consistent.
                if let Some(queue) = lots.get_mut(&security.composite_figi) {
                    let held: f64 = queue.iter().map(|(_, shares, _)| shares).sum();
                    if held > 0.0 {
                        let ratio = transaction.shares / held;
                        for (_, shares, price) in queue.iter_mut() {
                            *shares *= ratio;
                            *price /= ratio;
                        }
                    }
                }
            }
            TransactionKind::Sell => {
                let mut remaining = transaction.shares;
                let Some(queue) = lots.get_mut(&security.composite_figi) else {
                    continue;
                };
                while remaining > crate::portfolio::SHARES_EPSILON {
                    let Some((acquired, shares, price)) = queue.front_mut() else {
                        break;
                    };
                    let matched = remaining.min(*shares);
                    let gain = (transaction.price_per_share - *price) * matched;
                    let held_days = transaction
                        .date
                        .signed_duration_since(*acquired)
                        .num_days();
                    if held_days > LONG_TERM_DAYS {
                        long_term += gain;
                    } else {
                        short_term += gain;
                    }
                    *shares -= matched;
                    remaining -= matched;
                    if *shares <= crate::portfolio::SHARES_EPSILON {
                        queue.pop_front();
                    }
                }
            }
            _ => {}
        }
    }

    let tax = long_term.max(0.0) * LONG_TERM_RATE + short_term.max(0.0) * SHORT_TERM_RATE;
    let adjusted = last.strategy_growth_of_10k * (1.0 - tax / last.value.max(f64::EPSILON));
    let years = (performance.measurements.len() - 1) as f64 / TRADING_DAYS_PER_YEAR;
    (adjusted / GROWTH_BASIS).powf(1.0 / years) - 1.0
}
