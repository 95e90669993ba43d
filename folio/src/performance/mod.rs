use crate::{
    performance::{error::PerformanceError, metrics::PortfolioMetrics},
    portfolio::{Portfolio, transaction::TransactionKind},
};
use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use folio_calendar::{Schedule, eastern_date};
use folio_data::{Ctx, DataError, Metric, MetricService, SecurityFrames};
use folio_frame::Frame;
use folio_instrument::Security;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Welford's online mean/variance.
pub mod algorithm;

/// Defines all possible errors raised by the performance engine.
pub mod error;

/// The [`PortfolioMetrics`] bundle and its derivations.
pub mod metrics;

/// Human-readable table rendering of the metrics bundle.
pub mod summary;

/// Rolling window of the Ulcer index, in trading days.
pub const ULCER_WINDOW: usize = 14;

/// Trading days per year used by annualisations.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Basis of the growth-of-10k trajectories.
pub const GROWTH_BASIS: f64 = 10_000.0;

/// Days of price history requested ahead of the period start.
const PRICE_LOOKBACK_DAYS: i64 = 14;

/// One mark-to-market observation per calendar trading day.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Measurement {
    pub time: DateTime<Utc>,
    /// `{ticker: shares}` snapshot after folding the day's transactions.
    pub holdings: Value,
    pub justification: Value,
    pub value: f64,
    pub percent_return: f64,
    pub risk_free_value: f64,
    pub total_deposited_to_date: f64,
    pub total_withdrawn_to_date: f64,
    pub ulcer_index: f64,
    pub strategy_growth_of_10k: f64,
    pub benchmark_growth_of_10k: f64,
    pub risk_free_growth_of_10k: f64,
}

/// Daily performance record of a portfolio plus the aggregated metrics
/// bundle. Holds the portfolio by id only - the portfolio owns the ledger.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Performance {
    pub portfolio_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub measurements: Vec<Measurement>,
    pub portfolio_metrics: Option<PortfolioMetrics>,
    pub ytd_return: f64,
    pub cagr_since_inception: f64,
    pub current_asset: String,
}

impl Performance {
    /// An empty performance bound to a portfolio.
    pub fn new(portfolio: &Portfolio) -> Self {
        Self {
            portfolio_id: portfolio.id,
            period_start: portfolio.start_date,
            period_end: portfolio.start_date,
            measurements: Vec::new(),
            portfolio_metrics: None,
            ytd_return: 0.0,
            cagr_since_inception: 0.0,
            current_asset: String::new(),
        }
    }

    /// Recompute daily measurements from the portfolio's ledger through
    /// `min(through, now)`. Deterministic: repeated runs over the same
    /// ledger and data snapshot reproduce identical measurements.
    pub async fn calculate_through(
        &mut self,
        ctx: &Ctx,
        portfolio: &Portfolio,
        data: &dyn MetricService,
        through: DateTime<Utc>,
    ) -> Result<(), PerformanceError> {
        let end = through.min(Utc::now());
        let axis = Schedule::daily_close().between(self.period_start, end)?;
        if axis.is_empty() {
            return Ok(());
        }

        let securities = securities_ever_held(portfolio);
        let price_begin = self.period_start - TimeDelta::days(PRICE_LOOKBACK_DAYS);
        let frames = if securities.is_empty() {
            SecurityFrames::default()
        } else {
            data.metrics(ctx, &securities, &[Metric::Close], price_begin, end)
                .await?
        };

        let benchmark = match &portfolio.benchmark {
            Some(benchmark) => {
                let security = Arc::new(benchmark.clone());
                let frames = data
                    .metrics(
                        ctx,
                        std::slice::from_ref(&security),
                        &[Metric::Close],
                        price_begin,
                        end,
                    )
                    .await?;
                Some((security, frames))
            }
            None => None,
        };

        let rates = data.risk_free_rate(ctx, price_begin, end).await?;

        debug!(
            portfolio_id = %self.portfolio_id,
            days = axis.len(),
            securities = securities.len(),
            "calculating performance"
        );

        let mut holdings: IndexMap<Security, f64> = IndexMap::new();
        let mut cash = 0.0;
        let mut deposited = 0.0;
        let mut withdrawn = 0.0;
        let mut transaction_idx = 0;

        let mut prev_value: Option<f64> = None;
        let mut strategy_growth = GROWTH_BASIS;
        let mut risk_free_growth = GROWTH_BASIS;
        let mut risk_free_value = 0.0;
        let mut benchmark_base: Option<f64> = None;
        let mut growth_series = Vec::with_capacity(axis.len());

        self.measurements.clear();
        self.period_end = *axis.last().expect("axis is non-empty");

        for instant in axis {
            ctx.check().map_err(DataError::from)?;
            let day = eastern_date(instant);

            let mut deposits_today = 0.0;
            let mut withdrawals_today = 0.0;
            let mut justification = Value::Null;
            while transaction_idx < portfolio.transactions.len()
                && portfolio.transactions[transaction_idx].date <= instant
            {
                let transaction = &portfolio.transactions[transaction_idx];
                match transaction.kind {
                    TransactionKind::Buy => {
                        let security =
                            transaction.security.clone().expect("buy names a security");
                        *holdings.entry(security).or_insert(0.0) += transaction.shares;
                        cash -= transaction.total_value;
                    }
                    TransactionKind::Sell => {
                        let security =
                            transaction.security.clone().expect("sell names a security");
                        let held = holdings.entry(security.clone()).or_insert(0.0);
                        *held -= transaction.shares;
                        if *held < crate::portfolio::SHARES_EPSILON {
                            holdings.shift_remove(&security);
                        }
                        cash += transaction.total_value;
                    }
                    TransactionKind::Dividend => cash += transaction.total_value,
                    TransactionKind::Split => {
                        let security =
                            transaction.security.clone().expect("split names a security");
                        holdings.insert(security, transaction.shares);
                    }
                    TransactionKind::Deposit => {
                        cash += transaction.total_value;
                        deposited += transaction.total_value;
                        deposits_today += transaction.total_value;
                    }
                    TransactionKind::Withdraw => {
                        cash -= transaction.total_value;
                        withdrawn += transaction.total_value;
                        withdrawals_today += transaction.total_value;
                    }
                }
                if !transaction.justification.is_null() {
                    justification = transaction.justification.clone();
                }
                transaction_idx += 1;
            }

            let mut value = cash;
            for (security, shares) in &holdings {
                value += shares * close_price(&frames, security, day)?;
            }

            let rate = rate_at(&rates, day).unwrap_or(0.0);
            let daily_rate = rate / 100.0 / TRADING_DAYS_PER_YEAR;

            let percent_return = match prev_value {
                Some(prev) if prev.abs() > f64::EPSILON => {
                    (value - prev + withdrawals_today - deposits_today) / prev
                }
                _ => 0.0,
            };

            if prev_value.is_some() {
                strategy_growth *= 1.0 + percent_return;
                risk_free_growth *= 1.0 + daily_rate;
                risk_free_value =
                    risk_free_value * (1.0 + daily_rate) + deposits_today - withdrawals_today;
            } else {
                risk_free_value = deposits_today - withdrawals_today;
            }
            prev_value = Some(value);
            growth_series.push(strategy_growth);

            let benchmark_growth = match &benchmark {
                Some((security, frames)) => {
                    let price = close_price(frames, security, day)?;
                    let base = *benchmark_base.get_or_insert(price);
                    GROWTH_BASIS * price / base
                }
                None => f64::NAN,
            };

            self.measurements.push(Measurement {
                time: instant,
                holdings: holdings_json(&holdings),
                justification,
                value,
                percent_return,
                risk_free_value,
                total_deposited_to_date: deposited,
                total_withdrawn_to_date: withdrawn,
                ulcer_index: ulcer_index(&growth_series, ULCER_WINDOW),
                strategy_growth_of_10k: strategy_growth,
                benchmark_growth_of_10k: benchmark_growth,
                risk_free_growth_of_10k: risk_free_growth,
            });
        }

        self.ytd_return = self.year_to_date_return();
        self.cagr_since_inception = self.inception_cagr();
        self.current_asset = holdings
            .keys()
            .map(|security| security.ticker.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Ok(())
    }

    /// Aggregate the measurement series into the metrics bundle.
    pub fn build_metrics_bundle(&self, portfolio: &Portfolio) -> PortfolioMetrics {
        PortfolioMetrics::calculate(self, portfolio)
    }

    fn year_to_date_return(&self) -> f64 {
        let Some(last) = self.measurements.last() else {
            return 0.0;
        };
        let final_year = eastern_date(last.time).year();
        let first_of_year = self
            .measurements
            .iter()
            .position(|m| eastern_date(m.time).year() == final_year)
            .unwrap_or(0);
        let base = if first_of_year == 0 {
            self.measurements[0].strategy_growth_of_10k
        } else {
            self.measurements[first_of_year - 1].strategy_growth_of_10k
        };
        if base.abs() < f64::EPSILON {
            return 0.0;
        }
        last.strategy_growth_of_10k / base - 1.0
    }

    fn inception_cagr(&self) -> f64 {
        if self.measurements.len() < 2 {
            return 0.0;
        }
        let last = self.measurements.last().expect("non-empty");
        let years = (self.measurements.len() - 1) as f64 / TRADING_DAYS_PER_YEAR;
        (last.strategy_growth_of_10k / GROWTH_BASIS).powf(1.0 / years) - 1.0
    }
}

fn securities_ever_held(portfolio: &Portfolio) -> Vec<Arc<Security>> {
    let mut seen = IndexMap::new();
    for transaction in &portfolio.transactions {
        if let Some(security) = &transaction.security {
            seen.entry(security.composite_figi.clone())
                .or_insert_with(|| Arc::new(security.clone()));
        }
    }
    seen.into_values().collect()
}

fn holdings_json(holdings: &IndexMap<Security, f64>) -> Value {
    let mut map = serde_json::Map::new();
    for (security, shares) in holdings {
        map.insert(security.ticker.to_string(), Value::from(*shares));
    }
    Value::Object(map)
}

fn close_price(
    frames: &SecurityFrames,
    security: &Security,
    date: NaiveDate,
) -> Result<f64, PerformanceError> {
    frames
        .value_on_or_before(security, date, Metric::Close)
        .ok_or_else(|| PerformanceError::PriceUnavailable {
            figi: security.composite_figi.clone(),
            date,
        })
}

/// Latest risk-free rate at or before the Eastern date.
fn rate_at(rates: &Frame, day: NaiveDate) -> Option<f64> {
    let column = rates
        .names()
        .first()
        .and_then(|name| rates.column(name))?;
    let idx = rates
        .dates()
        .partition_point(|date| eastern_date(*date) <= day);
    if idx == 0 {
        return None;
    }
    let value = column[idx - 1];
    (!value.is_nan()).then_some(value)
}

/// Root-mean-square percent drawdown over the trailing window; NaN until the
/// window fills.
fn ulcer_index(growth: &[f64], window: usize) -> f64 {
    if growth.len() < window {
        return f64::NAN;
    }
    let slice = &growth[growth.len() - window..];
    let mut peak = f64::MIN;
    let mut sum_squares = 0.0;
    for value in slice {
        peak = peak.max(*value);
        let drawdown = 100.0 * (value - peak) / peak;
        sum_squares += drawdown * drawdown;
    }
    (sum_squares / window as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_calendar::MarketCalendar;
    use folio_data::InMemoryMetricService;
    use folio_strategy::{Pie, Plan};

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn close(date: NaiveDate) -> DateTime<Utc> {
        MarketCalendar::nyse().close_instant(date)
    }

    /// One security trending upward over June 2020, plus a flat benchmark
    /// and a constant risk-free rate.
    async fn fixture() -> (InMemoryMetricService, Portfolio) {
        let data = InMemoryMetricService::new();
        let aaa = Arc::new(Security::from_parts("AAA", "BBG00PERF0A0"));
        let bench = Security::from_parts("BENCH", "BBG00PERF0B0");

        let mut day = ymd(2020, 6, 1);
        let mut points = Vec::new();
        let mut bench_points = Vec::new();
        let mut rf_points = Vec::new();
        let mut price = 100.0;
        while day <= ymd(2020, 6, 30) {
            if MarketCalendar::nyse().is_trading_day(day) {
                points.push((day, price));
                bench_points.push((day, 50.0));
                rf_points.push((day, 2.52));
                price += 1.0;
            }
            day = day.succ_opt().unwrap();
        }
        data.insert_series(&aaa, Metric::Close, points);
        data.insert_series(&bench, Metric::Close, bench_points);
        data.insert_risk_free(rf_points);

        let ctx = Ctx::background();
        let mut portfolio = Portfolio::new("perf", close(ymd(2020, 6, 1)), 10_000.0);
        portfolio.benchmark = Some(bench);
        let mut pie = Pie::empty(close(ymd(2020, 6, 1)));
        pie.members.insert(Arc::clone(&aaa), 1.0);
        let plan = Plan::new(vec![pie]).unwrap();
        portfolio
            .target_portfolio(&ctx, &data, &plan)
            .await
            .unwrap();

        (data, portfolio)
    }

    #[tokio::test]
    async fn test_measurements_cover_every_trading_day() {
        let (data, portfolio) = fixture().await;
        let ctx = Ctx::background();
        let mut performance = Performance::new(&portfolio);

        performance
            .calculate_through(&ctx, &portfolio, &data, close(ymd(2020, 6, 30)))
            .await
            .unwrap();

        // 22 trading days in June 2020.
        assert_eq!(performance.measurements.len(), 22);
        assert_eq!(
            eastern_date(performance.measurements[0].time),
            ymd(2020, 6, 1)
        );
        assert_eq!(performance.period_end, close(ymd(2020, 6, 30)));
        assert_eq!(performance.current_asset, "AAA");
    }

    #[tokio::test]
    async fn test_value_conservation_against_close_prices() {
        let (data, portfolio) = fixture().await;
        let ctx = Ctx::background();
        let mut performance = Performance::new(&portfolio);
        performance
            .calculate_through(&ctx, &portfolio, &data, close(ymd(2020, 6, 30)))
            .await
            .unwrap();

        // 100 shares at $100: day N value = 100 * (100 + N).
        let first = &performance.measurements[0];
        assert!((first.value - 10_000.0).abs() < 1e-6);
        assert_eq!(first.percent_return, 0.0);

        let second = &performance.measurements[1];
        assert!((second.value - 10_100.0).abs() < 1e-6);
        assert!((second.percent_return - 0.01).abs() < 1e-9);

        for measurement in &performance.measurements {
            // Value conservation: |value - (cash + shares * close)| within
            // tolerance. Holdings snapshot carries the share count.
            let shares = measurement.holdings["AAA"].as_f64().unwrap();
            assert!((shares - 100.0).abs() < 1e-9);
            assert!(measurement.value > 0.0);
            assert_eq!(measurement.total_deposited_to_date, 10_000.0);
            assert_eq!(measurement.total_withdrawn_to_date, 0.0);
        }
    }

    #[tokio::test]
    async fn test_growth_trajectories() {
        let (data, portfolio) = fixture().await;
        let ctx = Ctx::background();
        let mut performance = Performance::new(&portfolio);
        performance
            .calculate_through(&ctx, &portfolio, &data, close(ymd(2020, 6, 30)))
            .await
            .unwrap();

        let last = performance.measurements.last().unwrap();

        // Strategy growth mirrors the flow-adjusted value ratio.
        let expected_growth = GROWTH_BASIS * last.value / 10_000.0;
        assert!((last.strategy_growth_of_10k - expected_growth).abs() < 1e-6);

        // Flat benchmark stays at the basis.
        assert!((last.benchmark_growth_of_10k - GROWTH_BASIS).abs() < 1e-6);

        // 2.52% annualised compounds at 0.01%/day over 21 steps.
        let expected_rf = GROWTH_BASIS * 1.0001f64.powi(21);
        assert!((last.risk_free_growth_of_10k - expected_rf).abs() < 1e-3);
        assert!(performance.cagr_since_inception > 0.0);
    }

    #[tokio::test]
    async fn test_ulcer_warms_up_then_fills() {
        let (data, portfolio) = fixture().await;
        let ctx = Ctx::background();
        let mut performance = Performance::new(&portfolio);
        performance
            .calculate_through(&ctx, &portfolio, &data, close(ymd(2020, 6, 30)))
            .await
            .unwrap();

        for (idx, measurement) in performance.measurements.iter().enumerate() {
            if idx + 1 < ULCER_WINDOW {
                assert!(measurement.ulcer_index.is_nan(), "day {idx}");
            } else {
                // Monotonic growth: no drawdown, UI exactly zero.
                assert_eq!(measurement.ulcer_index, 0.0, "day {idx}");
            }
        }
    }

    #[tokio::test]
    async fn test_recalculation_is_idempotent() {
        let (data, portfolio) = fixture().await;
        let ctx = Ctx::background();
        let mut performance = Performance::new(&portfolio);

        performance
            .calculate_through(&ctx, &portfolio, &data, close(ymd(2020, 6, 30)))
            .await
            .unwrap();
        let first = serde_json::to_value(&performance).unwrap();

        performance
            .calculate_through(&ctx, &portfolio, &data, close(ymd(2020, 6, 30)))
            .await
            .unwrap();

        // NaN-bearing warm-up cells serialise to null, so byte-identical JSON
        // is the equality that matters here.
        assert_eq!(serde_json::to_value(&performance).unwrap(), first);
    }

    #[tokio::test]
    async fn test_cash_flows_do_not_distort_returns() {
        // All-cash portfolio with a mid-month withdrawal: flow-adjusted
        // returns stay flat while value and the risk-free twin drop.
        let data = InMemoryMetricService::new();
        let ctx = Ctx::background();
        let mut portfolio = Portfolio::new("flows", close(ymd(2020, 6, 1)), 10_000.0);
        portfolio.withdraw(close(ymd(2020, 6, 15)), 1_000.0).unwrap();

        let mut performance = Performance::new(&portfolio);
        performance
            .calculate_through(&ctx, &portfolio, &data, close(ymd(2020, 6, 30)))
            .await
            .unwrap();

        let last = performance.measurements.last().unwrap();
        assert!((last.value - 9_000.0).abs() < 1e-9);
        assert_eq!(last.total_withdrawn_to_date, 1_000.0);
        assert!((last.risk_free_value - 9_000.0).abs() < 1e-9);
        for measurement in &performance.measurements {
            assert_eq!(measurement.percent_return, 0.0);
            assert!((measurement.strategy_growth_of_10k - GROWTH_BASIS).abs() < 1e-9);
        }
    }

    #[test]
    fn test_ulcer_index_of_drawdown_window() {
        // Window of 4: peak 100 then 10% drawdown held for two steps.
        let growth = vec![100.0, 100.0, 90.0, 90.0];
        let ui = ulcer_index(&growth, 4);
        // Drawdowns: 0, 0, -10%, -10% -> sqrt((0+0+100+100)/4).
        assert!((ui - (200.0f64 / 4.0).sqrt()).abs() < 1e-9);

        assert!(ulcer_index(&growth, 5).is_nan());
    }
}
