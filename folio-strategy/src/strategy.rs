use crate::{
    allocation::{Pie, Plan},
    error::StrategyError,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use folio_calendar::{Frequency, Schedule};
use folio_data::{Ctx, DataRequest, Metric, MetricService, RatingService};
use folio_frame::Frame;
use folio_instrument::Security;
use std::{fmt::Debug, sync::Arc};

/// Calendar days a strategy widens `begin` backwards by to warm up its
/// indicators: twelve monthly observations plus holiday slack.
pub(crate) const WARMUP_DAYS: i64 = 400;

/// Services and cancellation handle available to a strategy computation.
#[derive(Clone, Copy)]
pub struct ComputeCtx<'a> {
    pub ctx: &'a Ctx,
    pub data: &'a dyn MetricService,
    pub ratings: &'a dyn RatingService,
}

impl Debug for ComputeCtx<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeCtx").finish_non_exhaustive()
    }
}

/// A deterministic target-allocation generator.
///
/// Given identical arguments and identical price/calendar snapshots,
/// [`Self::compute`] must yield byte-identical plans and predictions.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// The trade schedule allocations are aligned to.
    fn schedule(&self) -> Schedule;

    /// Compute the target-allocation plan over `[begin, end]` plus the
    /// next-period prediction. Implementations may extend `begin` backwards
    /// to warm up indicators.
    async fn compute(
        &self,
        compute: &ComputeCtx<'_>,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(Plan, Pie), StrategyError>;
}

/// Widen `begin` backwards by the indicator warm-up window.
pub(crate) fn widen_begin(begin: DateTime<Utc>) -> DateTime<Utc> {
    begin - TimeDelta::days(WARMUP_DAYS)
}

/// Monthly-resampled adjusted closes for a security set, keeping the final
/// observation as a tail row when it does not fall on a month end (the
/// month-to-date row the next prediction is derived from). Returns the price
/// frame plus the row-aligned risk-free frame, when one is served.
pub(crate) async fn monthly_prices(
    compute: &ComputeCtx<'_>,
    securities: &[Arc<Security>],
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(Frame, Option<Frame>), StrategyError> {
    let frames = DataRequest::new(securities.iter().cloned())
        .metrics([Metric::AdjustedClose])
        .between(begin, end)
        .fetch(compute.ctx, compute.data)
        .await?;
    let merged = frames.merged()?;
    let monthly = with_tail_row(&merged.frequency(Frequency::MONTHLY), &merged);

    let rates = compute.data.risk_free_rate(compute.ctx, begin, end).await?;
    if rates.is_empty() {
        return Ok((monthly, None));
    }

    // Sample the latest rate at or before each price row so the series stays
    // row-aligned even across the month-to-date tail row.
    let sampled = monthly
        .dates()
        .iter()
        .map(|date| rate_at(&rates, *date))
        .collect::<Vec<_>>();
    let aligned = Frame::single(monthly.dates().to_vec(), "risk_free", sampled)?;
    Ok((monthly, Some(aligned)))
}

/// Latest observation of a one-column series at or before the instant; NaN
/// before the first observation.
fn rate_at(rates: &Frame, instant: DateTime<Utc>) -> f64 {
    let Some(column) = rates.names().first().and_then(|name| rates.column(name)) else {
        return f64::NAN;
    };
    let idx = rates.dates().partition_point(|date| *date <= instant);
    if idx == 0 {
        return f64::NAN;
    }
    column[idx - 1]
}

/// Append the source's final row when resampling dropped it. The tail row
/// carries the month-to-date observation predictions are derived from; it is
/// removed again by [`finalise`] unless it lands on a schedule trade day.
pub(crate) fn with_tail_row(resampled: &Frame, source: &Frame) -> Frame {
    let mut out = resampled.clone();
    if source.last_date() > out.last_date() {
        out.append(&source.last());
    }
    out
}

/// Shared tail of every strategy computation: derive the prediction from the
/// final computed row, then drop that row if it is not a trade day under the
/// strategy schedule, then return the validated plan.
///
/// The prediction is derived *before* the trailing row is removed - deriving
/// it afterwards would predict from a stale allocation.
pub(crate) fn finalise(
    schedule: &Schedule,
    mut pies: Vec<Pie>,
) -> Result<(Plan, Pie), StrategyError> {
    let last = pies.last().ok_or(StrategyError::EmptyPlan)?;

    let mut prediction = last.clone();
    prediction.date = schedule.next(last.date);

    if !schedule.is_trade_day(last.date) {
        pies.pop();
    }

    Ok((Plan::new(pies)?, prediction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_calendar::MarketHours;
    use indexmap::IndexMap;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn pie(date: DateTime<Utc>, ticker: &str) -> Pie {
        Pie::single(
            date,
            Arc::new(Security::from_parts(ticker, &format!("BBG0T{ticker}000"))),
        )
    }

    #[test]
    fn test_finalise_predicts_before_dropping_trailing_row() {
        let schedule = Schedule::parse("@monthend @close", MarketHours::Regular).unwrap();

        // Final row 2020-04-29 (a Wednesday, not month end) must be dropped,
        // but the prediction keeps its allocation, dated at the next
        // scheduled close (2020-04-30).
        let pies = vec![
            pie(utc("2020-03-31T20:00:00Z"), "VUSTX"),
            pie(utc("2020-04-29T20:00:00Z"), "PRIDX"),
        ];

        let (plan, prediction) = finalise(&schedule, pies).unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(
            plan.last().unwrap().members.keys().next().unwrap().ticker,
            "VUSTX"
        );
        assert_eq!(
            prediction.members.keys().next().unwrap().ticker,
            "PRIDX"
        );
        assert_eq!(prediction.date, utc("2020-04-30T20:00:00Z"));
    }

    #[test]
    fn test_finalise_keeps_trailing_trade_day_row() {
        let schedule = Schedule::parse("@monthend @close", MarketHours::Regular).unwrap();

        let pies = vec![
            pie(utc("2021-11-30T21:00:00Z"), "VFINX"),
            pie(utc("2021-12-31T21:00:00Z"), "PRIDX"),
        ];

        let (plan, prediction) = finalise(&schedule, pies).unwrap();

        assert_eq!(plan.len(), 2);
        // Prediction still derives from the (kept) final row.
        assert_eq!(prediction.members.keys().next().unwrap().ticker, "PRIDX");
        assert_eq!(prediction.date, utc("2022-01-31T21:00:00Z"));
    }

    #[test]
    fn test_finalise_empty_plan_fails() {
        let schedule = Schedule::month_end_close();
        assert!(matches!(
            finalise(&schedule, Vec::new()),
            Err(StrategyError::EmptyPlan)
        ));
    }

    #[test]
    fn test_buggy_derive_after_drop_ordering_would_differ() {
        // Pin the mandated ordering: deriving the prediction from the plan's
        // final row *after* the trailing non-trade-day row was removed would
        // yield VUSTX here - the stale allocation, not the fresh one.
        let schedule = Schedule::month_end_close();
        let pies = vec![
            pie(utc("2020-03-31T20:00:00Z"), "VUSTX"),
            pie(utc("2020-04-29T20:00:00Z"), "PRIDX"),
        ];

        let (plan, prediction) = finalise(&schedule, pies).unwrap();
        let stale = plan.last().unwrap().members.keys().next().unwrap();

        assert_eq!(stale.ticker, "VUSTX");
        assert_ne!(
            prediction.members.keys().next().unwrap().ticker,
            stale.ticker
        );
    }

    #[test]
    fn test_with_tail_row_appends_only_when_missing() {
        let dates = vec![utc("2020-01-31T21:00:00Z"), utc("2020-02-14T21:00:00Z")];
        let source = Frame::single(dates, "a", vec![1.0, 2.0]).unwrap();
        let resampled =
            Frame::single(vec![utc("2020-01-31T21:00:00Z")], "a", vec![1.0]).unwrap();

        let with_tail = with_tail_row(&resampled, &source);
        assert_eq!(with_tail.len(), 2);

        // Resample already ends at the source tail: nothing appended.
        let unchanged = with_tail_row(&source, &source);
        assert_eq!(unchanged.len(), 2);
    }

    #[test]
    fn test_pie_members_preserve_insert_order() {
        let mut members = IndexMap::new();
        members.insert(
            Arc::new(Security::from_parts("BBB", "BBG0T0000BBB")),
            0.5,
        );
        members.insert(
            Arc::new(Security::from_parts("AAA", "BBG0T0000AAA")),
            0.5,
        );
        let tickers = members
            .keys()
            .map(|s| s.ticker.clone())
            .collect::<Vec<_>>();
        assert_eq!(tickers, vec!["BBB", "AAA"]);
    }
}
