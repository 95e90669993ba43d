use crate::{
    actions::{ActionKind, CorporateAction, sort_actions},
    ctx::Ctx,
    error::DataError,
    metric::{Metric, column_name},
    request::SecurityFrames,
    service::{MetricService, RatingService},
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use fnv::FnvHashMap;
use folio_calendar::{MarketCalendar, eastern_date};
use folio_frame::Frame;
use folio_instrument::{Security, directory};
use indexmap::IndexMap;
use parking_lot::RwLock;
use smol_str::SmolStr;
use std::{collections::BTreeMap, sync::Arc};

/// Deterministic in-memory [`MetricService`]. Backs the test-suite and
/// seedable fixtures. **Do not use in production - everything lives on the
/// heap of one process!**
#[derive(Debug, Default)]
pub struct InMemoryMetricService {
    inner: RwLock<Store>,
}

#[derive(Debug, Default)]
struct Store {
    series: FnvHashMap<SmolStr, FnvHashMap<Metric, BTreeMap<NaiveDate, f64>>>,
    actions: Vec<CorporateAction>,
    risk_free: BTreeMap<NaiveDate, f64>,
}

impl InMemoryMetricService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a metric series for a security, registering it in the process
    /// directory.
    pub fn insert_series<I>(&self, security: &Security, metric: Metric, points: I)
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        directory().insert(security.clone());
        let mut inner = self.inner.write();
        inner
            .series
            .entry(security.composite_figi.clone())
            .or_default()
            .entry(metric)
            .or_default()
            .extend(points);
    }

    /// Seed a corporate action.
    pub fn insert_action(&self, action: CorporateAction) {
        self.inner.write().actions.push(action);
    }

    /// Seed the annualised risk-free percent rate series.
    pub fn insert_risk_free<I>(&self, points: I)
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        self.inner.write().risk_free.extend(points);
    }

    fn security_series(
        store: &Store,
        security: &Security,
        metric: Metric,
    ) -> Option<BTreeMap<NaiveDate, f64>> {
        let per_metric = store.series.get(&security.composite_figi)?;
        match per_metric.get(&metric) {
            Some(series) => Some(series.clone()),
            // AdjustedClose falls back to raw close with deterministic
            // split/dividend back-adjustment.
            None if metric == Metric::AdjustedClose => {
                let close = per_metric.get(&Metric::Close)?;
                Some(adjust_close(close, &store.actions, security))
            }
            None => None,
        }
    }
}

#[async_trait]
impl MetricService for InMemoryMetricService {
    async fn metrics(
        &self,
        ctx: &Ctx,
        securities: &[Arc<Security>],
        metrics: &[Metric],
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SecurityFrames, DataError> {
        ctx.check()?;
        let store = self.inner.read();
        let calendar = MarketCalendar::nyse();
        let begin_date = eastern_date(begin);
        let end_date = eastern_date(end);

        let mut frames = IndexMap::new();
        let mut total_rows = 0usize;

        for security in securities {
            if !store.series.contains_key(&security.composite_figi) {
                return Err(DataError::SecurityNotFound(security.composite_figi.clone()));
            }

            let per_metric = metrics
                .iter()
                .map(|metric| (*metric, Self::security_series(&store, security, *metric)))
                .collect::<Vec<_>>();

            // Union of observation dates across the requested metrics.
            let mut dates = per_metric
                .iter()
                .filter_map(|(_, series)| series.as_ref())
                .flat_map(|series| series.range(begin_date..=end_date).map(|(date, _)| *date))
                .collect::<Vec<_>>();
            dates.sort_unstable();
            dates.dedup();
            total_rows += dates.len();

            let index = dates
                .iter()
                .map(|date| calendar.close_instant(*date))
                .collect::<Vec<_>>();
            let names = metrics
                .iter()
                .map(|metric| column_name(security, *metric))
                .collect::<Vec<_>>();
            let cols = per_metric
                .iter()
                .map(|(_, series)| {
                    dates
                        .iter()
                        .map(|date| {
                            series
                                .as_ref()
                                .and_then(|s| s.get(date).copied())
                                .unwrap_or(f64::NAN)
                        })
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>();

            frames.insert(
                Arc::clone(security),
                Frame::from_columns(index, names, cols)?,
            );
        }

        if total_rows == 0 {
            return Err(DataError::Unavailable { begin, end });
        }

        Ok(SecurityFrames::new(frames))
    }

    async fn risk_free_rate(
        &self,
        ctx: &Ctx,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Frame, DataError> {
        ctx.check()?;
        let store = self.inner.read();
        let calendar = MarketCalendar::nyse();

        let (dates, values): (Vec<_>, Vec<_>) = store
            .risk_free
            .range(eastern_date(begin)..=eastern_date(end))
            .map(|(date, value)| (calendar.close_instant(*date), *value))
            .unzip();

        Ok(Frame::single(dates, "risk_free", values)?)
    }

    async fn corporate_actions(
        &self,
        ctx: &Ctx,
        securities: &[Arc<Security>],
        begin: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CorporateAction>, DataError> {
        ctx.check()?;
        let store = self.inner.read();

        let mut actions = store
            .actions
            .iter()
            .filter(|action| {
                action.date >= begin
                    && action.date <= end
                    && securities.iter().any(|s| **s == action.security)
            })
            .cloned()
            .collect::<Vec<_>>();
        sort_actions(&mut actions);
        Ok(actions)
    }
}

/// Back-adjust a raw close series for splits and dividends: each observation
/// is scaled by the product of the adjustment factors of every action dated
/// strictly after it.
fn adjust_close(
    close: &BTreeMap<NaiveDate, f64>,
    actions: &[CorporateAction],
    security: &Security,
) -> BTreeMap<NaiveDate, f64> {
    let mut relevant = actions
        .iter()
        .filter(|action| action.security == *security)
        .cloned()
        .collect::<Vec<_>>();
    sort_actions(&mut relevant);

    close
        .iter()
        .map(|(date, value)| {
            let factor: f64 = relevant
                .iter()
                .filter(|action| action.date > *date)
                .map(|action| match action.kind {
                    ActionKind::Split { ratio } => 1.0 / ratio,
                    ActionKind::Dividend { amount } => {
                        // Scale by the close preceding the ex-date.
                        match close.range(..action.date).next_back() {
                            Some((_, prev_close)) if *prev_close > 0.0 => {
                                1.0 - amount / prev_close
                            }
                            _ => 1.0,
                        }
                    }
                })
                .product();
            (*date, value * factor)
        })
        .collect()
}

/// Deterministic in-memory [`RatingService`].
#[derive(Debug, Default)]
pub struct InMemoryRatingService {
    rankings: RwLock<BTreeMap<NaiveDate, Vec<Arc<Security>>>>,
}

impl InMemoryRatingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the ranked security list (market-cap descending) as of a date.
    pub fn insert_ranking(&self, date: NaiveDate, securities: Vec<Arc<Security>>) {
        self.rankings.write().insert(date, securities);
    }
}

#[async_trait]
impl RatingService for InMemoryRatingService {
    async fn top_ranked(
        &self,
        ctx: &Ctx,
        date: NaiveDate,
        count: usize,
    ) -> Result<Vec<Arc<Security>>, DataError> {
        ctx.check()?;
        Ok(self
            .rankings
            .read()
            .range(..=date)
            .next_back()
            .map(|(_, ranked)| ranked.iter().take(count).cloned().collect())
            .unwrap_or_default())
    }
}
