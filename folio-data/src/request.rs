use crate::{ctx::Ctx, error::DataError, metric::{Metric, column_name}, service::MetricService};
use chrono::{DateTime, NaiveDate, Utc};
use folio_calendar::eastern_date;
use folio_frame::{Frame, FrameError};
use folio_instrument::Security;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::debug;

/// Builder for a metric request over a security set.
///
/// ```ignore
/// let frames = DataRequest::new(securities)
///     .metrics([Metric::AdjustedClose])
///     .between(begin, end)
///     .fetch(&ctx, service)
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct DataRequest {
    securities: Vec<Arc<Security>>,
    metrics: Vec<Metric>,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DataRequest {
    /// Start a request for the provided securities. Defaults to
    /// [`Metric::AdjustedClose`]; [`Self::between`] must be called before
    /// fetching.
    pub fn new<I>(securities: I) -> Self
    where
        I: IntoIterator<Item = Arc<Security>>,
    {
        Self {
            securities: securities.into_iter().collect(),
            metrics: vec![Metric::AdjustedClose],
            begin: DateTime::UNIX_EPOCH,
            end: DateTime::UNIX_EPOCH,
        }
    }

    /// Replace the requested metric set.
    pub fn metrics<I>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = Metric>,
    {
        self.metrics = metrics.into_iter().collect();
        self
    }

    /// Set the inclusive request range.
    pub fn between(mut self, begin: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.begin = begin;
        self.end = end;
        self
    }

    /// Execute the request against a [`MetricService`].
    pub async fn fetch(
        &self,
        ctx: &Ctx,
        service: &dyn MetricService,
    ) -> Result<SecurityFrames, DataError> {
        if self.begin >= self.end {
            return Err(DataError::Unavailable {
                begin: self.begin,
                end: self.end,
            });
        }

        debug!(
            securities = self.securities.len(),
            metrics = ?self.metrics,
            begin = %self.begin,
            end = %self.end,
            "requesting metrics"
        );

        service
            .metrics(ctx, &self.securities, &self.metrics, self.begin, self.end)
            .await
    }
}

/// Result of a metric request: one [`Frame`] per security (a column per
/// requested metric), doubling as an in-memory cache for row lookups.
#[derive(Debug, Clone, Default)]
pub struct SecurityFrames {
    frames: IndexMap<Arc<Security>, Frame>,
}

impl SecurityFrames {
    pub fn new(frames: IndexMap<Arc<Security>, Frame>) -> Self {
        Self { frames }
    }

    /// Frame of a single security.
    pub fn get(&self, security: &Security) -> Option<&Frame> {
        self.frames.get(security)
    }

    /// Every `(security, frame)` pair, in request order.
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<Security>, &Frame)> {
        self.frames.iter()
    }

    /// Securities present, in request order.
    pub fn securities(&self) -> impl Iterator<Item = &Arc<Security>> {
        self.frames.keys()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Merge every per-security frame into one multi-column frame over the
    /// common date range.
    pub fn merged(&self) -> Result<Frame, FrameError> {
        Frame::align(self.frames.values().cloned())
    }

    /// Single-row lookup: every frame trimmed to the provided Eastern date.
    pub fn on(&self, date: NaiveDate) -> SecurityFrames {
        Self {
            frames: self
                .frames
                .iter()
                .map(|(security, frame)| (Arc::clone(security), frame.trim(date, date)))
                .collect(),
        }
    }

    /// Metric value of a security on the exact Eastern date.
    pub fn value_on(&self, security: &Security, date: NaiveDate, metric: Metric) -> Option<f64> {
        let frame = self.frames.get(security)?;
        let column = frame.column(&column_name(security, metric))?;
        let row = frame
            .dates()
            .iter()
            .position(|d| eastern_date(*d) == date)?;
        let value = column[row];
        (!value.is_nan()).then_some(value)
    }

    /// Metric value of a security on the latest row at or before the Eastern
    /// date, skipping NaN cells.
    pub fn value_on_or_before(
        &self,
        security: &Security,
        date: NaiveDate,
        metric: Metric,
    ) -> Option<f64> {
        let frame = self.frames.get(security)?;
        let column = frame.column(&column_name(security, metric))?;
        let mut row = frame.dates().partition_point(|d| eastern_date(*d) <= date);
        while row > 0 {
            row -= 1;
            if !column[row].is_nan() {
                return Some(column[row]);
            }
        }
        None
    }
}

impl IntoIterator for SecurityFrames {
    type Item = (Arc<Security>, Frame);
    type IntoIter = indexmap::map::IntoIter<Arc<Security>, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}
