use crate::{actions::CorporateAction, ctx::Ctx, error::DataError, metric::Metric,
    request::SecurityFrames};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use folio_frame::Frame;
use folio_instrument::Security;
use std::sync::Arc;

/// End-of-day price/metric provider. External collaborator: the engine core
/// specifies only this contract and its error taxonomy, never storage.
///
/// Contract:
/// * unknown securities fail with [`DataError::SecurityNotFound`];
/// * all dates are interpreted in US Eastern and rows are stamped at the
///   regular session close;
/// * served columns follow the `"<composite_figi>:<metric>"` convention;
/// * `AdjustedClose` is split-adjusted and dividend-handled, `Close` is raw,
///   and corporate actions merge deterministically so re-runs produce
///   identical ledgers.
#[async_trait]
pub trait MetricService: Send + Sync {
    /// Load the requested metrics for a security set over `[begin, end]`.
    async fn metrics(
        &self,
        ctx: &Ctx,
        securities: &[Arc<Security>],
        metrics: &[Metric],
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SecurityFrames, DataError>;

    /// Annualised risk-free percent rate over `[begin, end]`, one column
    /// named `risk_free`.
    async fn risk_free_rate(
        &self,
        ctx: &Ctx,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Frame, DataError>;

    /// Corporate actions for a security set dated in `[begin, end]`, in
    /// deterministic application order.
    async fn corporate_actions(
        &self,
        ctx: &Ctx,
        securities: &[Arc<Security>],
        begin: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CorporateAction>, DataError>;
}

/// Security rating provider backing the MDEP strategy. External collaborator.
#[async_trait]
pub trait RatingService: Send + Sync {
    /// The top `count` rank-1 securities on `date`, sorted by market cap
    /// descending.
    async fn top_ranked(
        &self,
        ctx: &Ctx,
        date: NaiveDate,
        count: usize,
    ) -> Result<Vec<Arc<Security>>, DataError>;
}
