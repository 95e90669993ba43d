use crate::{
    performance::{Measurement, Performance, metrics::PortfolioMetrics},
    portfolio::{Portfolio, transaction::Transaction},
    repository::error::RepositoryError,
};
use async_trait::async_trait;
use folio_data::Ctx;
use uuid::Uuid;

/// Defines all possible errors raised by the persistence bridge.
pub mod error;

/// In-memory reference implementation.
pub mod in_memory;

/// External collaborator: a transactional key/row store with per-user roles.
/// The engine core specifies only this contract; row-level security is
/// assumed on the storage side.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Open a per-user transaction.
    async fn begin_tx(
        &self,
        ctx: &Ctx,
        user: &str,
    ) -> Result<Box<dyn RepositoryTx>, RepositoryError>;
}

/// One open repository transaction. A crash before [`Self::commit`] leaves
/// prior committed state intact; [`Self::rollback`] discards staged writes.
#[async_trait]
pub trait RepositoryTx: Send {
    async fn load_portfolio(
        &mut self,
        ctx: &Ctx,
        id: Uuid,
        user: &str,
    ) -> Result<Portfolio, RepositoryError>;

    async fn load_transactions(
        &mut self,
        ctx: &Ctx,
        portfolio_id: Uuid,
    ) -> Result<Vec<Transaction>, RepositoryError>;

    async fn load_measurements(
        &mut self,
        ctx: &Ctx,
        portfolio_id: Uuid,
    ) -> Result<Vec<Measurement>, RepositoryError>;

    async fn load_performance(
        &mut self,
        ctx: &Ctx,
        portfolio_id: Uuid,
        user: &str,
    ) -> Result<Performance, RepositoryError>;

    /// Upsert the portfolio row. `permanent` clears the temporary flag.
    async fn save_portfolio(
        &mut self,
        ctx: &Ctx,
        portfolio: &Portfolio,
        permanent: bool,
    ) -> Result<(), RepositoryError>;

    /// Upsert the ledger by `(portfolio_id, source_id)`, do nothing on
    /// conflict.
    async fn save_transactions(
        &mut self,
        ctx: &Ctx,
        portfolio: &Portfolio,
    ) -> Result<(), RepositoryError>;

    /// Upsert measurements by `(portfolio_id, event_date)`.
    async fn save_measurements(
        &mut self,
        ctx: &Ctx,
        performance: &Performance,
    ) -> Result<(), RepositoryError>;

    /// Upsert the metrics bundle.
    async fn save_metrics(
        &mut self,
        ctx: &Ctx,
        performance: &Performance,
    ) -> Result<(), RepositoryError>;

    /// Publish every staged write atomically.
    async fn commit(self: Box<Self>, ctx: &Ctx) -> Result<(), RepositoryError>;

    /// Discard every staged write.
    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Latest saved metrics bundle per strategy shortcode, as read by the metric
/// cache refresh task.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRow {
    pub portfolio_id: Uuid,
    pub strategy_shortcode: smol_str::SmolStr,
    pub metrics: PortfolioMetrics,
}
