use crate::{
    performance::{Measurement, Performance},
    portfolio::{Portfolio, transaction::Transaction},
    repository::{MetricsRow, Repository, RepositoryTx, error::RepositoryError},
};
use async_trait::async_trait;
use chrono::NaiveDate;
use fnv::FnvHashMap;
use folio_calendar::eastern_date;
use folio_data::Ctx;
use parking_lot::RwLock;
use std::{collections::BTreeMap, sync::Arc};
use tracing::debug;
use uuid::Uuid;

/// In-memory repository for tests and fixtures. Implements the full
/// transactional contract with staged writes published atomically on commit.
/// **Do not use in production - no durability guarantees!**
#[derive(Debug, Default, Clone)]
pub struct InMemoryRepository {
    store: Arc<RwLock<Store>>,
}

#[derive(Debug, Default)]
struct Store {
    portfolios: FnvHashMap<Uuid, (String, Portfolio)>,
    ledgers: FnvHashMap<Uuid, Vec<Transaction>>,
    measurements: FnvHashMap<Uuid, BTreeMap<NaiveDate, Measurement>>,
    performances: FnvHashMap<Uuid, Performance>,
    metrics: FnvHashMap<Uuid, MetricsRow>,
}

#[derive(Debug)]
enum Staged {
    Portfolio(Portfolio, bool),
    Transactions(Uuid, Vec<Transaction>),
    Measurements(Performance),
    Metrics(Performance),
}

/// One open transaction over the in-memory store.
#[derive(Debug)]
pub struct InMemoryTx {
    store: Arc<RwLock<Store>>,
    user: String,
    staged: Vec<Staged>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed ledger of a portfolio, for assertions.
    pub fn ledger(&self, portfolio_id: Uuid) -> Vec<Transaction> {
        self.store
            .read()
            .ledgers
            .get(&portfolio_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Committed measurement count of a portfolio, for assertions.
    pub fn measurement_count(&self, portfolio_id: Uuid) -> usize {
        self.store
            .read()
            .measurements
            .get(&portfolio_id)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Committed metrics rows, as consumed by the metric-cache refresh task.
    pub fn metrics_rows(&self) -> Vec<MetricsRow> {
        self.store.read().metrics.values().cloned().collect()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn begin_tx(
        &self,
        ctx: &Ctx,
        user: &str,
    ) -> Result<Box<dyn RepositoryTx>, RepositoryError> {
        ctx.check()?;
        Ok(Box::new(InMemoryTx {
            store: Arc::clone(&self.store),
            user: user.to_string(),
            staged: Vec::new(),
        }))
    }
}

#[async_trait]
impl RepositoryTx for InMemoryTx {
    async fn load_portfolio(
        &mut self,
        ctx: &Ctx,
        id: Uuid,
        user: &str,
    ) -> Result<Portfolio, RepositoryError> {
        ctx.check()?;
        let store = self.store.read();
        let (owner, portfolio) = store
            .portfolios
            .get(&id)
            .ok_or(RepositoryError::ExpectedDataNotPresent)?;
        if owner != user {
            return Err(RepositoryError::Unauthorized(user.to_string()));
        }
        let mut portfolio = portfolio.clone();
        if let Some(ledger) = store.ledgers.get(&id) {
            portfolio.transactions = ledger.clone();
        }
        Ok(portfolio)
    }

    async fn load_transactions(
        &mut self,
        ctx: &Ctx,
        portfolio_id: Uuid,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        ctx.check()?;
        Ok(self
            .store
            .read()
            .ledgers
            .get(&portfolio_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn load_measurements(
        &mut self,
        ctx: &Ctx,
        portfolio_id: Uuid,
    ) -> Result<Vec<Measurement>, RepositoryError> {
        ctx.check()?;
        Ok(self
            .store
            .read()
            .measurements
            .get(&portfolio_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn load_performance(
        &mut self,
        ctx: &Ctx,
        portfolio_id: Uuid,
        user: &str,
    ) -> Result<Performance, RepositoryError> {
        ctx.check()?;
        let store = self.store.read();
        let (owner, _) = store
            .portfolios
            .get(&portfolio_id)
            .ok_or(RepositoryError::ExpectedDataNotPresent)?;
        if owner != user {
            return Err(RepositoryError::Unauthorized(user.to_string()));
        }
        store
            .performances
            .get(&portfolio_id)
            .cloned()
            .ok_or(RepositoryError::ExpectedDataNotPresent)
    }

    async fn save_portfolio(
        &mut self,
        ctx: &Ctx,
        portfolio: &Portfolio,
        permanent: bool,
    ) -> Result<(), RepositoryError> {
        ctx.check()?;
        self.staged
            .push(Staged::Portfolio(portfolio.clone(), permanent));
        Ok(())
    }

    async fn save_transactions(
        &mut self,
        ctx: &Ctx,
        portfolio: &Portfolio,
    ) -> Result<(), RepositoryError> {
        ctx.check()?;
        self.staged.push(Staged::Transactions(
            portfolio.id,
            portfolio.transactions.clone(),
        ));
        Ok(())
    }

    async fn save_measurements(
        &mut self,
        ctx: &Ctx,
        performance: &Performance,
    ) -> Result<(), RepositoryError> {
        ctx.check()?;
        self.staged.push(Staged::Measurements(performance.clone()));
        Ok(())
    }

    async fn save_metrics(
        &mut self,
        ctx: &Ctx,
        performance: &Performance,
    ) -> Result<(), RepositoryError> {
        ctx.check()?;
        self.staged.push(Staged::Metrics(performance.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>, ctx: &Ctx) -> Result<(), RepositoryError> {
        ctx.check()?;
        let mut store = self.store.write();
        debug!(user = %self.user, writes = self.staged.len(), "committing repository tx");

        for staged in self.staged {
            match staged {
                Staged::Portfolio(mut portfolio, permanent) => {
                    if permanent {
                        portfolio.temporary = false;
                    }
                    store
                        .portfolios
                        .insert(portfolio.id, (self.user.clone(), portfolio));
                }
                Staged::Transactions(portfolio_id, transactions) => {
                    let ledger = store.ledgers.entry(portfolio_id).or_default();
                    for transaction in transactions {
                        // Uniqueness on (portfolio_id, source_id): do
                        // nothing on conflict.
                        if !ledger
                            .iter()
                            .any(|existing| existing.source_id == transaction.source_id)
                        {
                            ledger.push(transaction);
                        }
                    }
                    ledger.sort_by(|a, b| {
                        (a.date, a.sequence_num).cmp(&(b.date, b.sequence_num))
                    });
                }
                Staged::Measurements(performance) => {
                    let rows = store
                        .measurements
                        .entry(performance.portfolio_id)
                        .or_default();
                    for measurement in &performance.measurements {
                        rows.insert(eastern_date(measurement.time), measurement.clone());
                    }
                    store
                        .performances
                        .insert(performance.portfolio_id, performance);
                }
                Staged::Metrics(performance) => {
                    let Some(metrics) = performance.portfolio_metrics.clone() else {
                        continue;
                    };
                    let shortcode = store
                        .portfolios
                        .get(&performance.portfolio_id)
                        .map(|(_, portfolio)| portfolio.strategy_shortcode.clone())
                        .unwrap_or_default();
                    store.metrics.insert(
                        performance.portfolio_id,
                        MetricsRow {
                            portfolio_id: performance.portfolio_id,
                            strategy_shortcode: shortcode,
                            metrics,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        debug!(user = %self.user, discarded = self.staged.len(), "rolled back repository tx");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn close(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn portfolio() -> Portfolio {
        Portfolio::new("repo-test", close("2020-06-01T20:00:00Z"), 10_000.0)
    }

    #[tokio::test]
    async fn test_commit_publishes_and_rollback_discards() {
        let repository = InMemoryRepository::new();
        let ctx = Ctx::background();
        let portfolio = portfolio();
        let id = portfolio.id;

        // Rolled-back writes never land.
        let mut tx = repository.begin_tx(&ctx, "alice").await.unwrap();
        tx.save_portfolio(&ctx, &portfolio, false).await.unwrap();
        tx.rollback().await.unwrap();
        let mut tx = repository.begin_tx(&ctx, "alice").await.unwrap();
        assert!(tx.load_portfolio(&ctx, id, "alice").await.is_err());

        // Committed writes are visible.
        tx.save_portfolio(&ctx, &portfolio, true).await.unwrap();
        tx.save_transactions(&ctx, &portfolio).await.unwrap();
        tx.commit(&ctx).await.unwrap();

        let mut tx = repository.begin_tx(&ctx, "alice").await.unwrap();
        let loaded = tx.load_portfolio(&ctx, id, "alice").await.unwrap();
        assert_eq!(loaded.name, "repo-test");
        assert!(!loaded.temporary);
        assert_eq!(loaded.transactions.len(), 1);
    }

    #[tokio::test]
    async fn test_transactions_upsert_does_nothing_on_conflict() {
        let repository = InMemoryRepository::new();
        let ctx = Ctx::background();
        let portfolio = portfolio();

        let mut tx = repository.begin_tx(&ctx, "alice").await.unwrap();
        tx.save_transactions(&ctx, &portfolio).await.unwrap();
        tx.save_transactions(&ctx, &portfolio).await.unwrap();
        tx.commit(&ctx).await.unwrap();

        assert_eq!(repository.ledger(portfolio.id).len(), 1);
    }

    #[tokio::test]
    async fn test_row_level_security_by_user() {
        let repository = InMemoryRepository::new();
        let ctx = Ctx::background();
        let portfolio = portfolio();
        let id = portfolio.id;

        let mut tx = repository.begin_tx(&ctx, "alice").await.unwrap();
        tx.save_portfolio(&ctx, &portfolio, false).await.unwrap();
        tx.commit(&ctx).await.unwrap();

        let mut tx = repository.begin_tx(&ctx, "mallory").await.unwrap();
        assert!(matches!(
            tx.load_portfolio(&ctx, id, "mallory").await,
            Err(RepositoryError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_measurements_upsert_by_event_date() {
        let repository = InMemoryRepository::new();
        let ctx = Ctx::background();
        let portfolio = portfolio();

        let mut performance = Performance::new(&portfolio);
        performance.measurements.push(Measurement {
            time: close("2020-06-01T20:00:00Z"),
            holdings: serde_json::Value::Null,
            justification: serde_json::Value::Null,
            value: 1.0,
            percent_return: 0.0,
            risk_free_value: 0.0,
            total_deposited_to_date: 0.0,
            total_withdrawn_to_date: 0.0,
            ulcer_index: f64::NAN,
            strategy_growth_of_10k: 10_000.0,
            benchmark_growth_of_10k: f64::NAN,
            risk_free_growth_of_10k: 10_000.0,
        });

        let mut tx = repository.begin_tx(&ctx, "alice").await.unwrap();
        tx.save_measurements(&ctx, &performance).await.unwrap();
        tx.commit(&ctx).await.unwrap();

        // Re-saving the same event date replaces, not duplicates.
        performance.measurements[0].value = 2.0;
        let mut tx = repository.begin_tx(&ctx, "alice").await.unwrap();
        tx.save_measurements(&ctx, &performance).await.unwrap();
        tx.commit(&ctx).await.unwrap();

        assert_eq!(repository.measurement_count(portfolio.id), 1);
    }

    #[tokio::test]
    async fn test_cancelled_ctx_blocks_tx() {
        let repository = InMemoryRepository::new();
        let (ctx, handle) = Ctx::with_cancel();
        handle.cancel();

        assert!(matches!(
            repository.begin_tx(&ctx, "alice").await,
            Err(RepositoryError::Ctx(_))
        ));
    }
}
