use crate::{
    error::FolioError,
    performance::Performance,
    portfolio::Portfolio,
    repository::Repository,
};
use chrono::{DateTime, Utc};
use folio_data::{Ctx, MetricService, RatingService};
use folio_instrument::Security;
use folio_strategy::{ComputeCtx, StrategyError, registry};
use serde_json::Value;
use smol_str::SmolStr;
use tracing::{error, info};
use uuid::Uuid;

/// Cash every backtest simulation starts with.
pub const INITIAL_CASH: f64 = 10_000.0;

/// External collaborators a simulation runs against.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub data: &'a dyn MetricService,
    pub ratings: &'a dyn RatingService,
}

impl std::fmt::Debug for Services<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// One backtest request: `(strategy, arguments, range, benchmark)`.
#[derive(Debug, Clone)]
pub struct BacktestArgs {
    pub shortcode: SmolStr,
    pub arguments: Value,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub benchmark: Option<Security>,
}

/// Result of a backtest: the materialised portfolio and its performance.
#[derive(Debug, Clone)]
pub struct Backtest {
    pub portfolio: Portfolio,
    pub performance: Performance,
}

/// Run one backtest: strategy lookup, plan computation, portfolio
/// materialisation, performance calculation, metrics bundle.
pub async fn backtest(
    ctx: &Ctx,
    services: &Services<'_>,
    args: BacktestArgs,
) -> Result<Backtest, FolioError> {
    let info = registry().lookup(&args.shortcode)?;
    let arguments = args.arguments.as_object().cloned().unwrap_or_default();
    let strategy = info.build(&arguments)?;

    info!(shortcode = %args.shortcode, begin = %args.begin, end = %args.end, "running backtest");

    let compute = ComputeCtx {
        ctx,
        data: services.data,
        ratings: services.ratings,
    };
    let (plan, prediction) = strategy.compute(&compute, args.begin, args.end).await?;
    let first = plan
        .first()
        .ok_or(FolioError::Strategy(StrategyError::EmptyPlan))?;

    let mut portfolio = Portfolio::new(info.name.clone(), first.date, INITIAL_CASH);
    portfolio.strategy_shortcode = args.shortcode.clone();
    portfolio.strategy_arguments = args.arguments.clone();
    portfolio.benchmark = args.benchmark.clone().or_else(|| Some(info.benchmark.clone()));
    portfolio.set_status("simulating");
    portfolio.target_portfolio(ctx, services.data, &plan).await?;
    portfolio.predicted_assets = Some(prediction);
    portfolio.end_date = Some(args.end);

    let mut performance = Performance::new(&portfolio);
    performance
        .calculate_through(ctx, &portfolio, services.data, args.end)
        .await?;
    performance.portfolio_metrics = Some(performance.build_metrics_bundle(&portfolio));
    portfolio.set_status("complete");

    Ok(Backtest {
        portfolio,
        performance,
    })
}

/// Extend many portfolios through `through`, recomputing performance and
/// persisting each under its own repository transaction. Errors are isolated
/// per portfolio: one failure rolls back and skips that portfolio without
/// aborting the batch. Returns the ids that failed.
pub async fn update_portfolios(
    ctx: &Ctx,
    services: &Services<'_>,
    repository: &dyn Repository,
    requests: &[(SmolStr, Uuid)],
    through: DateTime<Utc>,
) -> Result<Vec<Uuid>, FolioError> {
    let mut failed = Vec::new();

    for (user, portfolio_id) in requests {
        ctx.check()?;
        if let Err(err) =
            update_one(ctx, services, repository, user, *portfolio_id, through).await
        {
            error!(%portfolio_id, %err, "portfolio update failed; skipping");
            failed.push(*portfolio_id);
        }
    }

    Ok(failed)
}

pub(crate) async fn update_one(
    ctx: &Ctx,
    services: &Services<'_>,
    repository: &dyn Repository,
    user: &str,
    portfolio_id: Uuid,
    through: DateTime<Utc>,
) -> Result<(), FolioError> {
    let mut tx = repository.begin_tx(ctx, user).await?;

    let result = async {
        let mut portfolio = tx.load_portfolio(ctx, portfolio_id, user).await?;
        portfolio
            .update_transactions(ctx, services.data, services.ratings, through)
            .await?;

        let mut performance = Performance::new(&portfolio);
        performance
            .calculate_through(ctx, &portfolio, services.data, through)
            .await?;
        performance.portfolio_metrics = Some(performance.build_metrics_bundle(&portfolio));

        tx.save_portfolio(ctx, &portfolio, true).await?;
        tx.save_transactions(ctx, &portfolio).await?;
        tx.save_measurements(ctx, &performance).await?;
        tx.save_metrics(ctx, &performance).await?;
        Ok::<(), FolioError>(())
    }
    .await;

    match result {
        Ok(()) => {
            tx.commit(ctx).await?;
            Ok(())
        }
        Err(err) => {
            // Roll back before surfacing; partial state must not land.
            let _ = tx.rollback().await;
            Err(err)
        }
    }
}
