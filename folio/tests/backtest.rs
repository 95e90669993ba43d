use chrono::{DateTime, NaiveDate, Utc};
use folio::{
    backtest::{Backtest, BacktestArgs, Services, backtest, update_portfolios},
    portfolio::transaction::TransactionKind,
    queue::{InMemoryWorkQueue, SimulationRequest},
    repository::{Repository, in_memory::InMemoryRepository},
    worker::{WorkerReport, run_worker},
};
use folio_calendar::{MarketCalendar, eastern_date};
use folio_data::{Ctx, InMemoryMetricService, InMemoryRatingService, Metric};
use folio_instrument::Security;
use smol_str::SmolStr;

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn close(date: NaiveDate) -> DateTime<Utc> {
    MarketCalendar::nyse().close_instant(date)
}

fn month_end(year: i32, month: u32) -> NaiveDate {
    MarketCalendar::nyse().last_trading_day_of_month(year, month)
}

/// Seed month-end closes for the default ADM universe: VFINX compounds up 2%
/// a month through March 2020 and falls 5% a month afterwards, PRIDX falls
/// throughout, VUSTX stays flat.
fn seed(data: &InMemoryMetricService) {
    let vfinx = Security::from_parts("VFINX", "BBG000BHTMY2");
    let pridx = Security::from_parts("PRIDX", "BBG000BQVRY9");
    let vustx = Security::from_parts("VUSTX", "BBG000BCKYB9");

    let mut vfinx_points = Vec::new();
    let mut pridx_points = Vec::new();
    let mut vustx_points = Vec::new();
    let mut rf_points = Vec::new();

    let mut vfinx_price = 100.0;
    let mut pridx_price = 100.0;
    for month_offset in 0..20 {
        let year = 2019 + (month_offset / 12) as i32;
        let month = (month_offset % 12) as u32 + 1;
        let date = month_end(year, month);

        vfinx_price *= if month_offset < 15 { 1.02 } else { 0.95 };
        pridx_price *= 0.99;

        vfinx_points.push((date, vfinx_price));
        pridx_points.push((date, pridx_price));
        vustx_points.push((date, 100.0));
        rf_points.push((date, 0.0));
    }

    data.insert_series(&vfinx, Metric::Close, vfinx_points);
    data.insert_series(&pridx, Metric::Close, pridx_points);
    data.insert_series(&vustx, Metric::Close, vustx_points);
    data.insert_risk_free(rf_points);
}

fn args(begin: NaiveDate, end: NaiveDate) -> BacktestArgs {
    BacktestArgs {
        shortcode: SmolStr::new("adm"),
        arguments: serde_json::Value::Null,
        begin: close(begin),
        end: close(end),
        benchmark: None,
    }
}

async fn run(data: &InMemoryMetricService, end: NaiveDate) -> Backtest {
    let ratings = InMemoryRatingService::new();
    let services = Services {
        data,
        ratings: &ratings,
    };
    backtest(
        &Ctx::background(),
        &services,
        args(ymd(2019, 10, 1), end),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_backtest_produces_ledger_and_measurements() {
    let data = InMemoryMetricService::new();
    seed(&data);

    let result = run(&data, ymd(2020, 3, 31)).await;

    // Plan starts at the October 2019 month end with the initial deposit and
    // a full-weight VFINX buy.
    assert_eq!(
        eastern_date(result.portfolio.start_date),
        month_end(2019, 10)
    );
    assert_eq!(result.portfolio.transactions[0].kind, TransactionKind::Deposit);
    assert_eq!(result.portfolio.transactions[1].kind, TransactionKind::Buy);
    assert_eq!(
        result.portfolio.transactions[1]
            .security
            .as_ref()
            .unwrap()
            .ticker,
        "VFINX"
    );

    // Ledger monotonicity.
    for pair in result.portfolio.transactions.windows(2) {
        assert!((pair[0].date, pair[0].sequence_num) < (pair[1].date, pair[1].sequence_num));
    }

    // One measurement per trading day from inception through the end date.
    let expected_days = folio_calendar::Schedule::daily_close()
        .between(result.portfolio.start_date, close(ymd(2020, 3, 31)))
        .unwrap()
        .len();
    assert_eq!(result.performance.measurements.len(), expected_days);

    // Day zero marks at the initial cash; metrics bundle is attached.
    let first = &result.performance.measurements[0];
    assert!((first.value - 10_000.0).abs() < 1e-6);
    assert_eq!(first.percent_return, 0.0);
    assert!(result.performance.portfolio_metrics.is_some());

    // The prediction targets the next scheduled month end.
    let prediction = result.portfolio.predicted_assets.as_ref().unwrap();
    assert_eq!(eastern_date(prediction.date), month_end(2020, 4));
}

#[tokio::test]
async fn test_backtest_rerun_is_deterministic() {
    let data = InMemoryMetricService::new();
    seed(&data);

    let first = run(&data, ymd(2020, 3, 31)).await;
    let second = run(&data, ymd(2020, 3, 31)).await;

    // Portfolio ids differ; the simulated economics must not.
    let ledger = |result: &Backtest| {
        result
            .portfolio
            .transactions
            .iter()
            .map(|t| {
                (
                    t.date,
                    t.kind,
                    t.security.as_ref().map(|s| s.composite_figi.clone()),
                    t.shares.to_bits(),
                    t.total_value.to_bits(),
                )
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(ledger(&first), ledger(&second));

    let values = |result: &Backtest| {
        result
            .performance
            .measurements
            .iter()
            .map(|m| (m.time, m.value.to_bits(), m.percent_return.to_bits()))
            .collect::<Vec<_>>()
    };
    assert_eq!(values(&first), values(&second));
}

#[tokio::test]
async fn test_unknown_shortcode_fails() {
    let data = InMemoryMetricService::new();
    let ratings = InMemoryRatingService::new();
    let services = Services {
        data: &data,
        ratings: &ratings,
    };

    let mut bad = args(ymd(2019, 10, 1), ymd(2020, 3, 31));
    bad.shortcode = SmolStr::new("nope");

    let result = backtest(&Ctx::background(), &services, bad).await;
    assert!(matches!(
        result,
        Err(folio::FolioError::Strategy(
            folio_strategy::StrategyError::UnknownStrategy(_)
        ))
    ));
}

#[tokio::test]
async fn test_update_extends_ledger_append_only_and_idempotent() {
    let data = InMemoryMetricService::new();
    seed(&data);
    let ratings = InMemoryRatingService::new();
    let services = Services {
        data: &data,
        ratings: &ratings,
    };
    let repository = InMemoryRepository::new();
    let ctx = Ctx::background();

    // Simulate through March 2020 and persist.
    let mut result = run(&data, ymd(2020, 3, 31)).await;
    result.portfolio.user_id = SmolStr::new("alice");
    let portfolio_id = result.portfolio.id;
    let mut tx = repository.begin_tx(&ctx, "alice").await.unwrap();
    tx.save_portfolio(&ctx, &result.portfolio, true).await.unwrap();
    tx.save_transactions(&ctx, &result.portfolio).await.unwrap();
    tx.save_measurements(&ctx, &result.performance).await.unwrap();
    tx.commit(&ctx).await.unwrap();

    let before = repository.ledger(portfolio_id);

    // Extend through August 2020: VFINX momentum turned negative, the
    // strategy rotates into VUSTX, producing fresh SELL/BUY entries.
    let failed = update_portfolios(
        &ctx,
        &services,
        &repository,
        &[(SmolStr::new("alice"), portfolio_id)],
        close(ymd(2020, 8, 31)),
    )
    .await
    .unwrap();
    assert!(failed.is_empty());

    let after = repository.ledger(portfolio_id);
    assert!(after.len() > before.len());

    // Pre-existing entries are untouched.
    for (old, new) in before.iter().zip(&after) {
        assert_eq!(old, new);
    }
    assert!(
        after
            .iter()
            .any(|t| t.kind == TransactionKind::Sell
                && t.security.as_ref().unwrap().ticker == "VFINX")
    );
    assert!(
        after
            .iter()
            .any(|t| t.kind == TransactionKind::Buy
                && t.security.as_ref().unwrap().ticker == "VUSTX")
    );

    // A second identical update introduces nothing new.
    let failed = update_portfolios(
        &ctx,
        &services,
        &repository,
        &[(SmolStr::new("alice"), portfolio_id)],
        close(ymd(2020, 8, 31)),
    )
    .await
    .unwrap();
    assert!(failed.is_empty());
    assert_eq!(repository.ledger(portfolio_id).len(), after.len());
}

#[tokio::test]
async fn test_worker_acks_only_after_commit() {
    let data = InMemoryMetricService::new();
    seed(&data);
    let ratings = InMemoryRatingService::new();
    let services = Services {
        data: &data,
        ratings: &ratings,
    };
    let repository = InMemoryRepository::new();
    let ctx = Ctx::background();

    let mut result = run(&data, ymd(2020, 3, 31)).await;
    result.portfolio.user_id = SmolStr::new("alice");
    let portfolio_id = result.portfolio.id;
    let mut tx = repository.begin_tx(&ctx, "alice").await.unwrap();
    tx.save_portfolio(&ctx, &result.portfolio, true).await.unwrap();
    tx.save_transactions(&ctx, &result.portfolio).await.unwrap();
    tx.commit(&ctx).await.unwrap();

    let queue = InMemoryWorkQueue::new();
    queue.push(SimulationRequest {
        user_id: SmolStr::new("alice"),
        portfolio_id,
        request_time: close(ymd(2020, 9, 1)),
    });
    // A request for a portfolio that was never saved must fail and stay
    // unacknowledged for redelivery.
    queue.push(SimulationRequest {
        user_id: SmolStr::new("alice"),
        portfolio_id: uuid::Uuid::new_v4(),
        request_time: close(ymd(2020, 9, 1)),
    });

    let report = run_worker(&ctx, &services, &repository, &queue, close(ymd(2020, 8, 31)))
        .await
        .unwrap();

    assert_eq!(
        report,
        WorkerReport {
            processed: 1,
            failed: 1
        }
    );
    assert!(repository.ledger(portfolio_id).len() > 2);
    assert_eq!(queue.in_flight_len(), 1);

    queue.redeliver();
    assert_eq!(queue.ready_len(), 1);
}

#[tokio::test]
async fn test_batch_update_isolates_failures() {
    let data = InMemoryMetricService::new();
    seed(&data);
    let ratings = InMemoryRatingService::new();
    let services = Services {
        data: &data,
        ratings: &ratings,
    };
    let repository = InMemoryRepository::new();
    let ctx = Ctx::background();

    let mut result = run(&data, ymd(2020, 3, 31)).await;
    result.portfolio.user_id = SmolStr::new("alice");
    let good_id = result.portfolio.id;
    let mut tx = repository.begin_tx(&ctx, "alice").await.unwrap();
    tx.save_portfolio(&ctx, &result.portfolio, true).await.unwrap();
    tx.save_transactions(&ctx, &result.portfolio).await.unwrap();
    tx.commit(&ctx).await.unwrap();

    // A missing portfolio fails its own update only.
    let missing_id = uuid::Uuid::new_v4();
    let failed = update_portfolios(
        &ctx,
        &services,
        &repository,
        &[
            (SmolStr::new("alice"), missing_id),
            (SmolStr::new("alice"), good_id),
        ],
        close(ymd(2020, 8, 31)),
    )
    .await
    .unwrap();

    assert_eq!(failed, vec![missing_id]);
    assert!(repository.ledger(good_id).len() > 2);
}
