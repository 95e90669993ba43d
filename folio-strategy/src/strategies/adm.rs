use crate::{
    allocation::{Pie, Plan},
    error::StrategyError,
    indicator::momentum,
    info::{
        Argument, ArgumentMap, ArgumentType, StrategyInfo, parse_securities, parse_string,
        resolve_ticker, security_value,
    },
    strategy::{ComputeCtx, Strategy, finalise, monthly_prices, widen_begin},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_calendar::{Schedule, eastern_date};
use folio_instrument::Security;
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::debug;

/// Momentum lookbacks, in months.
const PERIODS: [usize; 3] = [1, 3, 6];

/// Descriptor for the Accelerating Dual Momentum strategy.
pub fn info() -> StrategyInfo {
    StrategyInfo {
        shortcode: SmolStr::new("adm"),
        name: "Accelerating Dual Momentum".to_string(),
        long_description: "Scores two risk securities by their average 1, 3 and 6 month \
            momentum net of the risk-free rate, holding the stronger one while any score is \
            positive and the out-of-market security otherwise."
            .to_string(),
        version: SmolStr::new("1.2.0"),
        benchmark: Security::from_parts("VFINX", "BBG000BHTMY2"),
        arguments: IndexMap::from_iter([
            (
                SmolStr::new("inTickers"),
                Argument {
                    typecode: ArgumentType::Securities,
                    default: serde_json::json!([
                        security_value("VFINX", "BBG000BHTMY2"),
                        security_value("PRIDX", "BBG000BQVRY9"),
                    ]),
                    help: "Two risk securities ranked against each other".to_string(),
                    options: None,
                },
            ),
            (
                SmolStr::new("outTicker"),
                Argument {
                    typecode: ArgumentType::String,
                    default: serde_json::json!("VUSTX"),
                    help: "Out-of-market security held when every score is negative".to_string(),
                    options: None,
                },
            ),
        ]),
        suggested_parameters: IndexMap::from_iter([(
            SmolStr::new("Classic"),
            IndexMap::from_iter([
                (
                    SmolStr::new("inTickers"),
                    serde_json::json!([
                        security_value("VFINX", "BBG000BHTMY2"),
                        security_value("PRIDX", "BBG000BQVRY9"),
                    ]),
                ),
                (SmolStr::new("outTicker"), serde_json::json!("VUSTX")),
            ]),
        )]),
        factory,
    }
}

fn factory(arguments: &ArgumentMap) -> Result<Box<dyn Strategy>, StrategyError> {
    let risk = parse_securities(arguments, "inTickers")?;
    if risk.len() != 2 {
        return Err(StrategyError::InvalidArguments(format!(
            "inTickers: expected exactly 2 securities, found {}",
            risk.len()
        )));
    }
    let out = resolve_ticker(&parse_string(arguments, "outTicker")?)?;
    Ok(Box::new(AcceleratingDualMomentum { risk, out }))
}

/// Accelerating Dual Momentum: monthly cadence, winner-takes-all between two
/// risk securities, defensive fallback when both scores are negative.
#[derive(Debug, Clone)]
pub struct AcceleratingDualMomentum {
    risk: Vec<Arc<Security>>,
    out: Arc<Security>,
}

#[async_trait]
impl Strategy for AcceleratingDualMomentum {
    fn schedule(&self) -> Schedule {
        Schedule::month_end_close()
    }

    async fn compute(
        &self,
        compute: &ComputeCtx<'_>,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(Plan, Pie), StrategyError> {
        let (prices, rates) =
            monthly_prices(compute, &self.risk, widen_begin(begin), end).await?;
        let scores = momentum(&prices, &PERIODS, rates.as_ref())?
            .drop_na()
            .trim(eastern_date(begin), eastern_date(end));
        if scores.is_empty() {
            return Err(StrategyError::EmptyPlan);
        }

        debug!(rows = scores.len(), "scored adm universe");

        let mut pies = Vec::with_capacity(scores.len());
        for row in 0..scores.len() {
            let date = scores.dates()[row];

            let mut best: Option<(&Arc<Security>, f64)> = None;
            for security in &self.risk {
                let score = scores
                    .value(row, &security.composite_figi)
                    .unwrap_or(f64::NAN);
                if best.is_none_or(|(_, held)| score > held) {
                    best = Some((security, score));
                }
            }
            let (winner, top_score) = best.expect("two risk securities scored");

            let mut pie = if top_score > 0.0 {
                Pie::single(date, Arc::clone(winner))
            } else {
                Pie::single(date, Arc::clone(&self.out))
            };
            for security in &self.risk {
                let score = scores
                    .value(row, &security.composite_figi)
                    .unwrap_or(f64::NAN);
                pie = pie.justify(security.ticker.clone(), score);
            }
            pies.push(pie);
        }

        finalise(&self.schedule(), pies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::fixtures::{month_end, pridx, seed_monthly, seed_risk_free, vfinx, vustx};
    use folio_data::{Ctx, InMemoryMetricService, InMemoryRatingService, Metric};

    fn compute_ctx<'a>(
        ctx: &'a Ctx,
        data: &'a InMemoryMetricService,
        ratings: &'a InMemoryRatingService,
    ) -> ComputeCtx<'a> {
        ComputeCtx { ctx, data, ratings }
    }

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    /// Eighteen months of closes: VFINX compounding up 2%/month, PRIDX
    /// falling 1%/month.
    fn seed_trending(service: &InMemoryMetricService) -> AcceleratingDualMomentum {
        let up = (0..18).map(|m| 100.0 * 1.02f64.powi(m)).collect::<Vec<_>>();
        let down = (0..18).map(|m| 100.0 * 0.99f64.powi(m)).collect::<Vec<_>>();

        let vfinx = seed_monthly(service, &vfinx(), 2019, 1, &up);
        let pridx = seed_monthly(service, &pridx(), 2019, 1, &down);
        let out = seed_monthly(service, &vustx(), 2019, 1, &vec![100.0; 18]);
        seed_risk_free(service, 2019, 1, 18, 0.0);

        AcceleratingDualMomentum {
            risk: vec![vfinx, pridx],
            out,
        }
    }

    #[tokio::test]
    async fn test_compute_holds_winner_on_month_ends() {
        let data = InMemoryMetricService::new();
        let ratings = InMemoryRatingService::new();
        let strategy = seed_trending(&data);
        let ctx = Ctx::background();

        let (plan, prediction) = strategy
            .compute(
                &compute_ctx(&ctx, &data, &ratings),
                utc("2019-10-01T12:00:00Z"),
                utc("2020-03-31T23:59:59Z"),
            )
            .await
            .unwrap();

        // Oct 2019 through Mar 2020, one pie per month end.
        assert_eq!(plan.len(), 6);
        for pie in plan.pies() {
            assert_eq!(pie.members.len(), 1);
            assert_eq!(pie.members.keys().next().unwrap().ticker, "VFINX");
            assert!((pie.weight_sum() - 1.0).abs() < 1e-12);
            // Both scores surfaced as justifications.
            assert!(pie.justifications.contains_key("VFINX"));
            assert!(pie.justifications.contains_key("PRIDX"));
        }
        assert_eq!(
            eastern_date(plan.first().unwrap().date),
            month_end(2019, 10)
        );
        assert_eq!(eastern_date(plan.last().unwrap().date), month_end(2020, 3));

        // Prediction lands on the next scheduled month end.
        assert_eq!(eastern_date(prediction.date), month_end(2020, 4));
        assert_eq!(prediction.members.keys().next().unwrap().ticker, "VFINX");
    }

    #[tokio::test]
    async fn test_compute_falls_back_to_out_security() {
        let data = InMemoryMetricService::new();
        let ratings = InMemoryRatingService::new();

        // Both risk securities decline; every score is negative.
        let down_a = (0..18).map(|m| 100.0 * 0.98f64.powi(m)).collect::<Vec<_>>();
        let down_b = (0..18).map(|m| 100.0 * 0.97f64.powi(m)).collect::<Vec<_>>();
        let vfinx = seed_monthly(&data, &vfinx(), 2019, 1, &down_a);
        let pridx = seed_monthly(&data, &pridx(), 2019, 1, &down_b);
        let out = seed_monthly(&data, &vustx(), 2019, 1, &vec![100.0; 18]);
        seed_risk_free(&data, 2019, 1, 18, 0.0);

        let strategy = AcceleratingDualMomentum {
            risk: vec![vfinx, pridx],
            out,
        };
        let ctx = Ctx::background();

        let (plan, _) = strategy
            .compute(
                &compute_ctx(&ctx, &data, &ratings),
                utc("2019-10-01T12:00:00Z"),
                utc("2020-03-31T23:59:59Z"),
            )
            .await
            .unwrap();

        for pie in plan.pies() {
            assert_eq!(pie.members.keys().next().unwrap().ticker, "VUSTX");
        }
    }

    #[tokio::test]
    async fn test_mid_month_tail_feeds_prediction_but_not_plan() {
        let data = InMemoryMetricService::new();
        let ratings = InMemoryRatingService::new();
        let strategy = seed_trending(&data);

        // One extra observation mid-April 2020.
        data.insert_series(
            &vfinx(),
            Metric::Close,
            vec![(chrono::NaiveDate::from_ymd_opt(2020, 4, 15).unwrap(), 150.0)],
        );
        data.insert_series(
            &pridx(),
            Metric::Close,
            vec![(chrono::NaiveDate::from_ymd_opt(2020, 4, 15).unwrap(), 80.0)],
        );

        let ctx = Ctx::background();
        let (plan, prediction) = strategy
            .compute(
                &compute_ctx(&ctx, &data, &ratings),
                utc("2019-10-01T12:00:00Z"),
                utc("2020-04-20T23:59:59Z"),
            )
            .await
            .unwrap();

        // The mid-month row is dropped from the plan after the prediction is
        // derived from it.
        assert_eq!(eastern_date(plan.last().unwrap().date), month_end(2020, 3));
        assert_eq!(eastern_date(prediction.date), month_end(2020, 4));
    }

    #[tokio::test]
    async fn test_compute_is_deterministic() {
        let data = InMemoryMetricService::new();
        let ratings = InMemoryRatingService::new();
        let strategy = seed_trending(&data);
        let ctx = Ctx::background();
        let compute = compute_ctx(&ctx, &data, &ratings);

        let begin = utc("2019-10-01T12:00:00Z");
        let end = utc("2020-03-31T23:59:59Z");

        let first = strategy.compute(&compute, begin, end).await.unwrap();
        let second = strategy.compute(&compute, begin, end).await.unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_factory_rejects_wrong_risk_arity() {
        // Registered through the directory by the seeding fixtures of other
        // tests; insert here to stay order-independent.
        folio_instrument::directory().insert(vustx());

        let mut arguments = ArgumentMap::new();
        arguments.insert(
            "inTickers".into(),
            serde_json::json!([security_value("VFINX", "BBG000BHTMY2")]),
        );
        arguments.insert("outTicker".into(), serde_json::json!("VUSTX"));

        assert!(matches!(
            factory(&arguments),
            Err(StrategyError::InvalidArguments(_))
        ));
    }
}
