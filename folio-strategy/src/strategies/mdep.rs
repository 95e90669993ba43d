use crate::{
    allocation::{Pie, Plan},
    error::StrategyError,
    indicator::momentum,
    info::{
        Argument, ArgumentMap, ArgumentType, StrategyInfo, parse_number, parse_string,
        resolve_ticker,
    },
    strategy::{ComputeCtx, Strategy, finalise, monthly_prices, widen_begin},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_calendar::{Schedule, eastern_date};
use folio_frame::Frame;
use folio_instrument::{Security, directory};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::debug;

/// Momentum lookbacks of the risk-on gate, in months.
const GATE_PERIODS: [usize; 3] = [1, 3, 6];

/// Descriptor for the Momentum-Driven Earnings Prediction strategy.
pub fn info() -> StrategyInfo {
    StrategyInfo {
        shortcode: SmolStr::new("mdep"),
        name: "Momentum-Driven Earnings Prediction".to_string(),
        long_description: "Holds the top-rated securities of the rating service, sorted by \
            market cap, rebalanced on a weekly or monthly cadence. An optional momentum gate \
            moves the whole allocation to the out-of-market security when benchmark momentum \
            turns non-positive."
            .to_string(),
        version: SmolStr::new("1.3.0"),
        benchmark: Security::from_parts("VFINX", "BBG000BHTMY2"),
        arguments: IndexMap::from_iter([
            (
                SmolStr::new("numHoldings"),
                Argument {
                    typecode: ArgumentType::Number,
                    default: serde_json::json!(10.0),
                    help: "Number of top-rated securities to hold".to_string(),
                    options: None,
                },
            ),
            (
                SmolStr::new("indicator"),
                Argument {
                    typecode: ArgumentType::Choice,
                    default: serde_json::json!("Momentum"),
                    help: "Risk-on indicator".to_string(),
                    options: Some(vec!["None".to_string(), "Momentum".to_string()]),
                },
            ),
            (
                SmolStr::new("outTicker"),
                Argument {
                    typecode: ArgumentType::String,
                    default: serde_json::json!("VUSTX"),
                    help: "Out-of-market security held when the indicator is off".to_string(),
                    options: None,
                },
            ),
            (
                SmolStr::new("period"),
                Argument {
                    typecode: ArgumentType::Choice,
                    default: serde_json::json!("monthly"),
                    help: "Rebalance cadence".to_string(),
                    options: Some(vec!["weekly".to_string(), "monthly".to_string()]),
                },
            ),
        ]),
        suggested_parameters: IndexMap::from_iter([
            (
                SmolStr::new("Focused"),
                IndexMap::from_iter([
                    (SmolStr::new("numHoldings"), serde_json::json!(5.0)),
                    (SmolStr::new("period"), serde_json::json!("monthly")),
                ]),
            ),
            (
                SmolStr::new("Broad"),
                IndexMap::from_iter([
                    (SmolStr::new("numHoldings"), serde_json::json!(20.0)),
                    (SmolStr::new("period"), serde_json::json!("weekly")),
                ]),
            ),
        ]),
        factory,
    }
}

/// Risk-on gate of the MDEP strategy.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Indicator {
    None,
    Momentum,
}

fn factory(arguments: &ArgumentMap) -> Result<Box<dyn Strategy>, StrategyError> {
    let num_holdings = parse_number(arguments, "numHoldings")?;
    if num_holdings < 1.0 {
        return Err(StrategyError::InvalidArguments(format!(
            "numHoldings {num_holdings} must be at least 1"
        )));
    }

    let indicator = match parse_string(arguments, "indicator")?.as_str() {
        "None" => Indicator::None,
        "Momentum" => Indicator::Momentum,
        other => {
            return Err(StrategyError::InvalidArguments(format!(
                "indicator: unknown choice {other}"
            )));
        }
    };

    let period = parse_string(arguments, "period")?;
    let schedule = match period.as_str() {
        "weekly" => Schedule::week_end_close(),
        "monthly" => Schedule::month_end_close(),
        other => return Err(StrategyError::InvalidPeriod(SmolStr::new(other))),
    };

    let out = resolve_ticker(&parse_string(arguments, "outTicker")?)?;
    let benchmark = directory().insert(info().benchmark);

    Ok(Box::new(MomentumDrivenEarningsPrediction {
        num_holdings: num_holdings as usize,
        indicator,
        out,
        benchmark,
        schedule,
    }))
}

/// Momentum-Driven Earnings Prediction: rating-service driven holdings with
/// an optional benchmark-momentum risk gate.
#[derive(Debug, Clone)]
pub struct MomentumDrivenEarningsPrediction {
    num_holdings: usize,
    indicator: Indicator,
    out: Arc<Security>,
    benchmark: Arc<Security>,
    schedule: Schedule,
}

impl MomentumDrivenEarningsPrediction {
    /// Latest gate score at or before the rebalance instant; NaN when the
    /// gate has no observation yet.
    fn gate_score(scores: &Frame, instant: DateTime<Utc>) -> f64 {
        let row = scores.dates().partition_point(|d| *d <= instant);
        if row == 0 {
            return f64::NAN;
        }
        scores
            .names()
            .first()
            .and_then(|name| scores.value(row - 1, name))
            .unwrap_or(f64::NAN)
    }
}

#[async_trait]
impl Strategy for MomentumDrivenEarningsPrediction {
    fn schedule(&self) -> Schedule {
        self.schedule.clone()
    }

    async fn compute(
        &self,
        compute: &ComputeCtx<'_>,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(Plan, Pie), StrategyError> {
        let rebalances = self.schedule.between(begin, end)?;
        if rebalances.is_empty() {
            return Err(StrategyError::EmptyPlan);
        }

        let gate = match self.indicator {
            Indicator::None => None,
            Indicator::Momentum => {
                let universe = [Arc::clone(&self.benchmark)];
                let (prices, rates) =
                    monthly_prices(compute, &universe, widen_begin(begin), end).await?;
                Some(momentum(&prices, &GATE_PERIODS, rates.as_ref())?.drop_na())
            }
        };

        debug!(rebalances = rebalances.len(), "computing mdep plan");

        let mut pies = Vec::with_capacity(rebalances.len());
        for instant in rebalances {
            let risk_on = match &gate {
                None => true,
                Some(scores) => Self::gate_score(scores, instant) > 0.0,
            };

            if !risk_on {
                pies.push(Pie::single(instant, Arc::clone(&self.out)).justify("riskOn", 0.0));
                continue;
            }

            let ranked = compute
                .ratings
                .top_ranked(compute.ctx, eastern_date(instant), self.num_holdings)
                .await?;
            if ranked.is_empty() {
                pies.push(
                    Pie::single(instant, Arc::clone(&self.out))
                        .justify("riskOn", 1.0)
                        .justify("count", 0.0),
                );
                continue;
            }

            let weight = 1.0 / ranked.len() as f64;
            let mut members = IndexMap::new();
            for security in &ranked {
                members.insert(Arc::clone(security), weight);
            }
            pies.push(
                Pie {
                    date: instant,
                    members,
                    justifications: IndexMap::new(),
                }
                .justify("riskOn", 1.0)
                .justify("count", ranked.len() as f64),
            );
        }

        finalise(&self.schedule, pies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::fixtures::{month_end, seed_monthly, seed_risk_free, vfinx, vustx};
    use folio_data::{Ctx, InMemoryMetricService, InMemoryRatingService};

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn security(ticker: &str, figi: &str) -> Arc<Security> {
        directory().insert(Security::from_parts(ticker, figi))
    }

    fn mdep(indicator: Indicator, num_holdings: usize) -> MomentumDrivenEarningsPrediction {
        MomentumDrivenEarningsPrediction {
            num_holdings,
            indicator,
            out: security("VUSTX", "BBG000BCKYB9"),
            benchmark: security("VFINX", "BBG000BHTMY2"),
            schedule: Schedule::month_end_close(),
        }
    }

    #[test]
    fn test_factory_rejects_bad_period_and_choice() {
        directory().insert(vustx());

        let mut arguments = ArgumentMap::new();
        arguments.insert("numHoldings".into(), serde_json::json!(5.0));
        arguments.insert("indicator".into(), serde_json::json!("None"));
        arguments.insert("outTicker".into(), serde_json::json!("VUSTX"));
        arguments.insert("period".into(), serde_json::json!("fortnightly"));
        assert!(matches!(
            factory(&arguments),
            Err(StrategyError::InvalidPeriod(_))
        ));

        arguments.insert("period".into(), serde_json::json!("monthly"));
        arguments.insert("indicator".into(), serde_json::json!("Oracle"));
        assert!(matches!(
            factory(&arguments),
            Err(StrategyError::InvalidArguments(_))
        ));
    }

    #[tokio::test]
    async fn test_equal_weights_over_rated_securities() {
        let data = InMemoryMetricService::new();
        let ratings = InMemoryRatingService::new();

        let a = security("AAPL", "BBG000B9XRY4");
        let b = security("MSFT", "BBG000BPH459");
        let c = security("NVDA", "BBG000BBJQV0");
        ratings.insert_ranking(
            chrono::NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
            vec![a, b, c],
        );

        let strategy = mdep(Indicator::None, 2);
        let ctx = Ctx::background();
        let compute_ctx = ComputeCtx {
            ctx: &ctx,
            data: &data,
            ratings: &ratings,
        };

        let (plan, prediction) = strategy
            .compute(
                &compute_ctx,
                utc("2019-06-01T12:00:00Z"),
                utc("2019-08-31T23:59:59Z"),
            )
            .await
            .unwrap();

        assert_eq!(plan.len(), 3);
        for pie in plan.pies() {
            assert_eq!(pie.justifications["riskOn"], 1.0);
            assert_eq!(pie.justifications["count"], 2.0);
            assert_eq!(pie.members.len(), 2);
            for weight in pie.members.values() {
                assert!((weight - 0.5).abs() < 1e-12);
            }
            // Market-cap order preserved from the rating service.
            assert_eq!(pie.members.keys().next().unwrap().ticker, "AAPL");
        }
        assert_eq!(eastern_date(prediction.date), month_end(2019, 9));
    }

    #[tokio::test]
    async fn test_momentum_gate_moves_to_out_ticker() {
        let data = InMemoryMetricService::new();
        let ratings = InMemoryRatingService::new();

        // Benchmark in steady decline: the gate stays off.
        let down = (0..18).map(|m| 100.0 * 0.97f64.powi(m)).collect::<Vec<_>>();
        seed_monthly(&data, &vfinx(), 2018, 6, &down);
        seed_risk_free(&data, 2018, 6, 18, 0.0);

        let a = security("AAPL", "BBG000B9XRY4");
        ratings.insert_ranking(
            chrono::NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
            vec![a],
        );

        let strategy = mdep(Indicator::Momentum, 1);
        let ctx = Ctx::background();
        let compute_ctx = ComputeCtx {
            ctx: &ctx,
            data: &data,
            ratings: &ratings,
        };

        let (plan, _) = strategy
            .compute(
                &compute_ctx,
                utc("2019-06-01T12:00:00Z"),
                utc("2019-08-31T23:59:59Z"),
            )
            .await
            .unwrap();

        for pie in plan.pies() {
            assert_eq!(pie.justifications["riskOn"], 0.0);
            assert_eq!(pie.members.keys().next().unwrap().ticker, "VUSTX");
        }
    }

    #[tokio::test]
    async fn test_weekly_cadence_rebalances_each_week() {
        let data = InMemoryMetricService::new();
        let ratings = InMemoryRatingService::new();

        let a = security("AAPL", "BBG000B9XRY4");
        ratings.insert_ranking(
            chrono::NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
            vec![a],
        );

        let strategy = MomentumDrivenEarningsPrediction {
            num_holdings: 1,
            indicator: Indicator::None,
            out: security("VUSTX", "BBG000BCKYB9"),
            benchmark: security("VFINX", "BBG000BHTMY2"),
            schedule: Schedule::week_end_close(),
        };
        let ctx = Ctx::background();
        let compute_ctx = ComputeCtx {
            ctx: &ctx,
            data: &data,
            ratings: &ratings,
        };

        let (plan, _) = strategy
            .compute(
                &compute_ctx,
                utc("2019-06-03T12:00:00Z"),
                utc("2019-06-28T23:59:59Z"),
            )
            .await
            .unwrap();

        // Four Fridays in June 2019 between the 3rd and the 28th.
        assert_eq!(plan.len(), 4);
    }
}
