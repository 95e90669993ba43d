use crate::{
    allocation::{Pie, Plan},
    error::StrategyError,
    indicator::figi_of,
    info::{
        Argument, ArgumentMap, ArgumentType, StrategyInfo, parse_number, parse_securities,
        security_value,
    },
    strategy::{ComputeCtx, Strategy, finalise, monthly_prices, widen_begin},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_calendar::{Schedule, eastern_date};
use folio_frame::Frame;
use folio_instrument::Security;
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::debug;

/// Descriptor for the Protective Asset Allocation strategy.
pub fn info() -> StrategyInfo {
    StrategyInfo {
        shortcode: SmolStr::new("paa"),
        name: "Protective Asset Allocation".to_string(),
        long_description: "Keller and Keuning's Protective Asset Allocation: the share of \
            risk securities trading below their moving average sets a bond fraction, the \
            remainder is split equally over the top positive-momentum risk securities."
            .to_string(),
        version: SmolStr::new("1.0.1"),
        benchmark: Security::from_parts("VFINX", "BBG000BHTMY2"),
        arguments: IndexMap::from_iter([
            (
                SmolStr::new("riskTickers"),
                Argument {
                    typecode: ArgumentType::Securities,
                    default: serde_json::json!([
                        security_value("VFINX", "BBG000BHTMY2"),
                        security_value("PRIDX", "BBG000BQVRY9"),
                    ]),
                    help: "Risk universe ranked by moving-average momentum".to_string(),
                    options: None,
                },
            ),
            (
                SmolStr::new("protectiveTickers"),
                Argument {
                    typecode: ArgumentType::Securities,
                    default: serde_json::json!([security_value("VUSTX", "BBG000BCKYB9")]),
                    help: "Protective universe; the highest-momentum member receives the bond \
                        fraction"
                        .to_string(),
                    options: None,
                },
            ),
            (
                SmolStr::new("lookback"),
                Argument {
                    typecode: ArgumentType::Number,
                    default: serde_json::json!(12.0),
                    help: "Moving-average lookback L, in months".to_string(),
                    options: None,
                },
            ),
            (
                SmolStr::new("topN"),
                Argument {
                    typecode: ArgumentType::Number,
                    default: serde_json::json!(2.0),
                    help: "Maximum number of risk winners".to_string(),
                    options: None,
                },
            ),
            (
                SmolStr::new("protectionFactor"),
                Argument {
                    typecode: ArgumentType::Number,
                    default: serde_json::json!(2.0),
                    help: "Protection factor: 0 low, 1 medium, 2 high".to_string(),
                    options: None,
                },
            ),
        ]),
        suggested_parameters: IndexMap::from_iter([(
            SmolStr::new("PAA-2"),
            IndexMap::from_iter([
                (SmolStr::new("lookback"), serde_json::json!(12.0)),
                (SmolStr::new("topN"), serde_json::json!(2.0)),
                (SmolStr::new("protectionFactor"), serde_json::json!(2.0)),
            ]),
        )]),
        factory,
    }
}

fn factory(arguments: &ArgumentMap) -> Result<Box<dyn Strategy>, StrategyError> {
    let risk = parse_securities(arguments, "riskTickers")?;
    let protective = parse_securities(arguments, "protectiveTickers")?;
    let lookback = parse_number(arguments, "lookback")?;
    let top_n = parse_number(arguments, "topN")?;
    let protection_factor = parse_number(arguments, "protectionFactor")?;

    if risk.is_empty() || protective.is_empty() {
        return Err(StrategyError::InvalidArguments(
            "riskTickers and protectiveTickers must be non-empty".to_string(),
        ));
    }
    if lookback < 2.0 || top_n < 1.0 || protection_factor < 0.0 {
        return Err(StrategyError::InvalidArguments(format!(
            "lookback {lookback}, topN {top_n}, protectionFactor {protection_factor} out of range"
        )));
    }

    Ok(Box::new(ProtectiveAssetAllocation {
        risk,
        protective,
        lookback: lookback as usize,
        top_n: top_n as usize,
        protection_factor,
    }))
}

/// Protective Asset Allocation: monthly cadence, moving-average momentum.
#[derive(Debug, Clone)]
pub struct ProtectiveAssetAllocation {
    risk: Vec<Arc<Security>>,
    protective: Vec<Arc<Security>>,
    lookback: usize,
    top_n: usize,
    protection_factor: f64,
}

impl ProtectiveAssetAllocation {
    fn universe(&self) -> Vec<Arc<Security>> {
        let mut seen = IndexMap::new();
        for security in self.risk.iter().chain(&self.protective) {
            seen.entry(security.composite_figi.clone())
                .or_insert_with(|| Arc::clone(security));
        }
        seen.into_values().collect()
    }
}

fn score_of(scores: &Frame, row: usize, security: &Security) -> f64 {
    scores
        .value(row, &security.composite_figi)
        .unwrap_or(f64::NAN)
}

#[async_trait]
impl Strategy for ProtectiveAssetAllocation {
    fn schedule(&self) -> Schedule {
        Schedule::month_end_close()
    }

    async fn compute(
        &self,
        compute: &ComputeCtx<'_>,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(Plan, Pie), StrategyError> {
        let (prices, _) =
            monthly_prices(compute, &self.universe(), widen_begin(begin), end).await?;

        // mom_i = p0 / SMA_L - 1.
        let scores = prices
            .div(&prices.sma(self.lookback))?
            .add_scalar(-1.0)
            .rename_columns(figi_of)?
            .drop_na()
            .trim(eastern_date(begin), eastern_date(end));
        if scores.is_empty() {
            return Err(StrategyError::EmptyPlan);
        }

        debug!(rows = scores.len(), "scored paa universe");

        let risk_count = self.risk.len() as f64;
        let protection_floor = self.protection_factor * risk_count / 4.0;

        let mut pies = Vec::with_capacity(scores.len());
        for row in 0..scores.len() {
            let date = scores.dates()[row];

            let positive = self
                .risk
                .iter()
                .filter(|security| score_of(&scores, row, security) > 0.0)
                .count();

            let denominator = risk_count - protection_floor;
            let bond_fraction = if denominator <= 0.0 {
                1.0
            } else {
                ((risk_count - positive as f64) / denominator).clamp(0.0, 1.0)
            };

            let mut pie = Pie::empty(date);

            if bond_fraction > 0.0 {
                let best_protective = self
                    .protective
                    .iter()
                    .max_by(|a, b| {
                        score_of(&scores, row, a)
                            .partial_cmp(&score_of(&scores, row, b))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .expect("protective universe is non-empty");
                *pie.members
                    .entry(Arc::clone(best_protective))
                    .or_insert(0.0) += bond_fraction;
            }

            let winners = self.top_n.min(positive);
            if bond_fraction < 1.0 && winners > 0 {
                let mut ranked = self
                    .risk
                    .iter()
                    .filter(|security| score_of(&scores, row, security) > 0.0)
                    .cloned()
                    .collect::<Vec<_>>();
                ranked.sort_by(|a, b| {
                    score_of(&scores, row, b)
                        .partial_cmp(&score_of(&scores, row, a))
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.composite_figi.cmp(&b.composite_figi))
                });
                let weight = (1.0 - bond_fraction) / winners as f64;
                for security in ranked.into_iter().take(winners) {
                    *pie.members.entry(security).or_insert(0.0) += weight;
                }
            }

            pie = pie
                .justify("BF", bond_fraction)
                .justify("N", positive as f64)
                .justify("N1", protection_floor);
            for security in self.universe() {
                pie = pie.justify(security.ticker.clone(), score_of(&scores, row, &security));
            }
            pies.push(pie);
        }

        finalise(&self.schedule(), pies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::fixtures::{month_end, pridx, seed_monthly, vfinx, vustx};
    use folio_data::{Ctx, InMemoryMetricService, InMemoryRatingService};

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    async fn run(
        strategy: &ProtectiveAssetAllocation,
        data: &InMemoryMetricService,
    ) -> (Plan, Pie) {
        let ratings = InMemoryRatingService::new();
        let ctx = Ctx::background();
        let compute_ctx = ComputeCtx {
            ctx: &ctx,
            data,
            ratings: &ratings,
        };
        strategy
            .compute(
                &compute_ctx,
                utc("2019-06-01T12:00:00Z"),
                utc("2019-12-31T23:59:59Z"),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_all_positive_risk_splits_equally() {
        let data = InMemoryMetricService::new();

        let up = (0..26).map(|m| 100.0 * 1.02f64.powi(m)).collect::<Vec<_>>();
        let mild = (0..26).map(|m| 100.0 * 1.01f64.powi(m)).collect::<Vec<_>>();
        let vfinx = seed_monthly(&data, &vfinx(), 2018, 1, &up);
        let pridx = seed_monthly(&data, &pridx(), 2018, 1, &mild);
        let vustx = seed_monthly(&data, &vustx(), 2018, 1, &mild);

        let strategy = ProtectiveAssetAllocation {
            risk: vec![vfinx, pridx],
            protective: vec![vustx],
            lookback: 6,
            top_n: 2,
            protection_factor: 0.0,
        };

        let (plan, prediction) = run(&strategy, &data).await;

        // Every risk security above its SMA: bond fraction 0, equal split.
        assert_eq!(plan.len(), 7);
        for pie in plan.pies() {
            assert_eq!(pie.justifications["BF"], 0.0);
            assert_eq!(pie.justifications["N"], 2.0);
            assert_eq!(pie.members.len(), 2);
            for weight in pie.members.values() {
                assert!((weight - 0.5).abs() < 1e-12);
            }
        }
        assert_eq!(eastern_date(prediction.date), month_end(2020, 1));
    }

    #[tokio::test]
    async fn test_all_negative_risk_goes_to_protective() {
        let data = InMemoryMetricService::new();

        let down = (0..26).map(|m| 100.0 * 0.98f64.powi(m)).collect::<Vec<_>>();
        let mild = (0..26).map(|m| 100.0 * 1.01f64.powi(m)).collect::<Vec<_>>();
        let vfinx = seed_monthly(&data, &vfinx(), 2018, 1, &down);
        let pridx = seed_monthly(&data, &pridx(), 2018, 1, &down);
        let vustx = seed_monthly(&data, &vustx(), 2018, 1, &mild);

        let strategy = ProtectiveAssetAllocation {
            risk: vec![vfinx, pridx],
            protective: vec![Arc::clone(&vustx)],
            lookback: 6,
            top_n: 2,
            protection_factor: 2.0,
        };

        let (plan, _) = run(&strategy, &data).await;

        // n = 0 and n1 = 1: bf = (2 - 0) / (2 - 1) clamps to 1.
        for pie in plan.pies() {
            assert_eq!(pie.justifications["BF"], 1.0);
            assert_eq!(pie.members.len(), 1);
            assert_eq!(pie.members.keys().next().unwrap().ticker, "VUSTX");
            assert!((pie.weight_sum() - 1.0).abs() < 1e-12);
        }
    }

    #[tokio::test]
    async fn test_partial_breadth_mixes_bond_and_risk() {
        let data = InMemoryMetricService::new();

        let up = (0..26).map(|m| 100.0 * 1.02f64.powi(m)).collect::<Vec<_>>();
        let down = (0..26).map(|m| 100.0 * 0.98f64.powi(m)).collect::<Vec<_>>();
        let mild = (0..26).map(|m| 100.0 * 1.005f64.powi(m)).collect::<Vec<_>>();
        let vfinx = seed_monthly(&data, &vfinx(), 2018, 1, &up);
        let pridx = seed_monthly(&data, &pridx(), 2018, 1, &down);
        let vustx = seed_monthly(&data, &vustx(), 2018, 1, &mild);

        // R = 2, n = 1, pf = 1 -> n1 = 0.5, bf = (2-1)/(2-0.5) = 2/3.
        let strategy = ProtectiveAssetAllocation {
            risk: vec![vfinx, pridx],
            protective: vec![vustx],
            lookback: 6,
            top_n: 2,
            protection_factor: 1.0,
        };

        let (plan, _) = run(&strategy, &data).await;

        for pie in plan.pies() {
            let bf = pie.justifications["BF"];
            assert!((bf - 2.0 / 3.0).abs() < 1e-9);
            assert_eq!(pie.members.len(), 2);
            assert!((pie.weight_sum() - 1.0).abs() < 1e-9);
            // Single positive risk security takes the remainder.
            let vfinx_weight = pie
                .members
                .iter()
                .find(|(s, _)| s.ticker == "VFINX")
                .map(|(_, w)| *w)
                .unwrap();
            assert!((vfinx_weight - 1.0 / 3.0).abs() < 1e-9);
        }
    }
}
