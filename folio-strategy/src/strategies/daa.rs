use crate::{
    allocation::{Pie, Plan},
    error::StrategyError,
    indicator::momentum_12631,
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

/// Descriptor for the Defensive Asset Allocation strategy.
pub fn info() -> StrategyInfo {
    StrategyInfo {
        shortcode: SmolStr::new("daa"),
        name: "Defensive Asset Allocation".to_string(),
        long_description: "Keenan and Keller's Defensive Asset Allocation: a protective \
            canary universe steers a cash fraction via its negative-momentum breadth, the \
            remainder is split equally over the top risk securities by 12-6-3-1 weighted \
            momentum."
            .to_string(),
        version: SmolStr::new("1.1.0"),
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
                    help: "Risk universe ranked by weighted momentum".to_string(),
                    options: None,
                },
            ),
            (
                SmolStr::new("cashTickers"),
                Argument {
                    typecode: ArgumentType::Securities,
                    default: serde_json::json!([security_value("VUSTX", "BBG000BCKYB9")]),
                    help: "Cash universe; the highest-momentum member receives the cash slice"
                        .to_string(),
                    options: None,
                },
            ),
            (
                SmolStr::new("protectiveTickers"),
                Argument {
                    typecode: ArgumentType::Securities,
                    default: serde_json::json!([security_value("VUSTX", "BBG000BCKYB9")]),
                    help: "Canary universe; negative momentum here moves the portfolio to cash"
                        .to_string(),
                    options: None,
                },
            ),
            (
                SmolStr::new("breadth"),
                Argument {
                    typecode: ArgumentType::Number,
                    default: serde_json::json!(1.0),
                    help: "Protective breadth B".to_string(),
                    options: None,
                },
            ),
            (
                SmolStr::new("topT"),
                Argument {
                    typecode: ArgumentType::Number,
                    default: serde_json::json!(1.0),
                    help: "Number of risk winners T".to_string(),
                    options: None,
                },
            ),
        ]),
        suggested_parameters: IndexMap::from_iter([(
            SmolStr::new("DAA-G2"),
            IndexMap::from_iter([
                (SmolStr::new("breadth"), serde_json::json!(1.0)),
                (SmolStr::new("topT"), serde_json::json!(1.0)),
            ]),
        )]),
        factory,
    }
}

fn factory(arguments: &ArgumentMap) -> Result<Box<dyn Strategy>, StrategyError> {
    let risk = parse_securities(arguments, "riskTickers")?;
    let cash = parse_securities(arguments, "cashTickers")?;
    let protective = parse_securities(arguments, "protectiveTickers")?;
    let breadth = parse_number(arguments, "breadth")?;
    let top_t = parse_number(arguments, "topT")?;

    if risk.is_empty() || cash.is_empty() || protective.is_empty() {
        return Err(StrategyError::InvalidArguments(
            "riskTickers, cashTickers and protectiveTickers must be non-empty".to_string(),
        ));
    }
    if breadth < 1.0 || top_t < 1.0 {
        return Err(StrategyError::InvalidArguments(format!(
            "breadth {breadth} and topT {top_t} must be at least 1"
        )));
    }

    Ok(Box::new(DefensiveAssetAllocation {
        risk,
        cash,
        protective,
        breadth,
        top_t,
    }))
}

/// Defensive Asset Allocation: monthly cadence over three (possibly
/// overlapping) universes.
#[derive(Debug, Clone)]
pub struct DefensiveAssetAllocation {
    risk: Vec<Arc<Security>>,
    cash: Vec<Arc<Security>>,
    protective: Vec<Arc<Security>>,
    breadth: f64,
    top_t: f64,
}

impl DefensiveAssetAllocation {
    /// Union of the three universes, first occurrence wins.
    fn universe(&self) -> Vec<Arc<Security>> {
        let mut seen = IndexMap::new();
        for security in self
            .risk
            .iter()
            .chain(&self.cash)
            .chain(&self.protective)
        {
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
impl Strategy for DefensiveAssetAllocation {
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
        let scores = momentum_12631(&prices)?
            .drop_na()
            .trim(eastern_date(begin), eastern_date(end));
        if scores.is_empty() {
            return Err(StrategyError::EmptyPlan);
        }

        debug!(rows = scores.len(), "scored daa universe");

        let mut pies = Vec::with_capacity(scores.len());
        for row in 0..scores.len() {
            let date = scores.dates()[row];

            let bad_breadth = self
                .protective
                .iter()
                .filter(|security| score_of(&scores, row, security) < 0.0)
                .count() as f64;

            let cash_fraction =
                (1.0 / self.top_t * (bad_breadth * self.top_t / self.breadth).floor()).min(1.0);
            let winners = ((1.0 - cash_fraction) * self.top_t).round() as usize;

            let mut pie = Pie::empty(date);

            if cash_fraction > 0.0 {
                let best_cash = self
                    .cash
                    .iter()
                    .max_by(|a, b| {
                        score_of(&scores, row, a)
                            .partial_cmp(&score_of(&scores, row, b))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .expect("cash universe is non-empty");
                *pie.members.entry(Arc::clone(best_cash)).or_insert(0.0) += cash_fraction;
            }

            if cash_fraction < 1.0 && winners > 0 {
                let mut ranked = self.risk.clone();
                ranked.sort_by(|a, b| {
                    score_of(&scores, row, b)
                        .partial_cmp(&score_of(&scores, row, a))
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.composite_figi.cmp(&b.composite_figi))
                });
                let weight = (1.0 - cash_fraction) / winners as f64;
                for security in ranked.into_iter().take(winners) {
                    *pie.members.entry(security).or_insert(0.0) += weight;
                }
            }

            pie = pie
                .justify("B", self.breadth)
                .justify("CF", cash_fraction)
                .justify("T", self.top_t)
                .justify("W", winners as f64);
            for security in self.universe() {
                pie = pie.justify(security.ticker.clone(), score_of(&scores, row, &security));
            }
            pies.push(pie);
        }

        finalise(&self.schedule(), pies)
    }
}
