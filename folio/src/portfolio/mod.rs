use crate::portfolio::{
    error::PortfolioError,
    transaction::{
        Activity, Notifications, Transaction, TransactionKind, TransactionSource,
    },
};
use chrono::{DateTime, NaiveDate, Utc};
use folio_calendar::{MarketCalendar, eastern_date};
use folio_data::{ActionKind, Ctx, Metric, MetricService, RatingService, SecurityFrames};
use folio_instrument::Security;
use folio_strategy::{ComputeCtx, Pie, Plan, registry};
use indexmap::IndexMap;
use serde_json::Value;
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Defines all possible errors raised by the portfolio engine.
pub mod error;

/// Ledger transaction model.
pub mod transaction;

/// Tolerance when comparing fractional share counts to zero (position
/// considered closed below this).
pub const SHARES_EPSILON: f64 = 1e-8;

/// Days of price history requested around a rebalance date, bridging
/// weekends and holidays.
const PRICE_LOOKBACK_DAYS: i64 = 14;

/// A simulated portfolio: model state plus the append-only transaction
/// ledger. Mutated only by the ledger engine (and the persistence bridge on
/// load).
#[derive(Debug, Clone)]
pub struct Portfolio {
    pub id: Uuid,
    pub user_id: SmolStr,
    pub name: String,
    pub strategy_shortcode: SmolStr,
    pub strategy_arguments: Value,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub initial_cash: f64,
    pub benchmark: Option<Security>,
    pub notifications: Notifications,
    pub temporary: bool,
    pub status: String,
    pub current_holdings: IndexMap<Security, f64>,
    pub cash_balance: f64,
    pub transactions: Vec<Transaction>,
    pub predicted_assets: Option<Pie>,
    pub activities: Vec<Activity>,
    total_deposited: f64,
    total_withdrawn: f64,
    /// Corporate actions applied through this date.
    last_processed: Option<NaiveDate>,
}

impl Portfolio {
    /// Construct a portfolio holding only cash, recording the initial
    /// deposit.
    pub fn new(
        name: impl Into<String>,
        start_date: DateTime<Utc>,
        initial_cash: f64,
    ) -> Self {
        let mut portfolio = Self {
            id: Uuid::new_v4(),
            user_id: SmolStr::default(),
            name: name.into(),
            strategy_shortcode: SmolStr::default(),
            strategy_arguments: Value::Null,
            start_date,
            end_date: None,
            created: Utc::now(),
            initial_cash,
            benchmark: None,
            notifications: Notifications::default(),
            temporary: false,
            status: String::new(),
            current_holdings: IndexMap::new(),
            cash_balance: initial_cash,
            transactions: Vec::new(),
            predicted_assets: None,
            activities: Vec::new(),
            total_deposited: 0.0,
            total_withdrawn: 0.0,
            last_processed: None,
        };
        portfolio.record(
            start_date,
            TransactionKind::Deposit,
            None,
            0.0,
            0.0,
            initial_cash,
            TransactionSource::User,
            Value::Null,
        );
        portfolio
    }

    /// Running sum of deposits net of nothing - deposits only.
    pub fn total_deposited(&self) -> f64 {
        self.total_deposited
    }

    /// Running sum of withdrawals.
    pub fn total_withdrawn(&self) -> f64 {
        self.total_withdrawn
    }

    /// Date of the final ledger entry.
    pub fn last_transaction_date(&self) -> Option<DateTime<Utc>> {
        self.transactions.last().map(|transaction| transaction.date)
    }

    /// Current holdings as a `{ticker: shares}` JSON object.
    pub fn holdings_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (security, shares) in &self.current_holdings {
            map.insert(security.ticker.to_string(), Value::from(*shares));
        }
        Value::Object(map)
    }

    /// Update the observable status line.
    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        info!(portfolio_id = %self.id, status = %self.status, "portfolio status");
    }

    /// Append an activity entry.
    pub fn add_activity(
        &mut self,
        date: DateTime<Utc>,
        message: impl Into<String>,
        tags: Vec<String>,
    ) {
        let message = message.into();
        debug!(portfolio_id = %self.id, %message, ?tags, "portfolio activity");
        self.activities.push(Activity { date, message, tags });
    }

    /// Record a cash deposit. The date must not precede the final ledger
    /// entry.
    pub fn deposit(&mut self, date: DateTime<Utc>, amount: f64) {
        self.cash_balance += amount;
        self.record(
            date,
            TransactionKind::Deposit,
            None,
            0.0,
            0.0,
            amount,
            TransactionSource::User,
            Value::Null,
        );
    }

    /// Record a cash withdrawal; the ledger never goes cash-negative.
    pub fn withdraw(&mut self, date: DateTime<Utc>, amount: f64) -> Result<(), PortfolioError> {
        if amount > self.cash_balance + 1e-6 {
            return Err(PortfolioError::InsufficientCash {
                requested: amount,
                available: self.cash_balance,
            });
        }
        self.cash_balance -= amount;
        self.record(
            date,
            TransactionKind::Withdraw,
            None,
            0.0,
            0.0,
            amount,
            TransactionSource::User,
            Value::Null,
        );
        Ok(())
    }

    /// Materialise a target-allocation plan into ledger transactions,
    /// rebalancing at every pie in date order.
    pub async fn target_portfolio(
        &mut self,
        ctx: &Ctx,
        data: &dyn MetricService,
        plan: &Plan,
    ) -> Result<(), PortfolioError> {
        for pie in plan.pies() {
            ctx.check().map_err(folio_data::DataError::from)?;
            self.rebalance(ctx, data, pie).await?;
        }
        Ok(())
    }

    /// Extend an existing portfolio forward by re-running its strategy over
    /// `(last transaction date, through]` and appending the new
    /// transactions. Pre-existing transactions are never modified, and
    /// transactions dated after now are never written.
    pub async fn update_transactions(
        &mut self,
        ctx: &Ctx,
        data: &dyn MetricService,
        ratings: &dyn RatingService,
        through: DateTime<Utc>,
    ) -> Result<(), PortfolioError> {
        let info = registry().lookup(&self.strategy_shortcode)?;
        let arguments = self
            .strategy_arguments
            .as_object()
            .cloned()
            .unwrap_or_default();
        let strategy = info.build(&arguments)?;

        let compute = ComputeCtx { ctx, data, ratings };
        let (plan, prediction) = strategy.compute(&compute, self.start_date, through).await?;

        let last = self.last_transaction_date().unwrap_or(self.start_date);
        let now = Utc::now();
        let fresh = plan
            .into_pies()
            .into_iter()
            .filter(|pie| pie.date > last && pie.date <= now)
            .collect::<Vec<_>>();

        info!(
            portfolio_id = %self.id,
            pies = fresh.len(),
            %through,
            "updating portfolio transactions"
        );

        for pie in &fresh {
            ctx.check().map_err(folio_data::DataError::from)?;
            self.rebalance(ctx, data, pie).await?;
        }

        self.predicted_assets = Some(prediction);
        self.end_date = Some(through);
        Ok(())
    }

    /// Rebalance the portfolio to one pie: apply pending corporate actions,
    /// mark to market, then sell overweight positions before buying
    /// underweight ones.
    async fn rebalance(
        &mut self,
        ctx: &Ctx,
        data: &dyn MetricService,
        pie: &Pie,
    ) -> Result<(), PortfolioError> {
        let date = eastern_date(pie.date);
        self.apply_corporate_actions(ctx, data, date).await?;

        let universe = self.universe_with(pie);
        if universe.is_empty() {
            return Ok(());
        }

        let begin = pie.date - chrono::TimeDelta::days(PRICE_LOOKBACK_DAYS);
        let frames = data
            .metrics(ctx, &universe, &[Metric::Close], begin, pie.date)
            .await?;

        // Mark portfolio value.
        let mut value = self.cash_balance;
        for (security, shares) in &self.current_holdings {
            value += shares * close_price(&frames, security, date)?;
        }

        // Target deltas for every security in the union.
        let justification =
            serde_json::to_value(&pie.justifications).unwrap_or(Value::Null);
        let mut sells = Vec::new();
        let mut buys = Vec::new();
        for security in &universe {
            let price = close_price(&frames, security, date)?;
            let weight = pie.members.get(security.as_ref()).copied().unwrap_or(0.0);
            let current = self
                .current_holdings
                .get(security.as_ref())
                .copied()
                .unwrap_or(0.0);
            let target = weight * value / price;
            let delta = target - current;
            if delta < -SHARES_EPSILON {
                sells.push((Arc::clone(security), price, -delta));
            } else if delta > SHARES_EPSILON {
                buys.push((Arc::clone(security), price, delta));
            }
        }

        // Sell pass releases cash first.
        for (security, price, shares) in sells {
            let proceeds = shares * price;
            self.cash_balance += proceeds;
            let held = self
                .current_holdings
                .entry((*security).clone())
                .or_insert(0.0);
            *held -= shares;
            if *held < SHARES_EPSILON {
                self.current_holdings.shift_remove(security.as_ref());
            }
            self.record(
                pie.date,
                TransactionKind::Sell,
                Some((*security).clone()),
                shares,
                price,
                proceeds,
                TransactionSource::Strategy,
                justification.clone(),
            );
        }

        // Rounding can leave the buy pass short of cash; scale it down.
        let required: f64 = buys.iter().map(|(_, price, shares)| price * shares).sum();
        let scale = if required > self.cash_balance && required > 0.0 {
            self.cash_balance / required
        } else {
            1.0
        };

        for (security, price, shares) in buys {
            let shares = shares * scale;
            if shares < SHARES_EPSILON {
                continue;
            }
            let cost = shares * price;
            self.cash_balance -= cost;
            *self
                .current_holdings
                .entry((*security).clone())
                .or_insert(0.0) += shares;
            self.record(
                pie.date,
                TransactionKind::Buy,
                Some((*security).clone()),
                shares,
                price,
                cost,
                TransactionSource::Strategy,
                justification.clone(),
            );
        }

        // Absorb float dust so the invariant cash >= 0 holds exactly.
        if self.cash_balance < 0.0 && self.cash_balance > -1e-6 {
            self.cash_balance = 0.0;
        }

        debug!(
            portfolio_id = %self.id,
            %date,
            cash = self.cash_balance,
            positions = self.current_holdings.len(),
            "rebalanced"
        );
        Ok(())
    }

    /// Apply corporate actions dated in `(last_processed, through]`, splits
    /// before dividends on coincident dates. Idempotent across repeated
    /// updates with the same watermark.
    async fn apply_corporate_actions(
        &mut self,
        ctx: &Ctx,
        data: &dyn MetricService,
        through: NaiveDate,
    ) -> Result<(), PortfolioError> {
        let begin = match self.last_processed {
            Some(watermark) if watermark >= through => return Ok(()),
            Some(watermark) => watermark.succ_opt().expect("calendar date overflow"),
            None => eastern_date(self.start_date),
        };

        let held = self
            .current_holdings
            .keys()
            .map(|security| Arc::new(security.clone()))
            .collect::<Vec<_>>();
        if !held.is_empty() {
            let actions = data.corporate_actions(ctx, &held, begin, through).await?;
            let calendar = MarketCalendar::nyse();

            for action in actions {
                let Some(shares) = self
                    .current_holdings
                    .get(&action.security)
                    .copied()
                    .filter(|shares| *shares > SHARES_EPSILON)
                else {
                    continue;
                };
                let date = calendar.close_instant(action.date);

                match action.kind {
                    ActionKind::Split { ratio } => {
                        let new_shares = shares * ratio;
                        self.current_holdings
                            .insert(action.security.clone(), new_shares);
                        self.record(
                            date,
                            TransactionKind::Split,
                            Some(action.security.clone()),
                            new_shares,
                            0.0,
                            0.0,
                            TransactionSource::CorporateAction,
                            serde_json::json!({ "ratio": ratio }),
                        );
                    }
                    ActionKind::Dividend { amount } => {
                        let credit = shares * amount;
                        self.cash_balance += credit;
                        self.record(
                            date,
                            TransactionKind::Dividend,
                            Some(action.security.clone()),
                            shares,
                            amount,
                            credit,
                            TransactionSource::CorporateAction,
                            serde_json::json!({ "dividend": amount }),
                        );
                    }
                }
            }
        }

        self.last_processed = Some(through);
        Ok(())
    }

    /// Union of currently held securities and pie members, first occurrence
    /// wins.
    fn universe_with(&self, pie: &Pie) -> Vec<Arc<Security>> {
        let mut seen = IndexMap::new();
        for security in self.current_holdings.keys() {
            seen.entry(security.composite_figi.clone())
                .or_insert_with(|| Arc::new(security.clone()));
        }
        for security in pie.members.keys() {
            seen.entry(security.composite_figi.clone())
                .or_insert_with(|| Arc::clone(security));
        }
        seen.into_values().collect()
    }

    /// Append one ledger entry with the next sequence number.
    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        date: DateTime<Utc>,
        kind: TransactionKind,
        security: Option<Security>,
        shares: f64,
        price_per_share: f64,
        total_value: f64,
        source: TransactionSource,
        justification: Value,
    ) {
        let sequence_num = self
            .transactions
            .last()
            .map(|transaction| transaction.sequence_num + 1)
            .unwrap_or(1);

        match kind {
            TransactionKind::Deposit => self.total_deposited += total_value,
            TransactionKind::Withdraw => self.total_withdrawn += total_value,
            _ => {}
        }

        let source_id =
            Transaction::source_id(&self.id, date, security.as_ref(), kind, sequence_num);
        self.transactions.push(Transaction {
            sequence_num,
            date,
            kind,
            security,
            shares,
            price_per_share,
            total_value,
            source,
            source_id,
            justification,
        });
    }
}

fn close_price(
    frames: &SecurityFrames,
    security: &Security,
    date: NaiveDate,
) -> Result<f64, PortfolioError> {
    frames
        .value_on_or_before(security, date, Metric::Close)
        .ok_or_else(|| PortfolioError::PriceUnavailable {
            figi: security.composite_figi.clone(),
            date,
        })
}
