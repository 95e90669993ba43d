use chrono::{DateTime, Utc};
use folio_instrument::Security;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// The effect of a ledger [`Transaction`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Buy,
    Sell,
    Dividend,
    Split,
    Deposit,
    Withdraw,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Dividend => "DIVIDEND",
            Self::Split => "SPLIT",
            Self::Deposit => "DEPOSIT",
            Self::Withdraw => "WITHDRAW",
        };
        f.write_str(name)
    }
}

/// Origin of a ledger [`Transaction`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionSource {
    Strategy,
    CorporateAction,
    User,
}

/// One entry of the append-only transaction ledger.
///
/// Uniqueness key: `(portfolio_id, source_id)`. Ordering key:
/// `(date, sequence_num)`, strictly increasing within a portfolio.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Transaction {
    pub sequence_num: u64,
    pub date: DateTime<Utc>,
    pub kind: TransactionKind,
    /// Absent for pure cash movements (deposits and withdrawals).
    pub security: Option<Security>,
    pub shares: f64,
    pub price_per_share: f64,
    pub total_value: f64,
    pub source: TransactionSource,
    pub source_id: Uuid,
    pub justification: Value,
}

impl Transaction {
    /// Deterministic transaction identity: a v5 UUID in the portfolio's
    /// namespace over the canonical `(date, security, kind, sequence_num)`
    /// string. Re-running a simulation reproduces identical source ids, so
    /// upserts conflict instead of duplicating.
    pub fn source_id(
        portfolio_id: &Uuid,
        date: DateTime<Utc>,
        security: Option<&Security>,
        kind: TransactionKind,
        sequence_num: u64,
    ) -> Uuid {
        let figi = security.map(|s| s.composite_figi.as_str()).unwrap_or("CASH");
        let name = format!("{}|{}|{}|{}", date.to_rfc3339(), figi, kind, sequence_num);
        Uuid::new_v5(portfolio_id, name.as_bytes())
    }
}

/// Per-portfolio notification bitfield.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Deserialize, Serialize)]
pub struct Notifications(pub u32);

impl Notifications {
    pub const DAILY: u32 = 0x10;
    pub const WEEKLY: u32 = 0x100;
    pub const MONTHLY: u32 = 0x1000;
    pub const ANNUALLY: u32 = 0x10000;

    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    pub fn with(mut self, flag: u32) -> Self {
        self.0 |= flag;
        self
    }
}

/// Observable progress entry attached to a portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Activity {
    pub date: DateTime<Utc>,
    pub message: String,
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_is_deterministic_and_distinct() {
        let portfolio_id = Uuid::new_v4();
        let date: DateTime<Utc> = "2020-06-30T20:00:00Z".parse().unwrap();
        let security = Security::from_parts("VFINX", "BBG000BHTMY2");

        let first = Transaction::source_id(
            &portfolio_id,
            date,
            Some(&security),
            TransactionKind::Buy,
            3,
        );
        let again = Transaction::source_id(
            &portfolio_id,
            date,
            Some(&security),
            TransactionKind::Buy,
            3,
        );
        let other_seq = Transaction::source_id(
            &portfolio_id,
            date,
            Some(&security),
            TransactionKind::Buy,
            4,
        );
        let other_kind = Transaction::source_id(
            &portfolio_id,
            date,
            Some(&security),
            TransactionKind::Sell,
            3,
        );

        assert_eq!(first, again);
        assert_ne!(first, other_seq);
        assert_ne!(first, other_kind);
    }

    #[test]
    fn test_notifications_bitfield() {
        let notifications = Notifications::default()
            .with(Notifications::DAILY)
            .with(Notifications::MONTHLY);

        assert!(notifications.contains(Notifications::DAILY));
        assert!(notifications.contains(Notifications::MONTHLY));
        assert!(!notifications.contains(Notifications::WEEKLY));
        assert_eq!(notifications.0, 0x1010);
    }

    #[test]
    fn test_kind_wire_shape() {
        assert_eq!(
            serde_json::to_string(&TransactionKind::Dividend).unwrap(),
            r#""DIVIDEND""#
        );
    }
}
