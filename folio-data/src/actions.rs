use chrono::NaiveDate;
use folio_instrument::Security;
use serde::{Deserialize, Serialize};

/// A corporate action affecting share counts or cash.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CorporateAction {
    pub date: NaiveDate,
    pub security: Security,
    pub kind: ActionKind,
}

/// The effect of a [`CorporateAction`].
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub enum ActionKind {
    /// Share counts multiply by `ratio`; prices divide by it.
    Split { ratio: f64 },
    /// Cash credit of `amount` per share held.
    Dividend { amount: f64 },
}

impl ActionKind {
    fn order(&self) -> u8 {
        // Splits apply before dividends on coincident dates.
        match self {
            Self::Split { .. } => 0,
            Self::Dividend { .. } => 1,
        }
    }
}

/// Deterministic application order: date ascending, splits before dividends,
/// then composite FIGI. Re-runs over the same action set must produce
/// identical ledgers.
pub fn sort_actions(actions: &mut [CorporateAction]) {
    actions.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then(a.kind.order().cmp(&b.kind.order()))
            .then(a.security.composite_figi.cmp(&b.security.composite_figi))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_sort_is_deterministic_with_splits_first() {
        let alpha = Security::from_parts("AAA", "BBG00000AAA0");
        let beta = Security::from_parts("BBB", "BBG00000BBB0");

        let mut actions = vec![
            CorporateAction {
                date: ymd(2020, 6, 1),
                security: beta.clone(),
                kind: ActionKind::Dividend { amount: 0.5 },
            },
            CorporateAction {
                date: ymd(2020, 6, 1),
                security: alpha.clone(),
                kind: ActionKind::Dividend { amount: 0.3 },
            },
            CorporateAction {
                date: ymd(2020, 6, 1),
                security: beta.clone(),
                kind: ActionKind::Split { ratio: 2.0 },
            },
            CorporateAction {
                date: ymd(2020, 5, 1),
                security: alpha.clone(),
                kind: ActionKind::Dividend { amount: 0.2 },
            },
        ];

        sort_actions(&mut actions);

        assert_eq!(actions[0].date, ymd(2020, 5, 1));
        assert!(matches!(actions[1].kind, ActionKind::Split { .. }));
        assert_eq!(actions[2].security, alpha);
        assert_eq!(actions[3].security, beta);
    }
}
