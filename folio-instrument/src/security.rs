use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

/// A tradeable security, identified by a stable composite FIGI and a human
/// ticker.
///
/// Equality, ordering and hashing use the composite FIGI only: two entries
/// with the same FIGI are the same instrument even if one carries a stale
/// ticker.
#[derive(Debug, Clone, Deserialize, Serialize, Constructor)]
#[serde(rename_all = "camelCase")]
pub struct Security {
    pub ticker: SmolStr,
    pub composite_figi: SmolStr,
}

impl Security {
    /// Convenience constructor from string slices.
    pub fn from_parts(ticker: &str, composite_figi: &str) -> Self {
        Self {
            ticker: SmolStr::new(ticker),
            composite_figi: SmolStr::new(composite_figi),
        }
    }
}

impl PartialEq for Security {
    fn eq(&self, other: &Self) -> bool {
        self.composite_figi == other.composite_figi
    }
}

impl Eq for Security {}

impl PartialOrd for Security {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Security {
    fn cmp(&self, other: &Self) -> Ordering {
        self.composite_figi.cmp(&other.composite_figi)
    }
}

impl Hash for Security {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.composite_figi.hash(state);
    }
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.ticker, self.composite_figi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_by_composite_figi() {
        let a = Security::from_parts("VFINX", "BBG000BHTMY2");
        let b = Security::from_parts("RENAMED", "BBG000BHTMY2");
        let c = Security::from_parts("VFINX", "BBG000OTHER0");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_serde_wire_shape() {
        let security = Security::from_parts("VUSTX", "BBG000BCKYB9");

        let json = serde_json::to_string(&security).unwrap();
        assert_eq!(
            json,
            r#"{"ticker":"VUSTX","compositeFigi":"BBG000BCKYB9"}"#
        );

        let parsed: Security = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, security);
    }
}
