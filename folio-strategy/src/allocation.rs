use crate::error::StrategyError;
use chrono::{DateTime, Utc};
use folio_instrument::Security;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::sync::Arc;

/// Tolerance on the weight sum of a non-empty pie.
pub const WEIGHT_EPSILON: f64 = 1e-6;

/// A target allocation over securities at a single date.
///
/// Weights are non-negative and a non-empty pie sums to at most `1 + epsilon`
/// (a sum below 1 leaves the remainder in cash). Justifications are free-form
/// numeric annotations (scores, counts, fractions) surfaced to users and
/// tests.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Pie {
    pub date: DateTime<Utc>,
    #[serde(with = "members_wire")]
    pub members: IndexMap<Arc<Security>, f64>,
    pub justifications: IndexMap<SmolStr, f64>,
}

impl Pie {
    /// An empty pie (all cash) at a date.
    pub fn empty(date: DateTime<Utc>) -> Self {
        Self {
            date,
            members: IndexMap::new(),
            justifications: IndexMap::new(),
        }
    }

    /// A 100% single-security pie at a date.
    pub fn single(date: DateTime<Utc>, security: Arc<Security>) -> Self {
        let mut members = IndexMap::new();
        members.insert(security, 1.0);
        Self {
            date,
            members,
            justifications: IndexMap::new(),
        }
    }

    /// Attach a justification, builder-style.
    pub fn justify(mut self, key: impl Into<SmolStr>, value: f64) -> Self {
        self.justifications.insert(key.into(), value);
        self
    }

    /// Sum of member weights.
    pub fn weight_sum(&self) -> f64 {
        self.members.values().sum()
    }

    /// Validate weight bounds.
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.members.values().any(|weight| *weight < 0.0) {
            return Err(StrategyError::InvalidPlan(format!(
                "negative weight in pie at {}",
                self.date
            )));
        }
        if !self.members.is_empty() && self.weight_sum() > 1.0 + WEIGHT_EPSILON {
            return Err(StrategyError::InvalidPlan(format!(
                "weights sum to {} > 1 in pie at {}",
                self.weight_sum(),
                self.date
            )));
        }
        Ok(())
    }
}

/// Time-ordered sequence of pies with strictly increasing dates, all aligned
/// to the producing strategy's schedule.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Plan {
    pies: Vec<Pie>,
}

impl Plan {
    /// Validate and wrap a pie sequence.
    pub fn new(pies: Vec<Pie>) -> Result<Self, StrategyError> {
        for pair in pies.windows(2) {
            if pair[0].date >= pair[1].date {
                return Err(StrategyError::InvalidPlan(format!(
                    "pie dates not strictly increasing: {} then {}",
                    pair[0].date, pair[1].date
                )));
            }
        }
        for pie in &pies {
            pie.validate()?;
        }
        Ok(Self { pies })
    }

    pub fn pies(&self) -> &[Pie] {
        &self.pies
    }

    pub fn len(&self) -> usize {
        self.pies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pies.is_empty()
    }

    pub fn first(&self) -> Option<&Pie> {
        self.pies.first()
    }

    pub fn last(&self) -> Option<&Pie> {
        self.pies.last()
    }

    pub fn into_pies(self) -> Vec<Pie> {
        self.pies
    }
}

/// Wire shape for pie members: a list of `{security, weight}` pairs, since
/// JSON maps cannot key on a composite object.
mod members_wire {
    use super::*;
    use serde::{Deserializer, Serializer, ser::SerializeSeq};

    #[derive(Deserialize, Serialize)]
    struct Member {
        security: Security,
        weight: f64,
    }

    pub fn serialize<S: Serializer>(
        members: &IndexMap<Arc<Security>, f64>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(members.len()))?;
        for (security, weight) in members {
            seq.serialize_element(&Member {
                security: (**security).clone(),
                weight: *weight,
            })?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<IndexMap<Arc<Security>, f64>, D::Error> {
        let members = Vec::<Member>::deserialize(deserializer)?;
        Ok(members
            .into_iter()
            .map(|member| (Arc::new(member.security), member.weight))
            .collect())
    }
}
