use crate::{performance::metrics::PortfolioMetrics, repository::MetricsRow};
use arc_swap::ArcSwap;
use fnv::FnvHashMap;
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::debug;

/// Read-mostly cache of the latest [`PortfolioMetrics`] per strategy
/// shortcode.
///
/// A scheduled task refreshes the whole snapshot; readers observe either the
/// previous or the new complete snapshot, never a partial one.
#[derive(Debug, Default)]
pub struct MetricCache {
    snapshot: ArcSwap<FnvHashMap<SmolStr, Arc<PortfolioMetrics>>>,
}

impl MetricCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest metrics of a strategy, if any refresh has seen it.
    pub fn get(&self, shortcode: &str) -> Option<Arc<PortfolioMetrics>> {
        self.snapshot.load().get(shortcode).cloned()
    }

    /// Replace the snapshot atomically from freshly loaded metrics rows.
    /// The last row per shortcode wins.
    pub fn refresh<I>(&self, rows: I)
    where
        I: IntoIterator<Item = MetricsRow>,
    {
        let mut snapshot = FnvHashMap::default();
        for row in rows {
            snapshot.insert(row.strategy_shortcode.clone(), Arc::new(row.metrics));
        }
        debug!(strategies = snapshot.len(), "metric cache refreshed");
        self.snapshot.store(Arc::new(snapshot));
    }
}
