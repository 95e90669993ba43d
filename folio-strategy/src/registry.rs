use crate::{error::StrategyError, info::StrategyInfo, strategies};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::sync::OnceLock;
use tracing::info;

/// Process-wide strategy registry. Populated once at bootstrap with one
/// explicit `register` call per bundled strategy; read-only thereafter.
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    strategies: IndexMap<SmolStr, StrategyInfo>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy under its shortcode. Last write wins; bootstrap
    /// registers each shortcode exactly once.
    pub fn register(&mut self, info: StrategyInfo) {
        info!(shortcode = %info.shortcode, version = %info.version, "registered strategy");
        self.strategies.insert(info.shortcode.clone(), info);
    }

    /// Lookup a strategy by shortcode.
    pub fn lookup(&self, shortcode: &str) -> Result<&StrategyInfo, StrategyError> {
        self.strategies
            .get(shortcode)
            .ok_or_else(|| StrategyError::UnknownStrategy(SmolStr::new(shortcode)))
    }

    /// Every registered strategy, in registration order.
    pub fn infos(&self) -> impl Iterator<Item = &StrategyInfo> {
        self.strategies.values()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// The process-wide registry, populated on first use with the bundled
/// strategies.
pub fn registry() -> &'static StrategyRegistry {
    static REGISTRY: OnceLock<StrategyRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut registry = StrategyRegistry::new();
        registry.register(strategies::adm::info());
        registry.register(strategies::daa::info());
        registry.register(strategies::paa::info());
        registry.register(strategies::mdep::info());
        registry
    })
}
