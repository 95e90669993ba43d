use crate::security::Security;
use fnv::FnvHashMap;
use parking_lot::RwLock;
use smol_str::SmolStr;
use std::sync::{Arc, OnceLock};

/// Process-wide security directory, lazily populated and keyed by both
/// composite FIGI and ticker.
///
/// Entries are immutable once inserted and never evicted: the first insert of
/// a FIGI wins and later inserts return the existing entry. Reads take a
/// shared lock only.
#[derive(Debug, Default)]
pub struct SecurityDirectory {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    by_figi: FnvHashMap<SmolStr, Arc<Security>>,
    by_ticker: FnvHashMap<SmolStr, Arc<Security>>,
}

/// The process-wide [`SecurityDirectory`].
pub fn directory() -> &'static SecurityDirectory {
    static DIRECTORY: OnceLock<SecurityDirectory> = OnceLock::new();
    DIRECTORY.get_or_init(SecurityDirectory::default)
}

impl SecurityDirectory {
    /// Lookup by composite FIGI.
    pub fn by_figi(&self, composite_figi: &str) -> Option<Arc<Security>> {
        self.inner.read().by_figi.get(composite_figi).cloned()
    }

    /// Lookup by ticker.
    pub fn by_ticker(&self, ticker: &str) -> Option<Arc<Security>> {
        self.inner.read().by_ticker.get(ticker).cloned()
    }

    /// Insert a security, returning the directory entry. Idempotent: an
    /// existing FIGI entry is returned unchanged (single-flight on the write
    /// lock).
    pub fn insert(&self, security: Security) -> Arc<Security> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.by_figi.get(&security.composite_figi) {
            return Arc::clone(existing);
        }

        let entry = Arc::new(security);
        inner
            .by_figi
            .insert(entry.composite_figi.clone(), Arc::clone(&entry));
        inner
            .by_ticker
            .insert(entry.ticker.clone(), Arc::clone(&entry));
        entry
    }

    /// Number of distinct securities known.
    pub fn len(&self) -> usize {
        self.inner.read().by_figi.len()
    }

    /// True iff no securities have been entered.
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_figi.is_empty()
    }
}
