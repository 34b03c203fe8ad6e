use std::fmt;
use std::sync::{Arc, OnceLock};

use embedrt_api::{PoolRegistry, ThreadPool};
use tracing::{debug, warn};

use crate::config::DEFAULT_POOL_NAME;

/// Outcome of thread pool resolution.
#[derive(Clone)]
pub enum PoolSelection {
    /// The configured pool exists.
    Configured(Arc<dyn ThreadPool>),
    /// The configured pool was absent or unset; the default pool exists.
    Default(Arc<dyn ThreadPool>),
    /// No pool; the bridge is restricted to the fast path.
    Unavailable,
}

impl PoolSelection {
    pub fn pool(&self) -> Option<&Arc<dyn ThreadPool>> {
        match self {
            PoolSelection::Configured(pool) | PoolSelection::Default(pool) => Some(pool),
            PoolSelection::Unavailable => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.pool().map(|pool| pool.name())
    }

    pub fn is_available(&self) -> bool {
        self.pool().is_some()
    }
}

impl fmt::Debug for PoolSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolSelection::Configured(pool) => {
                f.debug_tuple("Configured").field(&pool.name()).finish()
            }
            PoolSelection::Default(pool) => {
                f.debug_tuple("Default").field(&pool.name()).finish()
            }
            PoolSelection::Unavailable => f.write_str("Unavailable"),
        }
    }
}

/// Resolves `configured name -> "default" -> none` once and caches the answer.
#[derive(Debug)]
pub struct ThreadPoolSelector {
    configured: Option<String>,
    resolved: OnceLock<PoolSelection>,
}

impl ThreadPoolSelector {
    pub fn new(configured: Option<String>) -> Self {
        Self {
            configured,
            resolved: OnceLock::new(),
        }
    }

    pub fn configured(&self) -> Option<&str> {
        self.configured.as_deref()
    }

    /// Resolves against `registry` on the first call; later calls return the
    /// cached selection and ignore `registry`.
    pub fn resolve(&self, registry: &dyn PoolRegistry) -> &PoolSelection {
        self.resolved
            .get_or_init(|| Self::lookup(self.configured.as_deref(), registry))
    }

    pub fn selection(&self) -> Option<&PoolSelection> {
        self.resolved.get()
    }

    fn lookup(configured: Option<&str>, registry: &dyn PoolRegistry) -> PoolSelection {
        if let Some(name) = configured {
            if let Some(pool) = registry.lookup(name) {
                debug!(pool = name, "using configured thread pool");
                return PoolSelection::Configured(pool);
            }
            warn!(
                pool = name,
                fallback = DEFAULT_POOL_NAME,
                "configured thread pool not found"
            );
        }

        if let Some(pool) = registry.lookup(DEFAULT_POOL_NAME) {
            debug!(pool = DEFAULT_POOL_NAME, "using default thread pool");
            return PoolSelection::Default(pool);
        }

        warn!(
            "no thread pool available; notifications are limited to the \
             single-caller fast path"
        );
        PoolSelection::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedrt_api::{PoolTask, Rejected};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct NamedPool(String);

    impl ThreadPool for NamedPool {
        fn name(&self) -> &str {
            &self.0
        }

        fn submit(&self, task: Box<dyn PoolTask>) -> Result<(), Rejected> {
            drop(task);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingRegistry {
        pools: HashMap<String, Arc<dyn ThreadPool>>,
        lookups: AtomicUsize,
    }

    impl CountingRegistry {
        fn with(names: &[&str]) -> Self {
            let pools = names
                .iter()
                .map(|n| (n.to_string(), Arc::new(NamedPool(n.to_string())) as Arc<dyn ThreadPool>))
                .collect();
            Self {
                pools,
                lookups: AtomicUsize::new(0),
            }
        }
    }

    impl PoolRegistry for CountingRegistry {
        fn lookup(&self, name: &str) -> Option<Arc<dyn ThreadPool>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.pools.get(name).cloned()
        }
    }

    #[test]
    fn test_configured_pool_wins() {
        let registry = CountingRegistry::with(&["io", "default"]);
        let selector = ThreadPoolSelector::new(Some("io".into()));

        let selection = selector.resolve(&registry);
        assert!(matches!(selection, PoolSelection::Configured(_)));
        assert_eq!(selection.name(), Some("io"));
    }

    #[test]
    fn test_falls_back_to_default() {
        let registry = CountingRegistry::with(&["default"]);
        let selector = ThreadPoolSelector::new(Some("workers-x".into()));

        let selection = selector.resolve(&registry);
        assert!(matches!(selection, PoolSelection::Default(_)));
        assert_eq!(selection.name(), Some("default"));
    }

    #[test]
    fn test_unconfigured_uses_default() {
        let registry = CountingRegistry::with(&["default"]);
        let selector = ThreadPoolSelector::new(None);

        assert_eq!(selector.resolve(&registry).name(), Some("default"));
    }

    #[test]
    fn test_resolution_is_cached() {
        let registry = CountingRegistry::with(&[]);
        let selector = ThreadPoolSelector::new(Some("missing".into()));
        assert!(selector.selection().is_none());

        assert!(!selector.resolve(&registry).is_available());
        let lookups = registry.lookups.load(Ordering::SeqCst);
        assert_eq!(lookups, 2);

        let later = CountingRegistry::with(&["default"]);
        assert!(!selector.resolve(&later).is_available());
        assert_eq!(later.lookups.load(Ordering::SeqCst), 0);
    }
}
