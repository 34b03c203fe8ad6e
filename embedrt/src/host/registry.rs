use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use embedrt_api::{PoolRegistry, ThreadPool};

use super::pool::{WorkerPool, WorkerPoolConfig};
use super::reactor::{Reactor, ReactorHandle};
use crate::error::HostError;

/// Name → pool table of the reference host.
#[derive(Debug, Default)]
pub struct PoolMap {
    pools: RwLock<HashMap<String, Arc<WorkerPool>>>,
}

impl PoolMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, pool: Arc<WorkerPool>) -> Result<(), HostError> {
        let mut pools = self.pools.write().unwrap_or_else(PoisonError::into_inner);
        let name = pool.name().to_string();
        if pools.contains_key(&name) {
            return Err(HostError::DuplicatePool(name));
        }
        pools.insert(name, pool);
        Ok(())
    }

    /// Creates a pool completing on `completion` and registers it under `name`.
    pub fn spawn(
        &self,
        name: &str,
        config: WorkerPoolConfig,
        completion: ReactorHandle,
    ) -> Result<Arc<WorkerPool>, HostError> {
        if self.get(name).is_some() {
            return Err(HostError::DuplicatePool(name.to_string()));
        }
        let pool = WorkerPool::new(name, config, completion)?;
        if let Err(e) = self.insert(pool.clone()) {
            pool.shutdown();
            return Err(e);
        }
        Ok(pool)
    }

    pub fn get(&self, name: &str) -> Option<Arc<WorkerPool>> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<WorkerPool>> {
        self.pools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Shuts every pool down and empties the table. Runs on the thread owning
    /// `reactor`, which is turned until the pools' completions have drained.
    pub fn shutdown_all(&self, reactor: &mut Reactor) {
        let pools: Vec<_> = self
            .pools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, pool)| pool)
            .collect();
        for pool in pools {
            pool.shutdown_draining(reactor);
        }
    }
}

impl PoolRegistry for PoolMap {
    fn lookup(&self, name: &str) -> Option<Arc<dyn ThreadPool>> {
        self.get(name).map(|pool| pool as Arc<dyn ThreadPool>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{PoolStatus, ReactorConfig};
    use embedrt_api::PoolTask;

    struct Noop;

    impl PoolTask for Noop {
        fn run(&mut self) {}

        fn complete(self: Box<Self>) {}
    }

    fn small() -> WorkerPoolConfig {
        WorkerPoolConfig {
            threads: 1,
            queue_capacity: 4,
            thread_name_prefix: "registry-test".to_string(),
        }
    }

    #[test]
    fn test_spawn_and_lookup() {
        let mut reactor = Reactor::new(ReactorConfig::default());
        let map = PoolMap::new();
        map.spawn("default", small(), reactor.handle()).unwrap();
        map.spawn("io", small(), reactor.handle()).unwrap();

        assert_eq!(map.names(), vec!["default".to_string(), "io".to_string()]);
        assert_eq!(map.lookup("io").map(|p| p.name().to_string()), Some("io".to_string()));
        assert!(map.lookup("missing").is_none());

        map.shutdown_all(&mut reactor);
        assert!(map.names().is_empty());
    }

    #[test]
    fn test_duplicate_name_is_refused() {
        let mut reactor = Reactor::new(ReactorConfig::default());
        let map = PoolMap::new();
        map.spawn("default", small(), reactor.handle()).unwrap();

        let err = map.spawn("default", small(), reactor.handle()).unwrap_err();
        assert!(matches!(err, HostError::DuplicatePool(ref name) if name == "default"));

        map.shutdown_all(&mut reactor);
    }

    #[test]
    fn test_shutdown_all_with_pending_completions() {
        let mut reactor = Reactor::new(ReactorConfig {
            completion_capacity: 1,
            ..ReactorConfig::default()
        });
        let map = PoolMap::new();
        let pool = map.spawn("default", small(), reactor.handle()).unwrap();
        for _ in 0..3 {
            pool.submit(Box::new(Noop)).unwrap();
        }

        map.shutdown_all(&mut reactor);
        assert_eq!(pool.status(), PoolStatus::Shutdown);
        assert_eq!(pool.completed(), 3);
    }
}
