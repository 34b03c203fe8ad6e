use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use embedrt_api::{EventHandler, Notifier, NotifyError, ThreadPool, WakePrimitive};
use tracing::{debug, trace};

use super::envelope::{EnvelopeSlot, WorkerTaskEnvelope};
use crate::config::{DEFAULT_MAX_IN_FLIGHT_ENVELOPES, FastPathPolicy, ModuleConfig};

/// Settings for a [`NotificationBridge`].
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    pub fast_path_policy: FastPathPolicy,
    pub max_in_flight: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            fast_path_policy: FastPathPolicy::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT_ENVELOPES,
        }
    }
}

impl From<&ModuleConfig> for BridgeConfig {
    fn from(config: &ModuleConfig) -> Self {
        Self {
            fast_path_policy: config.fast_path_policy,
            max_in_flight: config.max_in_flight_envelopes,
        }
    }
}

/// Runs callbacks on the reactor thread on behalf of any thread.
///
/// Two strategies, fixed at construction:
///
/// - **Safe path** (a pool was resolved): the handler travels inside a
///   [`WorkerTaskEnvelope`] through the pool, whose completion channel brings
///   it back to the reactor thread. Safe from any number of threads.
/// - **Fast path** (no pool): the handler goes straight to the host's wake
///   primitive, which only tolerates its single owner. Under
///   [`FastPathPolicy::ReactorThreadOnly`] other callers get
///   [`NotifyError::ForeignThread`].
pub struct NotificationBridge {
    wake: Arc<dyn WakePrimitive>,
    pool: Option<Arc<dyn ThreadPool>>,
    config: BridgeConfig,
    in_flight: Arc<AtomicUsize>,
    next_envelope: AtomicU64,
    routed: AtomicU64,
    direct: AtomicU64,
}

impl NotificationBridge {
    pub fn new(
        wake: Arc<dyn WakePrimitive>,
        pool: Option<Arc<dyn ThreadPool>>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            wake,
            pool,
            config,
            in_flight: Arc::new(AtomicUsize::new(0)),
            next_envelope: AtomicU64::new(1),
            routed: AtomicU64::new(0),
            direct: AtomicU64::new(0),
        }
    }

    /// Requests that `handler` run exactly once on the reactor thread.
    ///
    /// On error the handler has been dropped without running.
    pub fn notify<F>(&self, handler: F) -> Result<(), NotifyError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.notify_boxed(Box::new(handler))
    }

    fn notify_direct(&self, handler: EventHandler) -> Result<(), NotifyError> {
        if self.config.fast_path_policy != FastPathPolicy::TrustCaller
            && !self.wake.on_owner_thread()
        {
            debug!("fast-path notification refused off the reactor thread");
            return Err(NotifyError::ForeignThread);
        }

        self.wake.post(handler)?;
        self.direct.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn notify_routed(
        &self,
        pool: &Arc<dyn ThreadPool>,
        handler: EventHandler,
    ) -> Result<(), NotifyError> {
        let limit = self.config.max_in_flight;
        let slot = EnvelopeSlot::claim(&self.in_flight, limit)
            .ok_or(NotifyError::EnvelopeBudget { limit })?;

        let id = self.next_envelope.fetch_add(1, Ordering::Relaxed);
        let envelope = Box::new(WorkerTaskEnvelope::new(id, handler, slot));

        match pool.submit(envelope) {
            Ok(()) => {
                self.routed.fetch_add(1, Ordering::Relaxed);
                trace!(envelope_id = id, pool = pool.name(), "envelope submitted");
                Ok(())
            }
            Err(rejected) => {
                let (reason, task) = rejected.into_parts();
                drop(task);
                debug!(
                    envelope_id = id,
                    pool = pool.name(),
                    reason = reason.as_label(),
                    "envelope rejected by pool"
                );
                Err(NotifyError::Submission(reason))
            }
        }
    }

    /// Whether notifications go through a pool.
    pub fn is_routed(&self) -> bool {
        self.pool.is_some()
    }

    pub fn pool_name(&self) -> Option<&str> {
        self.pool.as_ref().map(|pool| pool.name())
    }

    pub fn config(&self) -> BridgeConfig {
        self.config
    }

    /// Envelopes submitted but not yet completed or dropped.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn routed_count(&self) -> u64 {
        self.routed.load(Ordering::Relaxed)
    }

    pub fn direct_count(&self) -> u64 {
        self.direct.load(Ordering::Relaxed)
    }
}

impl Notifier for NotificationBridge {
    fn notify_boxed(&self, handler: EventHandler) -> Result<(), NotifyError> {
        match &self.pool {
            Some(pool) => self.notify_routed(pool, handler),
            None => self.notify_direct(handler),
        }
    }
}

impl fmt::Debug for NotificationBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBridge")
            .field("pool", &self.pool_name())
            .field("config", &self.config)
            .field("in_flight", &self.in_flight())
            .field("routed", &self.routed_count())
            .field("direct", &self.direct_count())
            .finish()
    }
}
