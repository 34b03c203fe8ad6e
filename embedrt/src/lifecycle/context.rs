//! Per-process runtime state.
//!
//! [`RuntimeContext`] replaces a file-scoped singleton: it is constructed once
//! at process start and passed to whoever drives the lifecycle. One-shot flags
//! inside it keep path decoding, builtin registration, bring-up and thread
//! enabling to a single execution each.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once, OnceLock};

use embedrt_api::{BuiltinModule, EmbeddedRuntime, PoolRegistry, RuntimeError, WakePrimitive};
use uuid::Uuid;

use super::state::{LifecycleState, StateCell};
use super::token::ExecutionToken;
use crate::bridge::{NotificationBridge, ThreadPoolSelector};
use crate::config::ModuleConfig;

/// Reserved name of the bridge's builtin extension module.
pub const BUILTIN_MODULE_NAME: &str = "embedrt._bridge";

/// What the host hands to the lifecycle hooks of one worker process.
#[derive(Clone)]
pub struct ProcessContext {
    pub worker_id: usize,
    /// The reactor's low-level wake primitive.
    pub wake: Arc<dyn WakePrimitive>,
    /// The host's thread pools.
    pub pools: Arc<dyn PoolRegistry>,
}

impl ProcessContext {
    pub fn new(
        worker_id: usize,
        wake: Arc<dyn WakePrimitive>,
        pools: Arc<dyn PoolRegistry>,
    ) -> Self {
        Self {
            worker_id,
            wake,
            pools,
        }
    }
}

impl fmt::Debug for ProcessContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessContext")
            .field("worker_id", &self.worker_id)
            .finish_non_exhaustive()
    }
}

pub struct RuntimeContext {
    id: Uuid,
    runtime: Arc<dyn EmbeddedRuntime>,
    config: Arc<ModuleConfig>,
    program_path: OnceLock<String>,
    registered: AtomicBool,
    bring_up_started: AtomicBool,
    brought_up: AtomicBool,
    threads: Once,
    state: StateCell,
    token: Arc<ExecutionToken>,
    selector: ThreadPoolSelector,
    bridge: OnceLock<Arc<NotificationBridge>>,
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("id", &self.id)
            .field("state", &self.state.load())
            .field("program_path", &self.program_path.get())
            .field("registered", &self.registered.load(Ordering::Relaxed))
            .field("brought_up", &self.brought_up.load(Ordering::Relaxed))
            .field("token", &self.token)
            .field("pool", &self.selector.selection())
            .finish()
    }
}

impl RuntimeContext {
    pub fn new(runtime: Arc<dyn EmbeddedRuntime>, config: ModuleConfig) -> Self {
        let selector = ThreadPoolSelector::new(config.thread_pool.clone());
        Self {
            id: Uuid::new_v4(),
            token: Arc::new(ExecutionToken::new(runtime.clone())),
            runtime,
            config: Arc::new(config),
            program_path: OnceLock::new(),
            registered: AtomicBool::new(false),
            bring_up_started: AtomicBool::new(false),
            brought_up: AtomicBool::new(false),
            threads: Once::new(),
            state: StateCell::new(),
            selector,
            bridge: OnceLock::new(),
        }
    }

    /// Correlates log lines emitted for this context.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn runtime(&self) -> &Arc<dyn EmbeddedRuntime> {
        &self.runtime
    }

    pub fn state(&self) -> LifecycleState {
        self.state.load()
    }

    pub(crate) fn state_cell(&self) -> &StateCell {
        &self.state
    }

    pub fn token(&self) -> &Arc<ExecutionToken> {
        &self.token
    }

    pub fn selector(&self) -> &ThreadPoolSelector {
        &self.selector
    }

    pub fn bridge(&self) -> Option<&Arc<NotificationBridge>> {
        self.bridge.get()
    }

    pub(crate) fn install_bridge(
        &self,
        make: impl FnOnce() -> NotificationBridge,
    ) -> Arc<NotificationBridge> {
        self.bridge.get_or_init(|| Arc::new(make())).clone()
    }

    /// Decoded program path, decoding it on first use only.
    pub fn program_path(&self) -> Result<&str, RuntimeError> {
        if let Some(path) = self.program_path.get() {
            return Ok(path.as_str());
        }
        let decoded = self.runtime.decode_program_path(&self.config.program_path)?;
        Ok(self.program_path.get_or_init(|| decoded).as_str())
    }

    /// Registers the builtin once. Refused after bring-up has started.
    /// Returns whether this call performed the registration.
    pub(crate) fn register_builtin(&self, module: BuiltinModule) -> Result<bool, RuntimeError> {
        if self.registered.load(Ordering::Acquire) {
            return Ok(false);
        }
        if self.bring_up_started.load(Ordering::Acquire) {
            return Err(RuntimeError::Registration(format!(
                "cannot register {} after runtime bring-up started",
                module.name()
            )));
        }
        self.runtime.register_builtin(module)?;
        self.registered.store(true, Ordering::Release);
        Ok(true)
    }

    /// One-time bring-up with threads enabled. Returns whether this call
    /// performed it; in that case the calling thread now owns the runtime's
    /// execution lock.
    ///
    /// The runtime is initialized at most once: after a failed attempt every
    /// later call fails without calling into it again.
    pub(crate) fn bring_up(&self) -> Result<bool, RuntimeError> {
        if self.brought_up.load(Ordering::Acquire) {
            return Ok(false);
        }
        if self.bring_up_started.swap(true, Ordering::AcqRel) {
            return Err(RuntimeError::Initialization(
                "an earlier bring-up attempt failed".to_string(),
            ));
        }
        self.runtime.initialize()?;
        self.brought_up.store(true, Ordering::Release);
        self.threads.call_once(|| self.runtime.enable_threads());
        Ok(true)
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub fn is_brought_up(&self) -> bool {
        self.brought_up.load(Ordering::Acquire)
    }
}
