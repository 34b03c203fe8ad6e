// embedrt: embedded runtime lifecycle and reactor notification bridge
//
// This crate drives a globally-locked scripting runtime through its per-process
// life inside an event-driven host, and lets any thread schedule callbacks on
// the host's reactor thread, through the host's worker pools when it can.
//
// The contracts it builds on live in `embedrt-api`; `host` carries a small
// reference implementation of those contracts.

pub mod bridge;
pub mod config;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod logging;

// Re-export commonly used types
pub use bridge::{BridgeConfig, NotificationBridge, PoolSelection, ThreadPoolSelector};
pub use config::{DEFAULT_POOL_NAME, FastPathPolicy, ModuleConfig};
pub use error::{ConfigError, HostError, LifecycleError, StartupPhase, TeardownError, TokenError};
pub use lifecycle::{
    BUILTIN_MODULE_NAME, ExecutionToken, LifecycleHooks, LifecycleManager, LifecycleState,
    NoopHooks, ProcessContext, RuntimeContext, TokenGuard,
};

pub use embedrt_api::{
    BuiltinModule, EmbeddedRuntime, EventHandler, Notifier, NotifyError, PoolRegistry, PoolTask,
    RejectReason, Rejected, RuntimeError, ThreadPool, WakeError, WakePrimitive,
};
