//! # Runtime Lifecycle
//!
//! Brings the embedded runtime up and down once per worker process and owns
//! the execution-context token.
//!
//! ## Lifecycle
//! ```text
//! init(process)
//!   ├─► resolve thread pool, build notification bridge
//!   ├─► decode + cache program path, apply module search path
//!   ├─► register builtin module (before bring-up only)
//!   ├─► bring up runtime, enable threads (once)
//!   ├─► import builtin module
//!   ├─► on_start hook (token held)
//!   └─► park token                                 state: Suspended
//!
//! ... reactor loop runs, handlers check the token out as needed ...
//!
//! shutdown(process)
//!   ├─► re-acquire token (re-entrant)              state: Resuming
//!   ├─► on_stop hook
//!   ├─► finalize runtime (failure logged only)
//!   └─► retire token                               state: Finalized
//! ```

mod context;
mod manager;
mod state;
mod token;

pub use context::{BUILTIN_MODULE_NAME, ProcessContext, RuntimeContext};
pub use manager::{LifecycleHooks, LifecycleManager, NoopHooks};
pub use state::LifecycleState;
pub use token::{ExecutionToken, TokenGuard};
