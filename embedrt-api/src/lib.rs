//! # embedrt API
//!
//! Abstract seams between three parties that have to cooperate inside one
//! worker process of an event-driven host server:
//!
//! - **The embedded runtime**: a globally-locked interpreter that may only run
//!   code on the thread currently holding its execution lock.
//! - **The host**: owns the single reactor thread, its low-level wake primitive
//!   and any named pools of OS worker threads.
//! - **The bridge**: the `embedrt` crate, which drives the runtime lifecycle and
//!   forwards completion callbacks onto the reactor thread.
//!
//! Nothing in this crate spawns threads or touches I/O; it only fixes the
//! contracts each side implements.
//!
//! ## Module Organization
//!
//! - [`runtime`]: the embedded runtime trait and the builtin module descriptor
//! - [`host`]: wake primitive, thread pool, pool task and pool registry traits
//! - [`errors`]: error types shared across the seams
//! - [`types`]: common type definitions

pub mod errors;
pub mod host;
pub mod runtime;
pub mod types;

pub use errors::{NotifyError, RejectReason, RuntimeError, WakeError};
pub use host::{Notifier, PoolRegistry, PoolTask, Rejected, ThreadPool, WakePrimitive};
pub use runtime::{BuiltinModule, EmbeddedRuntime};
pub use types::EventHandler;
