//! # Notification Bridge
//!
//! Lets any thread schedule a callback on the reactor thread.
//!
//! ## Key Concepts
//! - Thread pool selection: configured name, then `"default"`, then none
//! - Worker task envelope: a no-op pool task whose completion step runs the
//!   handler on the pool's completion thread (the reactor)
//! - Fast path: direct use of the host's single-caller wake primitive when no
//!   pool is available
//!
//! ## Thread Safety
//! - The safe path only relies on the pool's completion channel, which the
//!   host guarantees is callable from any thread
//! - The fast path is gated by [`FastPathPolicy`](crate::config::FastPathPolicy)

mod envelope;
mod notifier;
mod selector;

pub use envelope::WorkerTaskEnvelope;
pub use notifier::{BridgeConfig, NotificationBridge};
pub use selector::{PoolSelection, ThreadPoolSelector};
