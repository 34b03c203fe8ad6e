//! # Host Seams
//!
//! Traits the host server implements so the bridge can reach its reactor
//! thread and its worker pools.
//!
//! ## Thread-safety contract
//!
//! | trait | callable from |
//! |-------|---------------|
//! | [`WakePrimitive::post`] | its single owner thread only |
//! | [`ThreadPool::submit`] | any thread |
//! | [`PoolTask::run`] | a pool thread |
//! | [`PoolTask::complete`] | the pool's completion thread (the reactor) |

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::errors::{NotifyError, RejectReason, WakeError};
use crate::types::EventHandler;

/// The host reactor's low-level wake primitive.
///
/// Only safe for a single well-known caller, usually the reactor thread
/// itself. Implementations report misuse and shutdown through [`WakeError`].
pub trait WakePrimitive: Send + Sync {
    /// Queues `handler` to run on the reactor thread.
    fn post(&self, handler: EventHandler) -> Result<(), WakeError>;

    /// Whether the calling thread is the primitive's permitted caller.
    fn on_owner_thread(&self) -> bool;
}

/// A unit of work submitted to a host thread pool.
///
/// The pool calls [`run`](PoolTask::run) on one of its threads, then hands the
/// task to its completion channel, which calls
/// [`complete`](PoolTask::complete) on the completion thread.
pub trait PoolTask: Send {
    /// Body executed on a pool thread.
    fn run(&mut self);

    /// Completion step executed on the pool's completion thread. Consumes the task.
    fn complete(self: Box<Self>);
}

/// A task the pool refused, handed back to the submitter.
///
/// Ownership of the task returns to the caller so it is released exactly once
/// by the caller's failure path.
#[derive(Error)]
#[error("pool rejected task: {reason}")]
pub struct Rejected {
    /// Why the pool refused the task.
    pub reason: RejectReason,
    /// The task itself, never run.
    pub task: Box<dyn PoolTask>,
}

impl Rejected {
    pub fn new(reason: RejectReason, task: Box<dyn PoolTask>) -> Self {
        Self { reason, task }
    }

    /// Splits the rejection into its reason and the returned task.
    pub fn into_parts(self) -> (RejectReason, Box<dyn PoolTask>) {
        (self.reason, self.task)
    }
}

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("reason", &self.reason)
            .field("task", &"<pool-task>")
            .finish()
    }
}

/// A named pool of OS threads owned by the host.
pub trait ThreadPool: Send + Sync + fmt::Debug {
    /// Name the pool is registered under.
    fn name(&self) -> &str;

    /// Submits a task without blocking.
    fn submit(&self, task: Box<dyn PoolTask>) -> Result<(), Rejected>;
}

/// The host's name → pool lookup table.
pub trait PoolRegistry: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Arc<dyn ThreadPool>>;
}

/// "Run this callback on the reactor thread", as exposed to protocol adapters
/// and to interpreted code through the builtin module.
pub trait Notifier: Send + Sync {
    fn notify_boxed(&self, handler: EventHandler) -> Result<(), NotifyError>;
}
