//! # Error Types Shared Across the Seams
//!
//! - [`RuntimeError`]: failures reported by an [`EmbeddedRuntime`](crate::EmbeddedRuntime)
//! - [`WakeError`]: failures of the host's low-level reactor wake primitive
//! - [`RejectReason`]: why a thread pool refused a task
//! - [`NotifyError`]: what a caller of the notification bridge gets back
//!
//! Every enum carries an `as_label` helper returning a short, stable
//! snake_case label for log fields.

use thiserror::Error;

/// Errors raised by the embedded runtime implementation.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The configured program path could not be decoded for the runtime.
    #[error("could not decode program path: {0}")]
    Decode(String),

    /// The builtin extension module could not be added to the module table.
    #[error("builtin module registration failed: {0}")]
    Registration(String),

    /// One-time bring-up of the runtime failed.
    #[error("runtime initialization failed: {0}")]
    Initialization(String),

    /// A module could not be imported after bring-up.
    #[error("could not import module {module}: {reason}")]
    Import {
        /// Fully qualified module name.
        module: String,
        /// Runtime-provided explanation.
        reason: String,
    },

    /// One-time teardown of the runtime reported a failure.
    #[error("runtime finalization failed: {0}")]
    Finalization(String),

    /// Anything else the runtime implementation wants to surface.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RuntimeError {
    /// Returns a short stable label for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Decode(_) => "runtime_decode",
            RuntimeError::Registration(_) => "runtime_registration",
            RuntimeError::Initialization(_) => "runtime_initialization",
            RuntimeError::Import { .. } => "runtime_import",
            RuntimeError::Finalization(_) => "runtime_finalization",
            RuntimeError::Other(_) => "runtime_other",
        }
    }
}

/// Failures of the host's low-level reactor wake primitive.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeError {
    /// The primitive only accepts its single well-known caller.
    #[error("wake primitive called off its owner thread")]
    WrongThread,

    /// The reactor is gone; nothing will ever run the handler.
    #[error("reactor is closed")]
    Closed,

    /// The reactor's queue is full and the caller is the thread that drains it.
    #[error("reactor queue is full")]
    Full,
}

impl WakeError {
    /// Returns a short stable label for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            WakeError::WrongThread => "wake_wrong_thread",
            WakeError::Closed => "wake_closed",
            WakeError::Full => "wake_full",
        }
    }
}

/// Why a thread pool refused a submitted task.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The pool's task queue is full.
    #[error("pool queue is full (capacity: {capacity})")]
    Saturated {
        /// Queue capacity at the time of the rejection.
        capacity: usize,
    },

    /// The pool has been shut down or destroyed.
    #[error("pool is shut down")]
    Closed,
}

impl RejectReason {
    /// Returns a short stable label for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RejectReason::Saturated { .. } => "pool_saturated",
            RejectReason::Closed => "pool_closed",
        }
    }
}

/// Errors returned synchronously by a notification request.
///
/// In every case the handler has not run and never will; no retry is
/// attempted, the caller owns the retry/backoff decision.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyError {
    /// The pool refused the envelope carrying the handler.
    #[error("pool submission failed: {0}")]
    Submission(#[from] RejectReason),

    /// No envelope could be allocated: too many are already in flight.
    #[error("envelope budget exhausted ({limit} in flight)")]
    EnvelopeBudget {
        /// Configured maximum of live envelopes.
        limit: usize,
    },

    /// No pool is available and the caller is not the reactor thread.
    #[error("fast path refused: caller is not the reactor thread")]
    ForeignThread,

    /// The host's wake primitive reported a failure.
    #[error("wake primitive failed: {0}")]
    Wake(#[from] WakeError),
}

impl NotifyError {
    /// Returns a short stable label for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            NotifyError::Submission(_) => "notify_submission",
            NotifyError::EnvelopeBudget { .. } => "notify_envelope_budget",
            NotifyError::ForeignThread => "notify_foreign_thread",
            NotifyError::Wake(_) => "notify_wake",
        }
    }
}
