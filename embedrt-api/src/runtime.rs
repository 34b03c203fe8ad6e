//! # Embedded Runtime Seam
//!
//! The [`EmbeddedRuntime`] trait is everything the lifecycle manager needs from
//! an interpreter: path setup, builtin registration, one-time bring-up and
//! teardown, imports, and the acquire/release pair of its global execution lock.
//!
//! Implementations are expected to follow the usual embedding rules:
//!
//! 1. builtins are registered before [`initialize`](EmbeddedRuntime::initialize)
//! 2. after `initialize` returns, the calling thread holds the execution lock
//! 3. [`release_thread`](EmbeddedRuntime::release_thread) and
//!    [`acquire_thread`](EmbeddedRuntime::acquire_thread) save and restore the
//!    calling thread's execution state
//! 4. [`finalize`](EmbeddedRuntime::finalize) is called with the lock held

use std::fmt;
use std::sync::Arc;

use crate::errors::RuntimeError;
use crate::host::Notifier;

/// Descriptor of the bridge's builtin extension module.
///
/// Registered under a reserved name known to interpreted code; carries the
/// notifier so interpreted code can schedule reactor-thread callbacks.
#[derive(Clone)]
pub struct BuiltinModule {
    name: &'static str,
    notifier: Arc<dyn Notifier>,
}

impl BuiltinModule {
    pub fn new(name: &'static str, notifier: Arc<dyn Notifier>) -> Self {
        Self { name, notifier }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }
}

impl fmt::Debug for BuiltinModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinModule")
            .field("name", &self.name)
            .field("notifier", &"<notifier>")
            .finish()
    }
}

/// A globally-locked embeddable interpreter.
pub trait EmbeddedRuntime: Send + Sync {
    /// Decodes the raw program path into the runtime's native representation.
    fn decode_program_path(&self, raw: &str) -> Result<String, RuntimeError>;

    /// Sets the program name used by the runtime to locate its standard library.
    fn set_program_path(&self, decoded: &str);

    /// Overrides the module search path. Must precede bring-up.
    fn set_module_search_path(&self, path: &str) -> Result<(), RuntimeError>;

    /// Adds a builtin module to the runtime's module table. Must precede bring-up.
    fn register_builtin(&self, module: BuiltinModule) -> Result<(), RuntimeError>;

    /// One-time bring-up. Leaves the calling thread holding the execution lock.
    fn initialize(&self) -> Result<(), RuntimeError>;

    /// Enables the runtime's internal multithreading support.
    fn enable_threads(&self);

    /// Imports a module by its fully qualified name.
    fn import(&self, module: &str) -> Result<(), RuntimeError>;

    /// Blocks until the calling thread holds the execution lock.
    fn acquire_thread(&self);

    /// Saves the calling thread's state and releases the execution lock.
    fn release_thread(&self);

    /// One-time teardown. Called with the execution lock held.
    fn finalize(&self) -> Result<(), RuntimeError>;
}
