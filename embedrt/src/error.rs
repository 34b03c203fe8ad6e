use std::fmt;

use thiserror::Error;

pub use embedrt_api::errors::{NotifyError, RejectReason, RuntimeError, WakeError};

/// The startup step a fatal error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupPhase {
    ResolvePool,
    DecodePath,
    RegisterModule,
    BringUp,
    ImportModule,
    StartHook,
}

impl StartupPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            StartupPhase::ResolvePool => "resolve_pool",
            StartupPhase::DecodePath => "decode_path",
            StartupPhase::RegisterModule => "register_module",
            StartupPhase::BringUp => "bring_up",
            StartupPhase::ImportModule => "import_module",
            StartupPhase::StartHook => "start_hook",
        }
    }
}

impl fmt::Display for StartupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`LifecycleManager::init`](crate::lifecycle::LifecycleManager::init).
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Worker-process startup must abort.
    #[error("startup failed during {phase}: {reason}")]
    StartupFatal { phase: StartupPhase, reason: String },

    /// The runtime was already torn down in this process.
    #[error("runtime context already finalized")]
    AlreadyFinalized,
}

impl LifecycleError {
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleError::StartupFatal { .. } => "startup_fatal",
            LifecycleError::AlreadyFinalized => "already_finalized",
        }
    }

    /// The failing phase, for startup errors.
    pub fn phase(&self) -> Option<StartupPhase> {
        match self {
            LifecycleError::StartupFatal { phase, .. } => Some(*phase),
            LifecycleError::AlreadyFinalized => None,
        }
    }
}

/// Runtime teardown failure. Logged; process exit proceeds.
#[derive(Error, Debug)]
#[error("runtime teardown failed: {0}")]
pub struct TeardownError(#[from] pub RuntimeError);

/// Errors reported while applying configuration directives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("\"{directive}\" directive is duplicate")]
    Duplicate { directive: String },

    #[error("unknown directive \"{0}\"")]
    Unknown(String),

    #[error("\"{directive}\" takes {expected} argument(s), got {got}")]
    Arity {
        directive: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid number \"{value}\" in \"{directive}\" directive")]
    InvalidNumber { directive: String, value: String },

    #[error("invalid value \"{value}\" in \"{directive}\" directive")]
    InvalidValue { directive: String, value: String },

    #[error("invalid application target \"{0}\", expected module:attribute")]
    InvalidTarget(String),

    #[error("directive is not terminated by \";\"")]
    Unterminated,

    #[error("line {line}: {source}")]
    AtLine {
        line: usize,
        #[source]
        source: Box<ConfigError>,
    },
}

impl ConfigError {
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Duplicate { .. } => "config_duplicate",
            ConfigError::Unknown(_) => "config_unknown",
            ConfigError::Arity { .. } => "config_arity",
            ConfigError::InvalidNumber { .. } => "config_invalid_number",
            ConfigError::InvalidValue { .. } => "config_invalid_value",
            ConfigError::InvalidTarget(_) => "config_invalid_target",
            ConfigError::Unterminated => "config_unterminated",
            ConfigError::AtLine { source, .. } => source.as_label(),
        }
    }
}

/// Misuse of the execution token.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("execution token retired: runtime has been finalized")]
    Retired,
}

/// Errors from the bundled reference host.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("failed to spawn pool thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    #[error("thread pool \"{0}\" is already registered")]
    DuplicatePool(String),
}
