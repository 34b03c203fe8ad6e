use std::sync::Arc;

use embedrt_api::{BuiltinModule, EmbeddedRuntime, Notifier};
use tracing::{error, info, info_span, warn};

use super::context::{BUILTIN_MODULE_NAME, ProcessContext, RuntimeContext};
use super::state::LifecycleState;
use super::token::{ExecutionToken, TokenGuard};
use crate::bridge::{BridgeConfig, NotificationBridge};
use crate::config::{FastPathPolicy, ModuleConfig};
use crate::error::{LifecycleError, StartupPhase, TeardownError};
use crate::log_lifecycle;

/// User code run at the edges of the runtime's life, with the execution token held.
pub trait LifecycleHooks: Send + Sync {
    fn on_start(&self, _process: &ProcessContext, _token: &TokenGuard<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_stop(&self, _process: &ProcessContext, _token: &TokenGuard<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl LifecycleHooks for NoopHooks {}

/// Drives a [`RuntimeContext`] through init and shutdown for one worker process.
///
/// Both entry points are called once each, synchronously, on the process's
/// lifecycle thread, strictly before and after the reactor loop runs.
pub struct LifecycleManager {
    context: RuntimeContext,
    hooks: Arc<dyn LifecycleHooks>,
}

impl LifecycleManager {
    pub fn new(runtime: Arc<dyn EmbeddedRuntime>, config: ModuleConfig) -> Self {
        Self {
            context: RuntimeContext::new(runtime, config),
            hooks: Arc::new(NoopHooks),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.context
    }

    pub fn state(&self) -> LifecycleState {
        self.context.state()
    }

    pub fn token(&self) -> Arc<ExecutionToken> {
        self.context.token().clone()
    }

    /// The notification bridge, available once `init` has resolved the pool.
    pub fn bridge(&self) -> Option<Arc<NotificationBridge>> {
        self.context.bridge().cloned()
    }

    /// Brings the runtime up for this worker process and parks the token.
    ///
    /// Any error is fatal to worker startup. A repeated call while the runtime
    /// is up is ignored.
    pub fn init(&self, process: &ProcessContext) -> Result<(), LifecycleError> {
        let ctx = &self.context;
        let _span = info_span!(
            "runtime_init",
            worker_id = process.worker_id,
            context_id = %ctx.id()
        )
        .entered();

        match ctx.state() {
            LifecycleState::Uninit => {
                if let Err(found) = ctx
                    .state_cell()
                    .transition(LifecycleState::Uninit, LifecycleState::Initializing)
                {
                    warn!(state = ?found, "lifecycle state changed under init; ignoring init");
                    return Ok(());
                }
            }
            LifecycleState::Initializing => {
                warn!("retrying runtime init after an earlier failure");
            }
            LifecycleState::Suspended | LifecycleState::Resuming => {
                warn!("runtime already initialized in this process; ignoring init");
                return Ok(());
            }
            LifecycleState::Finalized => return Err(LifecycleError::AlreadyFinalized),
        }

        let bridge = self.install_bridge(process)?;

        let program = ctx
            .program_path()
            .map_err(|e| fatal(StartupPhase::DecodePath, e))?;
        ctx.runtime().set_program_path(program);
        if let Some(search_path) = &ctx.config().module_search_path {
            ctx.runtime()
                .set_module_search_path(search_path)
                .map_err(|e| fatal(StartupPhase::DecodePath, e))?;
            info!(path = %search_path, "module search path set");
        }

        let notifier: Arc<dyn Notifier> = bridge;
        ctx.register_builtin(BuiltinModule::new(BUILTIN_MODULE_NAME, notifier))
            .map_err(|e| fatal(StartupPhase::RegisterModule, e))?;

        info!("initializing embedded runtime");
        let fresh = ctx
            .bring_up()
            .map_err(|e| fatal(StartupPhase::BringUp, e))?;
        let guard = if fresh {
            ctx.token().adopt()
        } else {
            ctx.token()
                .acquire()
                .map_err(|e| fatal(StartupPhase::BringUp, e))?
        };

        ctx.runtime()
            .import(BUILTIN_MODULE_NAME)
            .map_err(|e| fatal(StartupPhase::ImportModule, e))?;

        self.hooks
            .on_start(process, &guard)
            .map_err(|e| fatal(StartupPhase::StartHook, e))?;

        // The reactor's idle wait must not hold the token.
        drop(guard);
        ctx.state_cell().store(LifecycleState::Suspended);
        log_lifecycle!("init", "suspended", pool = ?ctx.bridge().and_then(|b| b.pool_name()));
        Ok(())
    }

    /// Tears the runtime down at worker-process exit. Never fails; problems
    /// are logged and exit proceeds.
    pub fn shutdown(&self, process: &ProcessContext) {
        let ctx = &self.context;
        let _span = info_span!(
            "runtime_shutdown",
            worker_id = process.worker_id,
            context_id = %ctx.id()
        )
        .entered();

        let previous = match ctx.state_cell().begin_teardown() {
            Ok(previous) => previous,
            Err(found) => {
                warn!(
                    state = ?found,
                    "runtime already shut down in this process; ignoring shutdown"
                );
                return;
            }
        };

        // Uninit and failed bring-ups still pass through Resuming.
        if !ctx.is_brought_up() {
            ctx.state_cell().store(LifecycleState::Finalized);
            log_lifecycle!("shutdown", "finalized", brought_up = false, from = ?previous);
            return;
        }

        let guard = match ctx.token().acquire() {
            Ok(guard) => guard,
            Err(e) => {
                error!(error = %e, "cannot re-acquire execution token; skipping teardown");
                ctx.state_cell().store(LifecycleState::Finalized);
                return;
            }
        };

        if let Err(e) = self.hooks.on_stop(process, &guard) {
            error!(error = %e, "on_stop hook failed");
        }

        info!("finalizing embedded runtime");
        if let Err(e) = ctx.runtime().finalize() {
            let e = TeardownError::from(e);
            error!(error = %e, label = e.0.as_label(), "failed to finalize embedded runtime");
        }

        guard.retire();
        ctx.state_cell().store(LifecycleState::Finalized);
        log_lifecycle!("shutdown", "finalized", brought_up = true);
    }

    fn install_bridge(
        &self,
        process: &ProcessContext,
    ) -> Result<Arc<NotificationBridge>, LifecycleError> {
        let ctx = &self.context;
        let selection = ctx.selector().resolve(process.pools.as_ref());
        let config = BridgeConfig::from(ctx.config());

        if !selection.is_available() && config.fast_path_policy == FastPathPolicy::RefuseStart {
            return Err(fatal(
                StartupPhase::ResolvePool,
                "no thread pool available and the fast path is refused",
            ));
        }

        let pool = selection.pool().cloned();
        Ok(ctx.install_bridge(|| NotificationBridge::new(process.wake.clone(), pool, config)))
    }
}

fn fatal(phase: StartupPhase, reason: impl std::fmt::Display) -> LifecycleError {
    let reason = reason.to_string();
    error!(phase = phase.as_str(), %reason, "runtime startup failed");
    LifecycleError::StartupFatal { phase, reason }
}
