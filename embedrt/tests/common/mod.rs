#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use embedrt::host::{PoolMap, Reactor, ReactorConfig, WorkerPoolConfig};
use embedrt::lifecycle::{LifecycleHooks, ProcessContext, TokenGuard};
use embedrt::{BuiltinModule, EmbeddedRuntime, PoolRegistry, RuntimeError, WakePrimitive};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Runtime steps a [`FakeRuntime`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Decode,
    ModuleSearchPath,
    Register,
    Initialize,
    Import,
    Finalize,
}

/// In-memory runtime that records every call and models the execution lock.
#[derive(Default)]
pub struct FakeRuntime {
    calls: Mutex<Vec<String>>,
    failing: Mutex<Vec<Step>>,
    lock_holder: Mutex<Option<ThreadId>>,
    builtin: Mutex<Option<BuiltinModule>>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(step: Step) -> Arc<Self> {
        let runtime = Self::new();
        runtime.fail(step);
        runtime
    }

    pub fn fail(&self, step: Step) {
        self.failing.lock().unwrap().push(step);
    }

    pub fn heal(&self, step: Step) {
        self.failing.lock().unwrap().retain(|s| *s != step);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn lock_held_by_current_thread(&self) -> bool {
        *self.lock_holder.lock().unwrap() == Some(thread::current().id())
    }

    pub fn lock_is_free(&self) -> bool {
        self.lock_holder.lock().unwrap().is_none()
    }

    pub fn builtin(&self) -> Option<BuiltinModule> {
        self.builtin.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn should_fail(&self, step: Step) -> bool {
        self.failing.lock().unwrap().contains(&step)
    }

    fn require_lock(&self, what: &str) -> Result<(), String> {
        if self.lock_held_by_current_thread() {
            Ok(())
        } else {
            Err(format!("{what} without the execution lock"))
        }
    }
}

impl EmbeddedRuntime for FakeRuntime {
    fn decode_program_path(&self, raw: &str) -> Result<String, RuntimeError> {
        self.record("decode");
        if self.should_fail(Step::Decode) {
            return Err(RuntimeError::Decode(raw.to_string()));
        }
        Ok(format!("decoded:{raw}"))
    }

    fn set_program_path(&self, decoded: &str) {
        self.record(format!("set_program_path:{decoded}"));
    }

    fn set_module_search_path(&self, path: &str) -> Result<(), RuntimeError> {
        self.record(format!("set_module_search_path:{path}"));
        if self.should_fail(Step::ModuleSearchPath) {
            return Err(RuntimeError::Decode(path.to_string()));
        }
        Ok(())
    }

    fn register_builtin(&self, module: BuiltinModule) -> Result<(), RuntimeError> {
        self.record(format!("register:{}", module.name()));
        if self.should_fail(Step::Register) {
            return Err(RuntimeError::Registration("table full".to_string()));
        }
        *self.builtin.lock().unwrap() = Some(module);
        Ok(())
    }

    fn initialize(&self) -> Result<(), RuntimeError> {
        self.record("initialize");
        if self.should_fail(Step::Initialize) {
            return Err(RuntimeError::Initialization("no stdlib".to_string()));
        }
        *self.lock_holder.lock().unwrap() = Some(thread::current().id());
        Ok(())
    }

    fn enable_threads(&self) {
        self.record("enable_threads");
    }

    fn import(&self, module: &str) -> Result<(), RuntimeError> {
        self.record(format!("import:{module}"));
        let import_error = |reason: String| RuntimeError::Import {
            module: module.to_string(),
            reason,
        };
        self.require_lock("import").map_err(import_error)?;
        if self.should_fail(Step::Import) {
            return Err(import_error("not found".to_string()));
        }
        Ok(())
    }

    fn acquire_thread(&self) {
        self.record("acquire");
        let mut holder = self.lock_holder.lock().unwrap();
        assert!(holder.is_none(), "execution lock acquired twice");
        *holder = Some(thread::current().id());
    }

    fn release_thread(&self) {
        self.record("release");
        let mut holder = self.lock_holder.lock().unwrap();
        assert_eq!(*holder, Some(thread::current().id()), "released by non-holder");
        *holder = None;
    }

    fn finalize(&self) -> Result<(), RuntimeError> {
        self.record("finalize");
        self.require_lock("finalize")
            .map_err(RuntimeError::Finalization)?;
        if self.should_fail(Step::Finalize) {
            return Err(RuntimeError::Finalization("atexit handler raised".to_string()));
        }
        Ok(())
    }
}

/// Hooks that record what they observed about the token.
#[derive(Default)]
pub struct RecordingHooks {
    pub started: AtomicUsize,
    pub stopped: AtomicUsize,
    pub held_on_start: Mutex<Option<bool>>,
    pub held_on_stop: Mutex<Option<bool>>,
    pub fail_start: bool,
}

impl RecordingHooks {
    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }
}

impl LifecycleHooks for RecordingHooks {
    fn on_start(&self, _process: &ProcessContext, token: &TokenGuard<'_>) -> anyhow::Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        *self.held_on_start.lock().unwrap() = Some(token.token().is_held_by_current_thread());
        if self.fail_start {
            anyhow::bail!("application factory raised");
        }
        Ok(())
    }

    fn on_stop(&self, _process: &ProcessContext, token: &TokenGuard<'_>) -> anyhow::Result<()> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        *self.held_on_stop.lock().unwrap() = Some(token.token().is_held_by_current_thread());
        Ok(())
    }
}

/// Tracing layer collecting WARN-level messages.
#[derive(Clone, Default)]
pub struct WarnCollector {
    messages: Arc<Mutex<Vec<String>>>,
}

impl WarnCollector {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages().iter().filter(|m| m.contains(needle)).count()
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for WarnCollector {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            let mut visitor = MessageVisitor(String::new());
            event.record(&mut visitor);
            self.messages.lock().unwrap().push(visitor.0);
        }
    }
}

/// Runs `f` with a subscriber that collects warnings.
pub fn with_warnings<T>(f: impl FnOnce(&WarnCollector) -> T) -> T {
    use tracing_subscriber::prelude::*;

    let collector = WarnCollector::default();
    let subscriber = tracing_subscriber::registry().with(collector.clone());
    tracing::subscriber::with_default(subscriber, || f(&collector))
}

/// Small pool settings for tests.
pub fn pool_config(threads: usize) -> WorkerPoolConfig {
    WorkerPoolConfig {
        threads,
        queue_capacity: 1024,
        thread_name_prefix: "test-pool".to_string(),
    }
}

/// A reactor owned by the calling thread plus a pool table holding `pools`.
pub fn host_with_pools(pools: &[&str]) -> (Reactor, Arc<PoolMap>) {
    let reactor = Reactor::new(ReactorConfig {
        completion_capacity: 1024,
        idle_timeout: Duration::from_millis(5),
    });
    let map = Arc::new(PoolMap::new());
    for name in pools {
        map.spawn(name, pool_config(2), reactor.handle())
            .expect("spawn test pool");
    }
    (reactor, map)
}

pub fn process_context(reactor: &Reactor, pools: Arc<PoolMap>) -> ProcessContext {
    let wake: Arc<dyn WakePrimitive> = Arc::new(reactor.handle());
    let pools: Arc<dyn PoolRegistry> = pools;
    ProcessContext::new(0, wake, pools)
}

/// Deadline helper for `Reactor::run_until`.
pub fn within(millis: u64) -> Instant {
    Instant::now() + Duration::from_millis(millis)
}
