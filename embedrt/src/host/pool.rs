use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use embedrt_api::{PoolTask, RejectReason, Rejected, ThreadPool, WakePrimitive};
use flume::{Receiver, Sender, TrySendError};
use tracing::{error, warn};

use super::reactor::{Reactor, ReactorHandle};
use crate::config::ModuleConfig;
use crate::error::HostError;
use crate::{log_pool, logging};

/// Configuration for a [`WorkerPool`]
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of OS threads
    pub threads: usize,

    /// Tasks that may wait for a free thread before submission is refused
    pub queue_capacity: usize,

    /// Thread names are `{prefix}-{index}`
    pub thread_name_prefix: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get(),
            queue_capacity: 1024,
            thread_name_prefix: "embedrt-pool".to_string(),
        }
    }
}

impl From<&ModuleConfig> for WorkerPoolConfig {
    /// Sizes bundled pools from `python_pool_threads`.
    fn from(config: &ModuleConfig) -> Self {
        Self {
            threads: config.pool_threads,
            ..Self::default()
        }
    }
}

/// Status codes for a worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    /// Accepting tasks
    Running = 0,

    /// Refusing tasks, draining the queue
    ShuttingDown = 1,

    /// All threads joined
    Shutdown = 2,
}

impl PoolStatus {
    fn from_code(code: u8) -> Self {
        match code {
            0 => PoolStatus::Running,
            1 => PoolStatus::ShuttingDown,
            _ => PoolStatus::Shutdown,
        }
    }
}

/// A named pool of OS threads whose completion channel is a [`Reactor`].
///
/// Each task's `run` executes on a pool thread; its `complete` is then
/// delivered to the reactor thread.
///
/// [`Reactor`]: super::Reactor
pub struct WorkerPool {
    name: String,
    tx: RwLock<Option<Sender<Box<dyn PoolTask>>>>,
    capacity: usize,
    threads: usize,
    completion: ReactorHandle,
    workers: Mutex<Vec<JoinHandle<()>>>,
    status: AtomicU8,
    completed: Arc<AtomicU64>,
}

impl WorkerPool {
    /// Spawns the pool's threads.
    pub fn new(
        name: impl Into<String>,
        config: WorkerPoolConfig,
        completion: ReactorHandle,
    ) -> Result<Arc<Self>, HostError> {
        let name = name.into();
        let capacity = config.queue_capacity.max(1);
        let threads = config.threads.max(1);
        let (tx, rx) = flume::bounded::<Box<dyn PoolTask>>(capacity);

        let pool = Arc::new(Self {
            name,
            tx: RwLock::new(Some(tx)),
            capacity,
            threads,
            completion: completion.clone(),
            workers: Mutex::new(Vec::with_capacity(threads)),
            status: AtomicU8::new(PoolStatus::Running as u8),
            completed: Arc::new(AtomicU64::new(0)),
        });

        for index in 0..threads {
            let spawned = pool.spawn_worker(
                format!("{}-{}", config.thread_name_prefix, index),
                rx.clone(),
                completion.clone(),
            );
            if let Err(e) = spawned {
                pool.shutdown();
                return Err(e);
            }
        }

        log_pool!(pool.name.as_str(), "started", threads, capacity);
        Ok(pool)
    }

    fn spawn_worker(
        &self,
        thread_name: String,
        rx: Receiver<Box<dyn PoolTask>>,
        completion: ReactorHandle,
    ) -> Result<(), HostError> {
        let pool_name = self.name.clone();
        let completed = self.completed.clone();
        let dispatch = logging::current_subscriber();

        let handle = thread::Builder::new().name(thread_name).spawn(move || {
            let _guard = tracing::dispatcher::set_default(&dispatch);
            worker_main(&pool_name, rx, completion, &completed);
        })?;

        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
        Ok(())
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus::from_code(self.status.load(Ordering::Acquire))
    }

    /// Tasks whose completion step has been handed to the reactor.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of OS threads serving the queue.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Stops accepting tasks, lets the threads finish what is queued and
    /// joins them. Must not be called from one of the pool's own threads.
    ///
    /// On the reactor thread the joins are skipped: the threads may be
    /// waiting for that very thread to drain their completions. The pool is
    /// left `ShuttingDown`; use [`shutdown_draining`](Self::shutdown_draining)
    /// there instead.
    pub fn shutdown(&self) {
        if !self.begin_shutdown() {
            return;
        }
        if self.completion.on_owner_thread() {
            warn!(
                pool = %self.name,
                "pool shutdown on the reactor thread; threads are not joined"
            );
            return;
        }
        self.join_workers();
    }

    /// Shutdown for the thread owning `reactor`: turns the loop so queued
    /// completions drain while the threads finish, then joins them.
    pub fn shutdown_draining(&self, reactor: &mut Reactor) {
        self.begin_shutdown();
        if self.status() == PoolStatus::Shutdown {
            return;
        }
        while !self.workers_finished() {
            reactor.turn(Duration::from_millis(1));
        }
        // Completions delivered by the last tasks.
        reactor.turn(Duration::ZERO);
        self.join_workers();
    }

    fn begin_shutdown(&self) -> bool {
        let prev = self.status.compare_exchange(
            PoolStatus::Running as u8,
            PoolStatus::ShuttingDown as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if prev.is_err() {
            return false;
        }
        self.close_queue();
        true
    }

    fn workers_finished(&self) -> bool {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .all(JoinHandle::is_finished)
    }

    fn join_workers(&self) {
        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            if worker.join().is_err() {
                error!(pool = %self.name, "pool thread panicked");
            }
        }

        let prev = self
            .status
            .swap(PoolStatus::Shutdown as u8, Ordering::AcqRel);
        if prev != PoolStatus::Shutdown as u8 {
            log_pool!(self.name.as_str(), "shutdown", completed = self.completed());
        }
    }

    fn close_queue(&self) {
        self.tx
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

fn worker_main(
    pool: &str,
    rx: Receiver<Box<dyn PoolTask>>,
    completion: ReactorHandle,
    completed: &AtomicU64,
) {
    while let Ok(mut task) = rx.recv() {
        if catch_unwind(AssertUnwindSafe(|| task.run())).is_err() {
            error!(pool, "pool task panicked in run");
        }

        if let Err(e) = completion.deliver(Box::new(move || task.complete())) {
            warn!(pool, error = %e, "completion channel closed; dropping task");
            continue;
        }
        completed.fetch_add(1, Ordering::Relaxed);
    }
}

impl ThreadPool for WorkerPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, task: Box<dyn PoolTask>) -> Result<(), Rejected> {
        if self.status() != PoolStatus::Running {
            return Err(Rejected::new(RejectReason::Closed, task));
        }

        let tx = self.tx.read().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tx.as_ref() else {
            return Err(Rejected::new(RejectReason::Closed, task));
        };

        tx.try_send(task).map_err(|e| match e {
            TrySendError::Full(task) => Rejected::new(
                RejectReason::Saturated {
                    capacity: self.capacity,
                },
                task,
            ),
            TrySendError::Disconnected(task) => Rejected::new(RejectReason::Closed, task),
        })
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Threads exit once the queue is empty; they are not joined here.
        self.close_queue();
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("threads", &self.threads)
            .field("status", &self.status())
            .field("completed", &self.completed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Reactor, ReactorConfig};
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    struct Counting {
        ran: Arc<AtomicUsize>,
        completed: Arc<AtomicUsize>,
    }

    impl PoolTask for Counting {
        fn run(&mut self) {
            self.ran.fetch_add(1, Ordering::SeqCst);
        }

        fn complete(self: Box<Self>) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(threads: usize, queue_capacity: usize) -> WorkerPoolConfig {
        WorkerPoolConfig {
            threads,
            queue_capacity,
            thread_name_prefix: "test-pool".to_string(),
        }
    }

    #[test]
    fn test_task_completes_on_reactor() {
        let mut reactor = Reactor::new(ReactorConfig::default());
        let pool = WorkerPool::new("default", config(2, 16), reactor.handle()).unwrap();

        let ran = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            pool.submit(Box::new(Counting {
                ran: ran.clone(),
                completed: completed.clone(),
            }))
            .unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        assert!(reactor.run_until(deadline, || completed.load(Ordering::SeqCst) == 4));
        assert_eq!(ran.load(Ordering::SeqCst), 4);

        pool.shutdown_draining(&mut reactor);
        assert_eq!(pool.status(), PoolStatus::Shutdown);
        assert_eq!(pool.completed(), 4);
    }

    #[test]
    fn test_shutdown_on_reactor_thread_drains_completions() {
        let mut reactor = Reactor::new(ReactorConfig {
            completion_capacity: 1,
            idle_timeout: Duration::from_millis(10),
        });
        let pool = WorkerPool::new("default", config(1, 8), reactor.handle()).unwrap();

        let ran = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            pool.submit(Box::new(Counting {
                ran: ran.clone(),
                completed: completed.clone(),
            }))
            .unwrap();
        }

        // The worker blocks on the full completion channel; this must not.
        pool.shutdown();
        assert_eq!(pool.status(), PoolStatus::ShuttingDown);

        pool.shutdown_draining(&mut reactor);
        assert_eq!(pool.status(), PoolStatus::Shutdown);
        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert_eq!(completed.load(Ordering::SeqCst), 3);
        assert_eq!(pool.completed(), 3);
    }

    #[test]
    fn test_pool_sized_from_module_config() {
        let module = ModuleConfig::parse("python_pool_threads 3;").unwrap();
        let mut reactor = Reactor::new(ReactorConfig::default());
        let config = WorkerPoolConfig::from(&module);
        let pool = WorkerPool::new("default", config, reactor.handle()).unwrap();

        assert_eq!(pool.threads(), 3);
        assert_eq!(pool.workers.lock().unwrap().len(), 3);

        pool.shutdown_draining(&mut reactor);
        assert_eq!(pool.status(), PoolStatus::Shutdown);
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let mut reactor = Reactor::new(ReactorConfig::default());
        let pool = WorkerPool::new("io", config(1, 4), reactor.handle()).unwrap();
        pool.shutdown_draining(&mut reactor);

        let ran = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let rejected = pool
            .submit(Box::new(Counting {
                ran: ran.clone(),
                completed: completed.clone(),
            }))
            .unwrap_err();

        assert_eq!(rejected.reason, RejectReason::Closed);
        drop(rejected);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(completed.load(Ordering::SeqCst), 0);
    }
}
