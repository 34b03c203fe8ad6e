use std::fmt;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;
use embedrt_api::{EventHandler, WakeError, WakePrimitive};
use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, error, trace};

/// Configuration for a [`Reactor`]
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// Capacity of the completion channel shared by all pools
    pub completion_capacity: usize,

    /// Longest single wait when there is nothing to do
    pub idle_timeout: Duration,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            completion_capacity: 1024,
            idle_timeout: Duration::from_millis(50),
        }
    }
}

enum Event {
    Run(EventHandler),
    Wake,
    Stop,
}

struct Shared {
    owner: ThreadId,
    tx: Sender<Event>,
    direct: SegQueue<EventHandler>,
    closed: AtomicBool,
    stop_requested: AtomicBool,
    handled: AtomicU64,
}

/// A single-threaded event loop standing in for the host server's reactor.
///
/// Work reaches it two ways:
/// - the completion channel, which any thread may feed through
///   [`ReactorHandle::deliver`]; pools use it to run completion steps
/// - the direct queue behind [`WakePrimitive::post`], usable from the owner
///   thread only
///
/// Each [`turn`](Reactor::turn) drains the direct queue, then everything that
/// was already on the completion channel when the turn started, so several
/// completions are handled per wakeup and events delivered during the turn
/// wait for the next one.
pub struct Reactor {
    shared: Arc<Shared>,
    rx: Receiver<Event>,
    config: ReactorConfig,
    stopped: bool,
    // Stays on the thread that created it.
    _not_send: PhantomData<*const ()>,
}

impl Reactor {
    /// Creates a reactor owned by the calling thread.
    pub fn new(config: ReactorConfig) -> Self {
        let (tx, rx) = flume::bounded(config.completion_capacity.max(1));
        let shared = Arc::new(Shared {
            owner: thread::current().id(),
            tx,
            direct: SegQueue::new(),
            closed: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            handled: AtomicU64::new(0),
        });
        Self {
            shared,
            rx,
            config,
            stopped: false,
            _not_send: PhantomData,
        }
    }

    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle {
            shared: self.shared.clone(),
        }
    }

    /// Runs one loop iteration and returns the number of handlers executed.
    ///
    /// Blocks for at most `timeout` if nothing is pending.
    pub fn turn(&mut self, timeout: Duration) -> usize {
        let mut handled = self.drain_direct();

        let pending = self.rx.len();
        for _ in 0..pending {
            match self.rx.try_recv() {
                Ok(event) => handled += self.dispatch(event),
                Err(_) => break,
            }
        }
        if pending > 0 {
            trace!(pending, "completion batch drained");
        }
        self.observe_stop();

        if handled == 0 && pending == 0 && !self.stopped {
            match self.rx.recv_timeout(timeout) {
                Ok(event) => handled += self.dispatch(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => self.stopped = true,
            }
            self.observe_stop();
        }

        self.shared
            .handled
            .fetch_add(handled as u64, Ordering::Relaxed);
        handled
    }

    /// Runs until [`ReactorHandle::stop`] is called.
    pub fn run(&mut self) {
        debug!("reactor loop started");
        while !self.stopped {
            self.turn(self.config.idle_timeout);
        }
        // Whatever was posted before the stop still runs.
        self.drain_direct();
        debug!("reactor loop stopped");
    }

    /// Turns the loop until `done` returns true or `deadline` passes.
    /// Returns whether `done` was satisfied.
    pub fn run_until(&mut self, deadline: Instant, mut done: impl FnMut() -> bool) -> bool {
        loop {
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline || self.stopped {
                return false;
            }
            self.turn(self.config.idle_timeout.min(deadline - now));
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn observe_stop(&mut self) {
        if self.shared.stop_requested.load(Ordering::Acquire) {
            self.stopped = true;
        }
    }

    fn drain_direct(&mut self) -> usize {
        let mut handled = 0;
        while let Some(handler) = self.shared.direct.pop() {
            run_handler(handler);
            handled += 1;
        }
        handled
    }

    fn dispatch(&mut self, event: Event) -> usize {
        match event {
            Event::Run(handler) => {
                run_handler(handler);
                1
            }
            Event::Wake => self.drain_direct(),
            Event::Stop => {
                self.stopped = true;
                0
            }
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        // Release queued handlers without running them.
        let dropped = self.rx.drain().count();
        while self.shared.direct.pop().is_some() {}
        if dropped > 0 {
            debug!(dropped, "reactor dropped pending events");
        }
    }
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("owner", &self.shared.owner)
            .field("pending", &self.rx.len())
            .field("stopped", &self.stopped)
            .finish()
    }
}

fn run_handler(handler: EventHandler) {
    if catch_unwind(AssertUnwindSafe(handler)).is_err() {
        error!("event handler panicked on the reactor thread");
    }
}

/// Cloneable access to a [`Reactor`] from other threads.
#[derive(Clone)]
pub struct ReactorHandle {
    shared: Arc<Shared>,
}

impl ReactorHandle {
    /// Queues `handler` on the completion channel. Callable from any thread.
    ///
    /// Other threads block while the channel is full. The owner thread is the
    /// only one draining it, so there a full channel fails with
    /// [`WakeError::Full`] instead.
    pub fn deliver(&self, handler: EventHandler) -> Result<(), WakeError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(WakeError::Closed);
        }
        if self.on_owner_thread() {
            return self
                .shared
                .tx
                .try_send(Event::Run(handler))
                .map_err(|e| match e {
                    TrySendError::Full(_) => WakeError::Full,
                    TrySendError::Disconnected(_) => WakeError::Closed,
                });
        }
        self.shared
            .tx
            .send(Event::Run(handler))
            .map_err(|_| WakeError::Closed)
    }

    /// Asks the loop to return from [`Reactor::run`]. Never blocks.
    pub fn stop(&self) {
        self.shared.stop_requested.store(true, Ordering::Release);
        // Only wakes an idle loop; a full channel means the next turn is due.
        let _ = self.shared.tx.try_send(Event::Stop);
    }

    pub fn owner(&self) -> ThreadId {
        self.shared.owner
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Handlers executed so far.
    pub fn handled(&self) -> u64 {
        self.shared.handled.load(Ordering::Relaxed)
    }
}

impl WakePrimitive for ReactorHandle {
    fn post(&self, handler: EventHandler) -> Result<(), WakeError> {
        if !self.on_owner_thread() {
            return Err(WakeError::WrongThread);
        }
        if self.is_closed() {
            return Err(WakeError::Closed);
        }
        self.shared.direct.push(handler);
        // A full channel already guarantees the next turn.
        match self.shared.tx.try_send(Event::Wake) {
            Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
            Err(TrySendError::Disconnected(_)) => Err(WakeError::Closed),
        }
    }

    fn on_owner_thread(&self) -> bool {
        thread::current().id() == self.shared.owner
    }
}

impl fmt::Debug for ReactorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactorHandle")
            .field("owner", &self.shared.owner)
            .field("closed", &self.is_closed())
            .finish()
    }
}
