//! Worker task envelope: carries a reactor-thread handler across a thread-pool
//! submission so that the pool's completion channel delivers it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use embedrt_api::{EventHandler, PoolTask};
use tracing::trace;

/// One unit of the bridge's in-flight envelope budget. Released on drop.
#[derive(Debug)]
pub(crate) struct EnvelopeSlot {
    in_flight: Arc<AtomicUsize>,
}

impl EnvelopeSlot {
    /// Claims a slot, or `None` when `limit` envelopes are already live.
    pub(crate) fn claim(in_flight: &Arc<AtomicUsize>, limit: usize) -> Option<Self> {
        in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < limit).then(|| live + 1)
            })
            .ok()
            .map(|_| Self {
                in_flight: in_flight.clone(),
            })
    }
}

impl Drop for EnvelopeSlot {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Owned by the pool from submission until its completion step runs; dropped
/// right after the handler returns. A rejected or abandoned envelope is
/// dropped without running its handler.
pub struct WorkerTaskEnvelope {
    id: u64,
    handler: Option<EventHandler>,
    _slot: EnvelopeSlot,
}

impl WorkerTaskEnvelope {
    pub(crate) fn new(id: u64, handler: EventHandler, slot: EnvelopeSlot) -> Self {
        Self {
            id,
            handler: Some(handler),
            _slot: slot,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl PoolTask for WorkerTaskEnvelope {
    // The caller's side effect already happened before `notify`; submitting
    // only buys a safe trip back to the reactor thread.
    fn run(&mut self) {
        trace!(envelope_id = self.id, "envelope body");
    }

    fn complete(mut self: Box<Self>) {
        if let Some(handler) = self.handler.take() {
            trace!(envelope_id = self.id, "envelope completion, running handler");
            handler();
        }
    }
}

impl fmt::Debug for WorkerTaskEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerTaskEnvelope")
            .field("id", &self.id)
            .field("pending", &self.handler.is_some())
            .finish()
    }
}
