//! # Reference Host
//!
//! A minimal in-process stand-in for the event-driven server that embeds the
//! runtime: one reactor thread, named worker pools completing onto it, and a
//! pool registry. Enough to run the bridge end to end in tests and demos.
//!
//! ```text
//! any thread ──submit──► WorkerPool ──run──► pool thread
//!                                               │
//!                                  deliver(complete)
//!                                               ▼
//! reactor thread ◄── completion channel (drained per turn)
//!       ▲
//!       └── WakePrimitive::post (owner thread only)
//! ```

mod pool;
mod reactor;
mod registry;

pub use pool::{PoolStatus, WorkerPool, WorkerPoolConfig};
pub use reactor::{Reactor, ReactorConfig, ReactorHandle};
pub use registry::PoolMap;
