//! # Execution-Context Token
//!
//! The capability "this OS thread may run interpreted code now". Exactly one
//! exists per runtime context. It is either held by one thread or parked.
//!
//! The token is checked out as a [`TokenGuard`]; dropping the guard parks the
//! token again, so release happens on every exit path including early `?`
//! returns. Acquisition is re-entrant for the thread that already holds it:
//! nested guards bump a depth counter and only the outermost one releases the
//! runtime's execution lock.
//!
//! After runtime teardown the token is retired and can no longer be acquired.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use embedrt_api::EmbeddedRuntime;
use tracing::trace;

use crate::error::TokenError;

#[derive(Debug, Default)]
struct TokenState {
    holder: Option<ThreadId>,
    depth: usize,
    retired: bool,
}

pub struct ExecutionToken {
    runtime: Arc<dyn EmbeddedRuntime>,
    state: Mutex<TokenState>,
    available: Condvar,
}

impl fmt::Debug for ExecutionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ExecutionToken")
            .field("holder", &state.holder)
            .field("depth", &state.depth)
            .field("retired", &state.retired)
            .finish()
    }
}

impl ExecutionToken {
    pub(crate) fn new(runtime: Arc<dyn EmbeddedRuntime>) -> Self {
        Self {
            runtime,
            state: Mutex::new(TokenState::default()),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the calling thread holds the token.
    pub fn acquire(&self) -> Result<TokenGuard<'_>, TokenError> {
        let me = thread::current().id();
        let mut state = self.lock();

        if state.retired {
            return Err(TokenError::Retired);
        }
        if state.holder == Some(me) {
            state.depth += 1;
            trace!(depth = state.depth, "execution token re-entered");
            return Ok(TokenGuard::new(self));
        }

        while state.holder.is_some() {
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            if state.retired {
                return Err(TokenError::Retired);
            }
        }

        state.holder = Some(me);
        state.depth = 1;
        drop(state);

        self.runtime.acquire_thread();
        trace!("execution token acquired");
        Ok(TokenGuard::new(self))
    }

    /// Claims the token for a thread that already owns the runtime's execution
    /// lock, as the bring-up thread does right after initialization.
    pub(crate) fn adopt(&self) -> TokenGuard<'_> {
        let mut state = self.lock();
        debug_assert!(state.holder.is_none(), "adopting a held execution token");
        state.holder = Some(thread::current().id());
        state.depth = 1;
        TokenGuard::new(self)
    }

    /// Whether the calling thread currently holds the token.
    pub fn is_held_by_current_thread(&self) -> bool {
        self.lock().holder == Some(thread::current().id())
    }

    /// Saved and held by nobody.
    pub fn is_parked(&self) -> bool {
        let state = self.lock();
        state.holder.is_none() && !state.retired
    }

    pub fn is_retired(&self) -> bool {
        self.lock().retired
    }

    fn release(&self) {
        let mut state = self.lock();
        if state.retired || state.depth == 0 {
            return;
        }

        state.depth -= 1;
        if state.depth == 0 {
            self.runtime.release_thread();
            state.holder = None;
            trace!("execution token parked");
            self.available.notify_one();
        }
    }

    fn retire(&self) {
        let mut state = self.lock();
        state.retired = true;
        state.holder = None;
        state.depth = 0;
        self.available.notify_all();
    }
}

/// Scoped proof that the current thread holds the execution token.
///
/// Not `Send`: the token must be released by the thread that took it.
#[must_use = "dropping the guard parks the execution token immediately"]
pub struct TokenGuard<'a> {
    token: &'a ExecutionToken,
    _not_send: PhantomData<*const ()>,
}

impl<'a> TokenGuard<'a> {
    fn new(token: &'a ExecutionToken) -> Self {
        Self {
            token,
            _not_send: PhantomData,
        }
    }

    pub fn token(&self) -> &ExecutionToken {
        self.token
    }

    /// Consumes the guard after runtime teardown, without handing the
    /// execution lock back to a runtime that no longer exists.
    pub(crate) fn retire(self) {
        self.token.retire();
        std::mem::forget(self);
    }
}

impl Drop for TokenGuard<'_> {
    fn drop(&mut self) {
        self.token.release();
    }
}

impl fmt::Debug for TokenGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGuard").finish_non_exhaustive()
    }
}
