use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle states of a runtime context, one forward pass per process.
///
/// ```text
/// Uninit -> Initializing -> Suspended -> Resuming -> Finalized
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing has happened yet.
    Uninit = 0,

    /// `init` is running, or failed part-way.
    Initializing = 1,

    /// The runtime is up and the execution token is parked.
    Suspended = 2,

    /// `shutdown` has re-acquired the token and is tearing down.
    Resuming = 3,

    /// The runtime is gone for the rest of the process.
    Finalized = 4,
}

impl LifecycleState {
    fn from_code(code: u8) -> Self {
        match code {
            0 => LifecycleState::Uninit,
            1 => LifecycleState::Initializing,
            2 => LifecycleState::Suspended,
            3 => LifecycleState::Resuming,
            _ => LifecycleState::Finalized,
        }
    }
}

/// Atomic holder for a [`LifecycleState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(LifecycleState::Uninit as u8))
    }

    pub(crate) fn load(&self) -> LifecycleState {
        LifecycleState::from_code(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: LifecycleState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves `from -> to`; on mismatch returns the state actually found.
    pub(crate) fn transition(
        &self,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<(), LifecycleState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(LifecycleState::from_code)
    }

    /// Moves any state before `Resuming` to `Resuming` and returns the one it
    /// left. Fails with the current state once teardown has begun.
    pub(crate) fn begin_teardown(&self) -> Result<LifecycleState, LifecycleState> {
        let mut current = self.load();
        loop {
            if matches!(current, LifecycleState::Resuming | LifecycleState::Finalized) {
                return Err(current);
            }
            match self.transition(current, LifecycleState::Resuming) {
                Ok(()) => return Ok(current),
                Err(found) => current = found,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_checks_current_state() {
        let cell = StateCell::new();
        assert_eq!(cell.load(), LifecycleState::Uninit);

        assert_eq!(
            cell.transition(LifecycleState::Uninit, LifecycleState::Initializing),
            Ok(())
        );
        assert_eq!(
            cell.transition(LifecycleState::Uninit, LifecycleState::Initializing),
            Err(LifecycleState::Initializing)
        );

        cell.store(LifecycleState::Finalized);
        assert_eq!(cell.load(), LifecycleState::Finalized);
    }

    #[test]
    fn test_teardown_passes_through_resuming() {
        let cell = StateCell::new();
        assert_eq!(cell.begin_teardown(), Ok(LifecycleState::Uninit));
        assert_eq!(cell.load(), LifecycleState::Resuming);
        assert_eq!(cell.begin_teardown(), Err(LifecycleState::Resuming));

        let cell = StateCell::new();
        cell.store(LifecycleState::Suspended);
        assert_eq!(cell.begin_teardown(), Ok(LifecycleState::Suspended));

        cell.store(LifecycleState::Finalized);
        assert_eq!(cell.begin_teardown(), Err(LifecycleState::Finalized));
    }
}
