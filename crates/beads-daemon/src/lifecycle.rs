//! Store lifecycle state machine.
//!
//! Replaces a mutex-plus-boolean-flag pairing with one explicit state: the
//! mutex still serializes writes, but whether a request should even be
//! accepted is a single enum instead of a flag read alongside the lock.

use std::sync::Mutex;

/// The daemon's view of whether its Store is safe to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreLifecycle {
    /// No Store opened yet (daemon just started, or reopening after an error).
    Inactive,
    /// Normal operation: requests are served.
    Active,
    /// A shutdown request has been accepted; in-flight requests drain, no new
    /// ones are admitted.
    Closing,
}

/// Guards the lifecycle enum behind a mutex so every worker thread observes
/// the same transition atomically with the check that gates new requests.
pub struct Lifecycle {
    state: Mutex<StoreLifecycle>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreLifecycle::Inactive),
        }
    }

    pub fn activate(&self) {
        let mut state = self.state.lock().expect("lifecycle mutex poisoned");
        if *state == StoreLifecycle::Inactive {
            *state = StoreLifecycle::Active;
        }
    }

    /// Transitions to `Closing`. Idempotent: calling it twice is a no-op.
    pub fn begin_closing(&self) {
        let mut state = self.state.lock().expect("lifecycle mutex poisoned");
        *state = StoreLifecycle::Closing;
    }

    pub fn current(&self) -> StoreLifecycle {
        *self.state.lock().expect("lifecycle mutex poisoned")
    }

    /// Whether a new request should be admitted.
    pub fn accepts_requests(&self) -> bool {
        matches!(self.current(), StoreLifecycle::Active)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_inactive_and_rejects_requests() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.current(), StoreLifecycle::Inactive);
        assert!(!lifecycle.accepts_requests());
    }

    #[test]
    fn activate_then_closing_is_one_way() {
        let lifecycle = Lifecycle::new();
        lifecycle.activate();
        assert!(lifecycle.accepts_requests());

        lifecycle.begin_closing();
        assert!(!lifecycle.accepts_requests());

        lifecycle.activate();
        assert_eq!(
            lifecycle.current(),
            StoreLifecycle::Closing,
            "activate must not resurrect a closing daemon"
        );
    }

    #[test]
    fn begin_closing_is_idempotent() {
        let lifecycle = Lifecycle::new();
        lifecycle.activate();
        lifecycle.begin_closing();
        lifecycle.begin_closing();
        assert_eq!(lifecycle.current(), StoreLifecycle::Closing);
    }
}
