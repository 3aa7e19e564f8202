//! Lifecycle state shared by the controller, the watchers and the dispatcher.
//!
//! `Created → Recovering → PollingNotReady → PollingReady → Stopped`.
//! Transitions only move forward; restarting means building a new bridge.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Created,
    Recovering,
    PollingNotReady,
    PollingReady,
    Stopped,
}

/// Active flag, readiness gate and the current [`LifecycleState`].
///
/// One instance per bridge, shared by `Arc`; nothing here is global.
#[derive(Debug)]
pub struct Lifecycle {
    active: AtomicBool,
    ready: AtomicBool,
    state: Mutex<LifecycleState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// A new lifecycle: active, gate closed, state `Created`.
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            ready: AtomicBool::new(false),
            state: Mutex::new(LifecycleState::Created),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// True once the readiness gate has opened (and the bridge is still active).
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire) && self.is_active()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to `next` if it is later than the current state. Returns whether
    /// the transition happened.
    pub(crate) fn advance(&self, next: LifecycleState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if next <= *state {
            return false;
        }
        *state = next;
        true
    }

    /// Open the readiness gate: watchers start reacting to file content.
    pub(crate) fn open_gate(&self) {
        if self.advance(LifecycleState::PollingReady) {
            self.ready.store(true, Ordering::Release);
        }
    }

    /// Clear the active flag. Watcher loops and a pending `send` exit on
    /// their next wake.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        self.advance(LifecycleState::Stopped);
    }
}
