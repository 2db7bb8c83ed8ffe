//! Service lifecycle: admission of mutating operations and graceful drain.
//!
//! Every mutating service call holds an [`OperationGuard`]. Shutdown stops
//! admission first, then waits for outstanding guards to drop.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// Lifecycle state of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

impl ShutdownState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::Draining,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Draining => 1,
            Self::Stopped => 2,
        }
    }
}

/// Result of a shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    Timeout { remaining: u32 },
}

/// Coordinates admission and drain of in-flight operations.
pub struct ShutdownCoordinator {
    state: AtomicU8,
    in_flight: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ShutdownState::Running.as_u8()),
            in_flight: Arc::new(AtomicU32::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_accepting(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Admit one operation. Returns None once shutdown has begun.
    pub fn track(&self) -> Option<OperationGuard> {
        // Count first, then check: a drain that flipped the state before our
        // increment is guaranteed to see either the count or the refusal.
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = OperationGuard {
            counter: self.in_flight.clone(),
            notify: self.notify.clone(),
        };
        if !self.is_accepting() {
            return None;
        }
        Some(guard)
    }

    pub fn in_flight_count(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop admitting operations and wait up to `timeout` for in-flight ones.
    pub async fn initiate(&self, timeout: Duration) -> ShutdownResult {
        self.state
            .store(ShutdownState::Draining.as_u8(), Ordering::SeqCst);
        let result = self.wait_for_drain(timeout).await;
        self.state.store(ShutdownState::Stopped.as_u8(), Ordering::SeqCst);
        result
    }

    async fn wait_for_drain(&self, timeout: Duration) -> ShutdownResult {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.notify.notified();
            let count = self.in_flight_count();
            if count == 0 {
                return ShutdownResult::Complete;
            }

            tokio::select! {
                _ = notified => continue,
                _ = tokio::time::sleep_until(deadline) => {
                    return match self.in_flight_count() {
                        0 => ShutdownResult::Complete,
                        remaining => ShutdownResult::Timeout { remaining },
                    };
                }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one admitted operation.
pub struct OperationGuard {
    counter: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}
