//! A mutex with a soft priority lane.
//!
//! High priority acquirers register themselves before blocking on the base
//! mutex. Low priority acquirers poll the number of registered high priority
//! requests and only go for the base mutex once it reads zero. This biases
//! the lock towards high priority users without guaranteeing it: a low
//! priority user that passed the check just before a high priority request
//! was registered still competes for the base mutex.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub struct PriorityLock<T> {
    base: Mutex<T>,
    pending_high_priority: Mutex<usize>,
    poll_interval: Duration,
}

impl<T> PriorityLock<T> {
    pub fn new(value: T) -> Self {
        Self::with_poll_interval(value, DEFAULT_POLL_INTERVAL)
    }

    /// Lock whose low priority users back off for `poll_interval` between
    /// checks of the pending high priority requests.
    pub fn with_poll_interval(value: T, poll_interval: Duration) -> Self {
        Self {
            base: Mutex::new(value),
            pending_high_priority: Mutex::new(0),
            poll_interval,
        }
    }

    pub fn high_priority(&self) -> HighPriorityGuard<'_, T> {
        *self.pending() += 1;
        let guard = self.base.lock().unwrap_or_else(PoisonError::into_inner);
        HighPriorityGuard {
            guard,
            pending: &self.pending_high_priority,
        }
    }

    pub fn low_priority(&self) -> LowPriorityGuard<'_, T> {
        while self.pending_high_priority_requests() > 0 {
            thread::sleep(self.poll_interval);
        }
        LowPriorityGuard {
            guard: self.base.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Number of high priority users currently waiting for or holding the
    /// lock
    pub fn pending_high_priority_requests(&self) -> usize {
        *self.pending()
    }

    pub fn into_inner(self) -> T {
        self.base.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, usize> {
        self.pending_high_priority
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Default> Default for PriorityLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

pub struct HighPriorityGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    pending: &'a Mutex<usize>,
}

impl<T> Drop for HighPriorityGuard<'_, T> {
    fn drop(&mut self) {
        // the request is withdrawn before the base mutex is released
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = pending.saturating_sub(1);
    }
}

impl<T> Deref for HighPriorityGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for HighPriorityGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

pub struct LowPriorityGuard<'a, T> {
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for LowPriorityGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for LowPriorityGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
