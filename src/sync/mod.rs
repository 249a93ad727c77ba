//! Locking primitives
//!
//! Shared structures (message queue, window registry, pools) are guarded by
//! a spin lock that yields the thread while contended. Nothing blocks while
//! holding one of these locks.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Mutual exclusion by spin-wait with a yield
pub struct SpinLock<T> {
    locked: AtomicBool,
    value: UnsafeCell<T>,
}

// SAFETY: access to `value` is serialised by `locked`.
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        SpinLock {
            locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::thread::yield_now();
        }
        SpinLockGuard { lock: self }
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        SpinLock::new(T::default())
    }
}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the lock.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds the lock exclusively.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// Wakes a loop running on another thread so it re-checks its exit
/// condition. Used by dialogs run from worker threads.
#[derive(Debug, Default)]
pub struct CloseSignal {
    closed: Mutex<bool>,
    cond: Condvar,
}

impl CloseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the loop to stop
    pub fn close(&self) {
        let mut closed = self.closed.lock().unwrap_or_else(|e| e.into_inner());
        *closed = true;
        self.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep until closed or `timeout` passes. Returns the closed state.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let closed = self.closed.lock().unwrap_or_else(|e| e.into_inner());
        if *closed {
            return true;
        }
        match self.cond.wait_timeout(closed, timeout) {
            Ok((closed, _)) => *closed,
            Err(e) => *e.into_inner().0,
        }
    }

    /// Re-arm for another run of the loop
    pub(crate) fn reset(&self) {
        *self.closed.lock().unwrap_or_else(|e| e.into_inner()) = false;
    }
}
