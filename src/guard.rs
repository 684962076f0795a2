//! In-flight guards.
//!
//! Both the write aggregator and the task scheduler refuse to start a unit of
//! work while a previous one is still suspended on an external call. A
//! trigger that finds the guard taken is dropped, never queued. Guards are
//! released on drop, so an error or a panic inside the guarded work cannot
//! leave the flag set.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A single "currently running" flag.
#[derive(Debug, Default)]
pub struct RunFlag {
    is_running: Arc<AtomicBool>,
}

impl RunFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to mark the flag as running.
    ///
    /// Returns `None` if it is already set.
    pub fn try_acquire(&self) -> Option<RunGuard> {
        self.is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard {
                flag: self.is_running.clone(),
            })
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

/// Clears its [`RunFlag`] when dropped.
#[derive(Debug)]
pub struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Set of keys whose work is currently running.
#[derive(Debug, Default)]
pub struct InFlightSet {
    keys: Arc<Mutex<HashSet<String>>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to mark `key` as running.
    ///
    /// Returns `None` if `key` is already in flight.
    pub fn try_acquire(&self, key: &str) -> Option<InFlightGuard> {
        if !lock(&self.keys).insert(key.to_string()) {
            return None;
        }

        Some(InFlightGuard {
            keys: self.keys.clone(),
            key: key.to_string(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.keys).contains(key)
    }

    /// Number of keys currently in flight.
    pub fn len(&self) -> usize {
        lock(&self.keys).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes its key from the owning [`InFlightSet`] when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.keys).remove(&self.key);
    }
}

/// Locks a mutex, recovering the data if a previous holder panicked.
///
/// None of the state behind these mutexes can be left half-updated by a
/// panic, so the poison flag carries no information.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
