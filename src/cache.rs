//! Memoization cells for values derived from otherwise immutable objects

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Explicit cache state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cached<T> {
    Unset,
    Computed(T),
}

/// A value computed at most once per owner instance.
///
/// Readers consult the cell under a shared lock. A reader that finds it
/// unset takes the single upgradable slot, re-checks, upgrades to exclusive
/// access and computes, so concurrent readers observe one
/// computation.
pub struct Memo<T> {
    state: RwLock<Cached<T>>,
    computations: AtomicUsize,
}

impl<T: Clone> Memo<T> {
    pub fn new() -> Self {
        Memo {
            state: RwLock::new(Cached::Unset),
            computations: AtomicUsize::new(0),
        }
    }

    /// Return the cached value, computing it with `compute` if unset.
    pub fn get_or_compute<F>(&self, compute: F) -> T
    where
        F: FnOnce() -> T,
    {
        if let Cached::Computed(value) = &*self.state.read() {
            return value.clone();
        }

        let upgradable = self.state.upgradable_read();
        if let Cached::Computed(value) = &*upgradable {
            return value.clone();
        }

        let mut exclusive = RwLockUpgradableReadGuard::upgrade(upgradable);
        let value = compute();
        *exclusive = Cached::Computed(value.clone());
        self.computations.fetch_add(1, Ordering::Relaxed);
        value
    }

    /// Current state without computing.
    pub fn peek(&self) -> Cached<T> {
        self.state.read().clone()
    }

    /// Preload a value, e.g. when the owner already derived it for free.
    pub fn set(&self, value: T) {
        *self.state.write() = Cached::Computed(value);
    }

    pub fn reset(&self) {
        *self.state.write() = Cached::Unset;
    }

    /// Number of times `get_or_compute` ran its closure.
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }
}

impl<T: Clone> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Memo {
            state: RwLock::new(self.peek()),
            computations: AtomicUsize::new(0),
        }
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Memo").field(&*self.state.read()).finish()
    }
}
