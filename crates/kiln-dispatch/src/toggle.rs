//! Enable/disable switches for worker pools.
//!
//! A disabled pool hands every worker the full item list, which is how a
//! single machine runs an experiment on its own.

use std::ops::{Deref, DerefMut};

pub trait Toggle {
    fn is_enabled(&self) -> bool;

    fn set_enabled(&mut self, enabled: bool);

    fn enable(&mut self) {
        self.set_enabled(true);
    }

    fn disable(&mut self) {
        self.set_enabled(false);
    }

    /// Enable until the returned guard is dropped.
    fn enabled(&mut self) -> ToggleGuard<'_, Self> {
        ToggleGuard::new(self, true)
    }

    /// Disable until the returned guard is dropped.
    fn disabled(&mut self) -> ToggleGuard<'_, Self> {
        ToggleGuard::new(self, false)
    }
}

/// Restores the pool's previous state when dropped.
#[derive(Debug)]
pub struct ToggleGuard<'a, P: Toggle + ?Sized> {
    pool: &'a mut P,
    previous: bool,
}

impl<'a, P: Toggle + ?Sized> ToggleGuard<'a, P> {
    fn new(pool: &'a mut P, enabled: bool) -> Self {
        let previous = pool.is_enabled();
        pool.set_enabled(enabled);
        Self { pool, previous }
    }
}

impl<P: Toggle + ?Sized> Deref for ToggleGuard<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        self.pool
    }
}

impl<P: Toggle + ?Sized> DerefMut for ToggleGuard<'_, P> {
    fn deref_mut(&mut self) -> &mut P {
        self.pool
    }
}

impl<P: Toggle + ?Sized> Drop for ToggleGuard<'_, P> {
    fn drop(&mut self) {
        self.pool.set_enabled(self.previous);
    }
}
