//! Reuse pools for per-request state.
//!
//! A [`Pool`] keeps a free-list of boxed instances. [`Pool::acquire`] hands one
//! out wrapped in a [`Pooled`] guard; dropping the guard releases the instance
//! back to the pool. An acquired instance may still carry data from its last
//! use, so callers must reset it before reading any field.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A type that can live in a [`Pool`].
pub trait Poolable: Default + Send + 'static {
    /// Called when an instance goes back to the pool. Implementations drop
    /// anything that must not outlive the request (sockets, streams). This is
    /// not a reset: acquirers still reset before use.
    fn recycle(&mut self) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub created: u64,
    pub acquired: u64,
    pub released: u64,
}

pub struct Pool<T: Poolable> {
    inner: Arc<PoolInner<T>>,
}

struct PoolInner<T> {
    idle: Mutex<Vec<Box<T>>>,
    max_idle: usize,
    created: AtomicU64,
    acquired: AtomicU64,
    released: AtomicU64,
}

impl<T: Poolable> PoolInner<T> {
    fn idle(&self) -> MutexGuard<'_, Vec<Box<T>>> {
        // A panic while holding the lock cannot leave the Vec half-updated.
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, mut value: Box<T>) {
        value.recycle();
        self.released.fetch_add(1, Ordering::Relaxed);
        let mut idle = self.idle();
        if idle.len() < self.max_idle {
            idle.push(value);
        }
    }
}

impl<T: Poolable> Pool<T> {
    pub fn new(max_idle: usize) -> Self {
        Pool {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::new()),
                max_idle,
                created: AtomicU64::new(0),
                acquired: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        }
    }

    /// Creates a pool with `prefill` instances already built.
    pub fn with_prefill(prefill: usize, max_idle: usize) -> Self {
        let pool = Self::new(max_idle);
        {
            let count = prefill.min(max_idle);
            let mut idle = pool.inner.idle();
            idle.reserve(count);
            for _ in 0..count {
                idle.push(Box::default());
            }
            pool.inner.created.fetch_add(count as u64, Ordering::Relaxed);
        }
        pool
    }

    pub fn acquire(&self) -> Pooled<T> {
        let reused = self.inner.idle().pop();
        let value = reused.unwrap_or_else(|| {
            self.inner.created.fetch_add(1, Ordering::Relaxed);
            Box::default()
        });
        self.inner.acquired.fetch_add(1, Ordering::Relaxed);
        Pooled {
            value: Some(value),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Number of instances currently waiting in the free-list.
    pub fn idle(&self) -> usize {
        self.inner.idle().len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.inner.created.load(Ordering::Relaxed),
            acquired: self.inner.acquired.load(Ordering::Relaxed),
            released: self.inner.released.load(Ordering::Relaxed),
        }
    }
}

impl<T: Poolable> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Pool {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Exclusive handle to a pooled instance. Released on drop.
pub struct Pooled<T: Poolable> {
    value: Option<Box<T>>,
    pool: Arc<PoolInner<T>>,
}

impl<T: Poolable> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `Drop` takes the value out.
        match &self.value {
            Some(value) => value,
            None => unreachable!("pooled value used after release"),
        }
    }
}

impl<T: Poolable> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.value {
            Some(value) => value,
            None => unreachable!("pooled value used after release"),
        }
    }
}

impl<T: Poolable> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.release(value);
        }
    }
}

impl<T: Poolable + std::fmt::Debug> std::fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Pooled").field(&**self).finish()
    }
}
