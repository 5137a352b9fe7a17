//! Fixed-size pool of reusable task handlers.
//!
//! # Invariants
//! - At most `capacity` workers are lent out at once.
//! - A borrowed worker returns to the pool when its guard drops, including
//!   during unwinding.

use parking_lot::{Condvar, Mutex};
use std::ops::{Deref, DerefMut};

pub struct WorkerPool<W> {
    idle: Mutex<Vec<W>>,
    returned: Condvar,
    capacity: usize,
}

impl<W> WorkerPool<W> {
    /// Builds a pool from pre-constructed workers.
    ///
    /// An empty `workers` list yields a pool nothing can be borrowed from;
    /// prefer [`WorkerPool::from_fn`].
    pub fn new(workers: Vec<W>) -> Self {
        let capacity = workers.len();
        Self {
            idle: Mutex::new(workers),
            returned: Condvar::new(),
            capacity,
        }
    }

    /// Builds `size` workers (at least one) with `factory`.
    pub fn from_fn<F>(size: usize, mut factory: F) -> Self
    where
        F: FnMut(usize) -> W,
    {
        Self::new((0..size.max(1)).map(&mut factory).collect())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Borrows a worker, blocking until one is free.
    pub fn acquire(&self) -> PooledWorker<'_, W> {
        let mut idle = self.idle.lock();
        loop {
            if let Some(worker) = idle.pop() {
                return PooledWorker {
                    pool: self,
                    worker: Some(worker),
                };
            }
            self.returned.wait(&mut idle);
        }
    }

    fn release(&self, worker: W) {
        self.idle.lock().push(worker);
        self.returned.notify_one();
    }
}

/// Borrowed worker; derefs to `W`.
pub struct PooledWorker<'pool, W> {
    pool: &'pool WorkerPool<W>,
    worker: Option<W>,
}

impl<W> Deref for PooledWorker<'_, W> {
    type Target = W;

    fn deref(&self) -> &W {
        match &self.worker {
            Some(worker) => worker,
            None => unreachable!("pooled worker is only taken on drop"),
        }
    }
}

impl<W> DerefMut for PooledWorker<'_, W> {
    fn deref_mut(&mut self) -> &mut W {
        match &mut self.worker {
            Some(worker) => worker,
            None => unreachable!("pooled worker is only taken on drop"),
        }
    }
}

impl<W> Drop for PooledWorker<'_, W> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.pool.release(worker);
        }
    }
}
