//! Named reentrant locks keyed by encoded key bytes.
//!
//! Every compound operation on the map facade (`setdefault`, `pop`, `popitem`, `update`) calls
//! into the same single-key primitives that `get`/`set`/`delete` use, and does so while already
//! holding that key's guard. The lock therefore has to be reentrant on the owning thread, not
//! just mutually exclusive across threads.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::ReentrantMutex;

/// An RAII guard held for the duration of a per-key critical section. Dropping it releases the
/// lock; for the no-op pool, dropping it does nothing.
///
/// Not `Send`: `parking_lot`'s reentrant-mutex guard is `!Send` unconditionally, since its
/// reentrancy count is bound to the thread that acquired it and releasing it from another thread
/// would be unsound. A guard is always created and dropped within the single call that acquired
/// it, never handed across a thread boundary, so this costs nothing in practice.
pub type KeyGuard = Box<dyn Any>;

pub trait LockPool: Send + Sync {
    fn lock(&self, key: &[u8]) -> KeyGuard;
}

/// No mutual exclusion. Only ever paired with `NoOpCache`, which has no shared mutable state
/// for a lock to protect beyond what the store's own transactions already provide.
#[derive(Debug, Default)]
pub struct NoOpLockPool;

impl NoOpLockPool {
    pub fn new() -> Self {
        Self
    }
}

impl LockPool for NoOpLockPool {
    fn lock(&self, _key: &[u8]) -> KeyGuard {
        Box::new(())
    }
}

/// One reentrant mutex per key, created on first use and left resident afterwards.
///
/// Locks are never proactively reaped: the spec only requires that they *may* be, and a
/// per-key mutex costs a few dozen bytes, already bounded by the sub-database's resident
/// keyspace. Reaping would need a way to tell, from inside a guard's `Drop`, whether the
/// pool's own map entry was the last referent, which DashMap's entry API doesn't expose
/// without a second pass over the table.
#[derive(Default)]
pub struct ReentrantLockPool {
    locks: DashMap<Vec<u8>, Arc<ReentrantMutex<()>>>,
}

impl ReentrantLockPool {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }
}

impl LockPool for ReentrantLockPool {
    fn lock(&self, key: &[u8]) -> KeyGuard {
        let mutex = self
            .locks
            .entry(key.to_vec())
            .or_insert_with(|| Arc::new(ReentrantMutex::new(())))
            .clone();
        let guard = mutex.lock_arc();
        Box::new(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn same_thread_reenters_without_deadlock() {
        let pool = ReentrantLockPool::new();
        let _outer = pool.lock(b"k");
        let _inner = pool.lock(b"k");
    }

    #[test]
    fn distinct_keys_do_not_contend() {
        let pool = Arc::new(ReentrantLockPool::new());
        let a = pool.clone();
        let b = pool.clone();
        let t1 = thread::spawn(move || {
            let _g = a.lock(b"a");
        });
        let t2 = thread::spawn(move || {
            let _g = b.lock(b"b");
        });
        t1.join().unwrap();
        t2.join().unwrap();
    }

    #[test]
    fn no_op_pool_grants_everything_immediately() {
        let pool = NoOpLockPool::new();
        let _a = pool.lock(b"x");
        let _b = pool.lock(b"x");
    }
}
