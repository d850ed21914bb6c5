//! The pairing of a decoded-value cache with the lock pool that guards it.
//!
//! A `Locker<V>` is the unit shared across every map facade bound to the same registry key
//! (§ shared-resource registry): sharing the cache without sharing the lock pool (or vice
//! versa) would reopen exactly the races the coordination protocol exists to close.

use crate::cache::{Cache, CachePolicy, LruValueCache, NoOpCache};
use crate::lockpool::{LockPool, NoOpLockPool, ReentrantLockPool};

pub struct Locker<V> {
    pub(crate) cache: Box<dyn Cache<V> + Send + Sync>,
    pub(crate) locks: Box<dyn LockPool>,
}

impl<V> Locker<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn from_policy(policy: CachePolicy) -> Self {
        if policy.is_no_op() {
            Self {
                cache: Box::new(NoOpCache::new()),
                locks: Box::new(NoOpLockPool::new()),
            }
        } else {
            let CachePolicy::Lru(maxsize) = policy else {
                unreachable!("is_no_op() already handled the NoOp variant");
            };
            Self {
                cache: Box::new(LruValueCache::new(maxsize)),
                locks: Box::new(ReentrantLockPool::new()),
            }
        }
    }
}
