//! The associative-map facade: the coordination protocol tying the cache, the lock pool, and
//! the store together into something that behaves like a persistent `HashMap`.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::cache::{CachePolicy, CacheState};
use crate::codec::{Codec, MapKey};
use crate::error::{MapError, Result};
use crate::iter::{ItemsView, KeysView, ValuesView};
use crate::locker::Locker;
use crate::registry::{self, RegistryKey};
use crate::store::{self, Env, Store};

/// A persistent associative map backed by a memory-mapped LMDB sub-database, coordinated by a
/// shared decoded-value cache and a per-key lock pool (see the facade constructors for
/// pre-wired combinations: `SafeLmdbMap`, `RawLmdbMap`, `CachedLmdbMap`).
pub struct LmdbMap<V, Cd> {
    pub(crate) env: Arc<Env>,
    pub(crate) store: Store,
    pub(crate) key: RegistryKey,
    pub(crate) locker: Arc<Locker<V>>,
    pub(crate) codec: Cd,
}

impl<V, Cd> LmdbMap<V, Cd>
where
    V: Clone + Send + Sync + 'static,
    Cd: Codec<V> + Default,
{
    /// Opens (creating if necessary) the sub-database `sub_db` of the LMDB environment rooted
    /// at `path`, sharing its store handle and locker with any other facade already open on the
    /// same `(path, sub_db)` pair.
    pub fn open(
        path: impl AsRef<Path>,
        sub_db: Option<&str>,
        cache: CachePolicy,
        max_dbs: u32,
    ) -> Result<Self> {
        let handle = registry::acquire::<V>(path.as_ref(), sub_db, max_dbs, cache)?;
        Ok(Self {
            env: handle.env,
            store: handle.store,
            key: handle.key,
            locker: handle.locker,
            codec: Cd::default(),
        })
    }
}

impl<V, Cd> LmdbMap<V, Cd>
where
    V: Clone + Send + Sync + 'static,
    Cd: Codec<V>,
{
    /// Like [`LmdbMap::open`], but with a caller-supplied codec instance instead of
    /// `Cd::default()` — for a codec that needs construction-time configuration (a non-default
    /// compression level, a fixture double used in tests).
    pub fn open_with_codec(
        path: impl AsRef<Path>,
        sub_db: Option<&str>,
        cache: CachePolicy,
        max_dbs: u32,
        codec: Cd,
    ) -> Result<Self> {
        let handle = registry::acquire::<V>(path.as_ref(), sub_db, max_dbs, cache)?;
        Ok(Self {
            env: handle.env,
            store: handle.store,
            key: handle.key,
            locker: handle.locker,
            codec,
        })
    }
}

impl<V, Cd> LmdbMap<V, Cd>
where
    V: Clone + Send + Sync + 'static,
    Cd: Codec<V>,
{
    /// Reads a key assuming the caller already holds its lock. Checks the cache first; on a
    /// miss, reads the store and populates the cache (with the decoded value, or with MISSING)
    /// before returning.
    fn get_locked(&self, key_bytes: &[u8]) -> Result<Option<V>> {
        match self.locker.cache.get(key_bytes) {
            Some(CacheState::Value(v)) => {
                tracing::trace!(key = %MapKey::decode(key_bytes), "cache hit");
                Ok(Some(v))
            }
            Some(CacheState::Missing) => {
                tracing::trace!(key = %MapKey::decode(key_bytes), "cache hit (missing)");
                Ok(None)
            }
            None => match store::get(&self.env, &self.store, key_bytes)? {
                Some(raw) => {
                    let value = self.codec.deserialize(&raw)?;
                    self.locker.cache.put_value(key_bytes, value.clone());
                    Ok(Some(value))
                }
                None => {
                    self.locker.cache.put_missing(key_bytes);
                    Ok(None)
                }
            },
        }
    }

    /// Writes a key assuming the caller already holds its lock: the store first, then the
    /// cache, so a reader that loses the race sees either the old value or the new one, never a
    /// cache entry for a write that didn't durably happen.
    fn put_locked(&self, key_bytes: &[u8], raw: Vec<u8>, value: V) -> Result<()> {
        store::put(&self.env, &self.store, key_bytes, &raw)?;
        self.locker.cache.put_value(key_bytes, value);
        Ok(())
    }

    /// Deletes a key assuming the caller already holds its lock. Returns whether it existed.
    fn delete_locked(&self, key_bytes: &[u8]) -> Result<bool> {
        let existed = store::delete(&self.env, &self.store, key_bytes)?;
        self.locker.cache.put_missing(key_bytes);
        Ok(existed)
    }

    /// Full get under the key's lock, used by the iteration engine to resolve a snapshotted key
    /// at yield time.
    pub(crate) fn get_by_encoded(&self, key_bytes: &[u8]) -> Result<Option<V>> {
        let _guard = self.locker.locks.lock(key_bytes);
        self.get_locked(key_bytes)
    }

    pub fn get<K: Into<MapKey>>(&self, key: K) -> Result<V> {
        let encoded = key.into().encode();
        let _guard = self.locker.locks.lock(&encoded);
        self.get_locked(&encoded)?.ok_or(MapError::AbsentKey)
    }

    pub fn get_or<K: Into<MapKey>>(&self, key: K, default: V) -> Result<V> {
        let encoded = key.into().encode();
        let _guard = self.locker.locks.lock(&encoded);
        Ok(self.get_locked(&encoded)?.unwrap_or(default))
    }

    pub fn contains<K: Into<MapKey>>(&self, key: K) -> Result<bool> {
        let encoded = key.into().encode();
        let _guard = self.locker.locks.lock(&encoded);
        Ok(self.get_locked(&encoded)?.is_some())
    }

    /// Encodes `value` before taking the key's lock: a codec failure then never touches the
    /// store or the cache at all.
    pub fn set<K: Into<MapKey>>(&self, key: K, value: V) -> Result<()> {
        let encoded = key.into().encode();
        let raw = self.codec.serialize(&value)?;
        let _guard = self.locker.locks.lock(&encoded);
        self.put_locked(&encoded, raw, value)
    }

    pub fn delete<K: Into<MapKey>>(&self, key: K) -> Result<()> {
        let encoded = key.into().encode();
        let _guard = self.locker.locks.lock(&encoded);
        if self.delete_locked(&encoded)? {
            Ok(())
        } else {
            Err(MapError::AbsentKey)
        }
    }

    pub fn setdefault<K: Into<MapKey>>(&self, key: K, default: V) -> Result<V> {
        let encoded = key.into().encode();
        let _guard = self.locker.locks.lock(&encoded);
        if let Some(existing) = self.get_locked(&encoded)? {
            return Ok(existing);
        }
        let raw = self.codec.serialize(&default)?;
        self.put_locked(&encoded, raw, default.clone())?;
        Ok(default)
    }

    pub fn pop<K: Into<MapKey>>(&self, key: K) -> Result<V> {
        let encoded = key.into().encode();
        let _guard = self.locker.locks.lock(&encoded);
        let value = self.get_locked(&encoded)?.ok_or(MapError::AbsentKey)?;
        self.delete_locked(&encoded)?;
        Ok(value)
    }

    pub fn pop_or<K: Into<MapKey>>(&self, key: K, default: V) -> Result<V> {
        let encoded = key.into().encode();
        let _guard = self.locker.locks.lock(&encoded);
        match self.get_locked(&encoded)? {
            Some(value) => {
                self.delete_locked(&encoded)?;
                Ok(value)
            }
            None => Ok(default),
        }
    }

    /// Pops the last key in store order if `last` is true, otherwise the first. The key is
    /// selected from a fresh snapshot and then locked; if another thread deletes it in between,
    /// this reports `AbsentKey` rather than retrying, the same race the underlying primitives
    /// already expose to any two concurrent callers of `pop`.
    pub fn popitem(&self, last: bool) -> Result<(MapKey, V)> {
        let ordered = store::keys(&self.env, &self.store, last)?;
        let chosen = ordered.into_iter().next().ok_or(MapError::AbsentKey)?;
        let _guard = self.locker.locks.lock(&chosen);
        let value = self.get_locked(&chosen)?.ok_or(MapError::AbsentKey)?;
        self.delete_locked(&chosen)?;
        Ok((MapKey::decode(&chosen), value))
    }

    /// Applies every pair in one store transaction, holding every key's lock for the duration.
    /// A codec failure on any pair aborts before anything is locked or written.
    pub fn update<K: Into<MapKey>>(&self, items: impl IntoIterator<Item = (K, V)>) -> Result<()> {
        let mut encoded_items = Vec::new();
        for (k, v) in items {
            let encoded = k.into().encode();
            let raw = self.codec.serialize(&v)?;
            encoded_items.push((encoded, raw, v));
        }

        let _guards: Vec<_> = encoded_items
            .iter()
            .map(|(k, _, _)| self.locker.locks.lock(k))
            .collect();

        store::put_many(
            &self.env,
            &self.store,
            encoded_items.iter().map(|(k, r, _)| (k.as_slice(), r.as_slice())),
        )?;

        for (k, _, v) in encoded_items {
            self.locker.cache.put_value(&k, v);
        }
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        store::len(&self.env, &self.store)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Drops the sub-database's entire contents in one store transaction, then marks every
    /// previously-cached key as MISSING (rather than evicting it), so a lookup that raced the
    /// clear sees a definitive answer instead of falling through to a since-emptied store.
    pub fn clear(&self) -> Result<()> {
        store::clear(&self.env, &self.store)?;
        for key in self.locker.cache.snapshot_keys() {
            self.locker.cache.put_missing(&key);
        }
        Ok(())
    }

    /// Discards every cache entry without touching the store, as if this handle had just been
    /// opened with a cold cache. Useful for forcing the next read of a key back through the
    /// store, and for tests that need to observe store-level behavior directly.
    pub fn clear_cache(&self) {
        self.locker.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.locker.cache.len()
    }

    /// The cache's current state for a key, bypassing the store entirely. Mirrors the original
    /// library's test-only `dbdict._locker_.cache` introspection; production callers should go
    /// through `get`/`contains`, which already interpret the MISSING sentinel correctly.
    pub fn cache_state<K: Into<MapKey>>(&self, key: K) -> Option<CacheState<V>> {
        let encoded = key.into().encode();
        self.locker.cache.get(&encoded)
    }

    /// A lazy view over every key in store order. The **key order** is captured eagerly, in one
    /// short read transaction, the first time the view is iterated — so the full key set of this
    /// sub-database is held in memory for the lifetime of that iteration, proportional to key
    /// count (not value size: values are decoded one at a time as each key is yielded, under
    /// that key's own lock, not up front). This trades a live, incremental store cursor (which
    /// would have to borrow across an arbitrary number of intervening per-key lock acquisitions)
    /// for a simpler, self-contained iterator; see `DESIGN.md` for the concurrency scenarios this
    /// is checked against. A sub-database with a very large number of keys therefore costs one
    /// `Vec<Vec<u8>>` of that size at the start of each iteration; there is no paged or
    /// bounded-memory alternative in this crate today.
    pub fn keys(&self) -> KeysView<'_, V, Cd> {
        KeysView::new(self, false)
    }

    /// Like [`LmdbMap::keys`], in reverse store order. Same eager key-order capture.
    pub fn reversed_keys(&self) -> KeysView<'_, V, Cd> {
        KeysView::new(self, true)
    }

    /// Like [`LmdbMap::keys`], yielding each key's value instead. The key order is captured
    /// eagerly (same cost as `keys()`); each value is still decoded lazily, one at a time, at
    /// yield time.
    pub fn values(&self) -> ValuesView<'_, V, Cd> {
        ValuesView::new(self)
    }

    /// Like [`LmdbMap::keys`], yielding each key paired with its value. The key order is
    /// captured eagerly (same cost as `keys()`); each value is still decoded lazily, one at a
    /// time, at yield time — see [`LmdbMap::keys`] for what that trades off against a live
    /// store cursor.
    pub fn items(&self) -> ItemsView<'_, V, Cd> {
        ItemsView::new(self)
    }

    /// Compares against a plain in-memory map: same length, and every entry in `other` found
    /// with an equal value. A codec or store failure while checking aborts with that error
    /// rather than reporting unequal.
    pub fn equals<OV>(&self, other: &HashMap<String, OV>) -> Result<bool>
    where
        V: PartialEq<OV>,
    {
        if self.len()? != other.len() {
            return Ok(false);
        }
        for (k, expected) in other {
            match self.get(k.as_str()) {
                Ok(actual) => {
                    if actual != *expected {
                        return Ok(false);
                    }
                }
                Err(MapError::AbsentKey) => return Ok(false),
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    pub(crate) fn fmt_tag(&self, tag: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key.sub_db {
            Some(name) => write!(f, "<{} for {}:{}>", tag, self.key.path.display(), name),
            None => write!(f, "<{} for {}>", tag, self.key.path.display()),
        }
    }
}
