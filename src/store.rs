//! Thin wrapper around the memory-mapped LMDB environment, via `rkv`.
//!
//! Every public function here opens exactly one transaction and commits (or, for reads, simply
//! drops) it before returning. Callers are responsible for holding whatever per-key lock the
//! coordination protocol requires around a call; this module knows nothing about the cache or
//! the lock pool.

use std::path::Path;

use rkv::backend::{BackendEnvironmentBuilder, Lmdb, LmdbDatabase, LmdbEnvironment};
use rkv::{Rkv, SingleStore, StoreOptions, Value};

use crate::error::{MapError, Result};

pub(crate) type Env = Rkv<LmdbEnvironment>;
pub(crate) type Store = SingleStore<LmdbDatabase>;

pub(crate) fn open_env(path: &Path, max_dbs: u32) -> Result<Env> {
    let mut builder = Rkv::environment_builder::<Lmdb>();
    builder.set_max_dbs(max_dbs);
    Rkv::from_builder::<Lmdb>(path, builder).map_err(|e| MapError::StoreFailure(e.to_string()))
}

pub(crate) fn open_store(env: &Env, name: Option<&str>) -> Result<Store> {
    env.open_single(name, StoreOptions::create())
        .map_err(MapError::from)
}

fn blob_to_vec(value: Value<'_>) -> Vec<u8> {
    match value {
        Value::Blob(b) => b.to_vec(),
        _ => Vec::new(),
    }
}

pub(crate) fn get(env: &Env, store: &Store, key: &[u8]) -> Result<Option<Vec<u8>>> {
    let reader = env.read().map_err(MapError::from)?;
    let value = store.get(&reader, key)?;
    Ok(value.map(blob_to_vec))
}

pub(crate) fn put(env: &Env, store: &Store, key: &[u8], value: &[u8]) -> Result<()> {
    let mut writer = env.write().map_err(MapError::from)?;
    store.put(&mut writer, key, &Value::Blob(value))?;
    writer.commit().map_err(MapError::from)
}

pub(crate) fn put_many<'a>(
    env: &Env,
    store: &Store,
    items: impl IntoIterator<Item = (&'a [u8], &'a [u8])>,
) -> Result<()> {
    let mut writer = env.write().map_err(MapError::from)?;
    for (key, value) in items {
        store.put(&mut writer, key, &Value::Blob(value))?;
    }
    writer.commit().map_err(MapError::from)
}

/// Deletes `key` if present, reporting whether it was. A single write transaction covers both
/// the presence check and the removal, so the answer is never stale by the time it's returned.
pub(crate) fn delete(env: &Env, store: &Store, key: &[u8]) -> Result<bool> {
    let mut writer = env.write().map_err(MapError::from)?;
    let existed = store.get(&writer, key)?.is_some();
    if existed {
        store.delete(&mut writer, key)?;
    }
    writer.commit()?;
    Ok(existed)
}

pub(crate) fn clear(env: &Env, store: &Store) -> Result<()> {
    let mut writer = env.write().map_err(MapError::from)?;
    store.clear(&mut writer)?;
    writer.commit().map_err(MapError::from)
}

/// Counts entries by walking the store's cursor. `rkv`'s `SingleStore` doesn't surface the
/// environment's own O(1) entry counter, so this is O(n) in the sub-database's size; callers
/// on a hot path that only need "is this empty" should prefer `keys(..).next().is_none()`.
pub(crate) fn len(env: &Env, store: &Store) -> Result<usize> {
    let reader = env.read().map_err(MapError::from)?;
    let mut iter = store.iter_start(&reader)?;
    let mut count = 0usize;
    while let Some(next) = iter.next() {
        next?;
        count += 1;
    }
    Ok(count)
}

/// Snapshots the current key order in a single short read transaction. Keys inserted after this
/// call won't appear in the returned list; keys deleted after this call will, and a subsequent
/// `get` on them reports absence at that point instead.
pub(crate) fn keys(env: &Env, store: &Store, reverse: bool) -> Result<Vec<Vec<u8>>> {
    let reader = env.read().map_err(MapError::from)?;
    let mut iter = store.iter_start(&reader)?;
    let mut out = Vec::new();
    while let Some(next) = iter.next() {
        let (key, _value) = next?;
        out.push(key.to_vec());
    }
    if reverse {
        out.reverse();
    }
    Ok(out)
}
