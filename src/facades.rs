//! Pre-wired facade constructors.
//!
//! `LmdbMap<V, Cd>` is the general mechanism; these three types are the combinations most
//! callers actually want, each enforcing its own cache-policy constraint at construction time
//! so a misconfigured facade fails fast instead of silently sharing a registry entry it
//! shouldn't.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::CachePolicy;
use crate::codec::{RawCodec, StructuredCodec};
use crate::error::{MapError, Result};
use crate::map::LmdbMap;

const DEFAULT_MAX_DBS: u32 = 8;

/// Structured values, a bounded LRU cache by default (`CachePolicy::LRU_128`), real per-key
/// locking. The facade most callers should reach for first.
pub struct SafeLmdbMap<V>(LmdbMap<V, StructuredCodec>);

impl<V> SafeLmdbMap<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn open(path: impl AsRef<Path>, sub_db: Option<&str>) -> Result<Self> {
        Self::open_with_cache(path, sub_db, CachePolicy::LRU_128)
    }

    pub fn open_with_cache(
        path: impl AsRef<Path>,
        sub_db: Option<&str>,
        cache: CachePolicy,
    ) -> Result<Self> {
        Ok(Self(LmdbMap::open(path, sub_db, cache, DEFAULT_MAX_DBS)?))
    }
}

impl<V> Deref for SafeLmdbMap<V> {
    type Target = LmdbMap<V, StructuredCodec>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<V> DerefMut for SafeLmdbMap<V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<V> fmt::Display for SafeLmdbMap<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt_tag("SafeLmdbMap", f)
    }
}

/// Raw `Vec<u8>` values passed through unchanged, no cache, no locking beyond what a single
/// store transaction already gives each operation. Fastest facade, and the only one where two
/// readers can observe a torn view of a key that a concurrent `update` is still writing across
/// multiple keys (each individual key's write is still transactional).
pub struct RawLmdbMap(LmdbMap<Vec<u8>, RawCodec>);

impl RawLmdbMap {
    pub fn open(path: impl AsRef<Path>, sub_db: Option<&str>) -> Result<Self> {
        Ok(Self(LmdbMap::open(
            path,
            sub_db,
            CachePolicy::NoOp,
            DEFAULT_MAX_DBS,
        )?))
    }
}

impl Deref for RawLmdbMap {
    type Target = LmdbMap<Vec<u8>, RawCodec>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for RawLmdbMap {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl fmt::Display for RawLmdbMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt_tag("RawLmdbMap", f)
    }
}

/// Structured values with caching mandatory: rejects a no-op cache policy at construction,
/// since the whole point of this facade is that a second handle on the same sub-database can't
/// silently disable the cache the first one is relying on.
pub struct CachedLmdbMap<V>(LmdbMap<V, StructuredCodec>);

impl<V> CachedLmdbMap<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn open(path: impl AsRef<Path>, sub_db: Option<&str>) -> Result<Self> {
        Self::open_with_cache(path, sub_db, CachePolicy::LRU_128)
    }

    pub fn open_with_cache(
        path: impl AsRef<Path>,
        sub_db: Option<&str>,
        cache: CachePolicy,
    ) -> Result<Self> {
        if cache.is_no_op() {
            return Err(MapError::TypeMismatch(
                "CachedLmdbMap requires a real cache policy, not CachePolicy::NoOp".to_string(),
            ));
        }
        Ok(Self(LmdbMap::open(path, sub_db, cache, DEFAULT_MAX_DBS)?))
    }
}

impl<V> Deref for CachedLmdbMap<V> {
    type Target = LmdbMap<V, StructuredCodec>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<V> DerefMut for CachedLmdbMap<V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<V> fmt::Display for CachedLmdbMap<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt_tag("CachedLmdbMap", f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn cached_map_rejects_no_op_policy() {
        let dir = tempdir().unwrap();
        let result = CachedLmdbMap::<String>::open_with_cache(dir.path(), None, CachePolicy::NoOp);
        assert!(matches!(result, Err(MapError::TypeMismatch(_))));
    }

    #[test]
    fn facades_share_state_across_the_same_path() {
        let dir = tempdir().unwrap();
        let a = SafeLmdbMap::<String>::open(dir.path(), None).unwrap();
        a.set("k", "v".to_string()).unwrap();
        let b = SafeLmdbMap::<String>::open(dir.path(), None).unwrap();
        assert_eq!(b.get("k").unwrap(), "v");
    }
}
