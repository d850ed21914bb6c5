//! Two facade instances opened against the same path (and sub-database) observe each other's
//! writes immediately, and a conflicting cache policy at the same registry key is rejected.

use lmdb_map::{CachePolicy, MapError, SafeLmdbMap};
use tempfile::tempdir;

#[test]
fn two_handles_on_the_same_path_see_each_others_writes() {
    let dir = tempdir().unwrap();
    let a: SafeLmdbMap<String> = SafeLmdbMap::open(dir.path(), None).unwrap();
    let b: SafeLmdbMap<String> = SafeLmdbMap::open(dir.path(), None).unwrap();

    a.set("aaa", "from-a".to_string()).unwrap();
    assert_eq!(b.get("aaa").unwrap(), "from-a");

    b.set("bbb", "from-b".to_string()).unwrap();
    assert_eq!(a.get("bbb").unwrap(), "from-b");
}

#[test]
fn a_cached_value_is_visible_through_the_sibling_handle_without_a_store_round_trip() {
    let dir = tempdir().unwrap();
    let a: SafeLmdbMap<String> = SafeLmdbMap::open(dir.path(), None).unwrap();
    let b: SafeLmdbMap<String> = SafeLmdbMap::open(dir.path(), None).unwrap();

    a.set("aaa", "value".to_string()).unwrap();
    // Populates a's cache entry, which is the same cache b reads from.
    a.get("aaa").unwrap();

    assert_eq!(b.get("aaa").unwrap(), "value");
}

#[test]
fn conflicting_cache_policy_on_the_same_registry_key_is_rejected() {
    let dir = tempdir().unwrap();
    let _a: SafeLmdbMap<String> =
        SafeLmdbMap::open_with_cache(dir.path(), None, CachePolicy::NoOp).unwrap();
    let b = SafeLmdbMap::<String>::open_with_cache(dir.path(), None, CachePolicy::LRU_128);
    assert!(matches!(b, Err(MapError::ConfigConflict(_))));
}

#[test]
fn matching_cache_policy_class_is_accepted_even_with_a_different_maxsize() {
    let dir = tempdir().unwrap();
    let _a: SafeLmdbMap<String> =
        SafeLmdbMap::open_with_cache(dir.path(), None, CachePolicy::Lru(4)).unwrap();
    let b = SafeLmdbMap::<String>::open_with_cache(dir.path(), None, CachePolicy::Lru(512));
    assert!(b.is_ok());
}
