//! A persistent associative map backed by a memory-mapped LMDB store, with an in-process
//! decoded-value cache and per-key reentrant locking coordinating access across every facade
//! instance pointed at the same storage path.
//!
//! Three pre-wired facades cover the common cases:
//!
//! - [`SafeLmdbMap`] — structured values (`serde` + JSON/DEFLATE), a bounded LRU cache by
//!   default. Start here.
//! - [`RawLmdbMap`] — `Vec<u8>` values passed through unchanged, no cache, minimal overhead.
//! - [`CachedLmdbMap`] — like `SafeLmdbMap`, but rejects construction with a no-op cache policy.
//!
//! All three are thin wrappers around the general facade, [`LmdbMap`], generic over the value
//! type and the [`Codec`] used to (de)serialize it. Facades opened against the same canonical
//! path and sub-database name share their environment handle and, when their concrete value
//! type and cache-policy class agree, their cache and lock pool too.

pub mod cache;
pub mod codec;
pub mod error;
mod facades;
mod iter;
mod locker;
mod lockpool;
mod map;
mod registry;
mod store;

pub use cache::{Cache, CachePolicy, CacheState, LruValueCache, NoOpCache};
pub use codec::{Codec, MapKey, RawCodec, StructuredCodec};
pub use error::{MapError, Result};
pub use facades::{CachedLmdbMap, RawLmdbMap, SafeLmdbMap};
pub use iter::{Items, ItemsView, Keys, KeysView, Values, ValuesView};
pub use lockpool::{KeyGuard, LockPool, NoOpLockPool, ReentrantLockPool};
pub use map::LmdbMap;
