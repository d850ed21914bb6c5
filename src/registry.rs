//! Process-wide registry deduplicating environments and lockers across facades that point at
//! the same storage path and logical sub-database.
//!
//! Two tables exist because the two things they guard have different sharing rules. The
//! environment is pure bytes, so any two facades at the same canonical path can share it no
//! matter what value type or codec they use. The locker holds a decoded-value cache, so it can
//! only be shared between facades that agree on the concrete value type `V` — Rust's static
//! typing, unlike the dynamic typing this coordination protocol was originally designed around,
//! makes that agreement a compile-time fact rather than a runtime check.
//!
//! Both tables store weak references: once the last facade referring to an entry is dropped, the
//! entry can no longer be upgraded and the next `acquire` call simply rebuilds it. There's no
//! explicit close/release path to get wrong.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::cache::CachePolicy;
use crate::error::{MapError, Result};
use crate::locker::Locker;
use crate::store::{self, Env, Store};

/// Identity under which handles and lockers are shared: a canonicalized path plus an optional
/// sub-database name (`None` is LMDB's unnamed default database).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    pub path: PathBuf,
    pub sub_db: Option<String>,
}

struct EnvSlot {
    env: Weak<Env>,
}

static ENVIRONMENTS: OnceCell<Mutex<HashMap<PathBuf, EnvSlot>>> = OnceCell::new();

fn environments() -> &'static Mutex<HashMap<PathBuf, EnvSlot>> {
    ENVIRONMENTS.get_or_init(|| Mutex::new(HashMap::new()))
}

struct LockerSlot<V> {
    locker: Weak<Locker<V>>,
    policy: CachePolicy,
}

/// Type-erased table of per-value-type locker tables. Each entry is a
/// `HashMap<RegistryKey, LockerSlot<V>>` for one concrete `V`, boxed as `dyn Any` so a single
/// non-generic static can host all of them.
static LOCKERS: OnceCell<Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>> = OnceCell::new();

fn lockers() -> &'static Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>> {
    LOCKERS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn acquire_env(path: &Path, max_dbs: u32) -> Result<Arc<Env>> {
    let mut table = environments().lock();
    if let Some(slot) = table.get(path) {
        if let Some(env) = slot.env.upgrade() {
            return Ok(env);
        }
    }
    let env = Arc::new(store::open_env(path, max_dbs)?);
    table.insert(
        path.to_path_buf(),
        EnvSlot {
            env: Arc::downgrade(&env),
        },
    );
    Ok(env)
}

fn acquire_locker<V: Clone + Send + Sync + 'static>(
    key: &RegistryKey,
    policy: CachePolicy,
) -> Result<Arc<Locker<V>>> {
    let mut table = lockers().lock();
    let sub_table = table
        .entry(TypeId::of::<V>())
        .or_insert_with(|| Box::new(HashMap::<RegistryKey, LockerSlot<V>>::new()))
        .downcast_mut::<HashMap<RegistryKey, LockerSlot<V>>>()
        .expect("registry sub-table type tag must match the TypeId key it's stored under");

    if let Some(slot) = sub_table.get(key) {
        if let Some(locker) = slot.locker.upgrade() {
            if !policy.same_class(&slot.policy) {
                return Err(MapError::ConfigConflict(format!(
                    "{key:?} is already bound to a different cache policy"
                )));
            }
            return Ok(locker);
        }
    }

    let locker = Arc::new(Locker::from_policy(policy));
    sub_table.insert(
        key.clone(),
        LockerSlot {
            locker: Arc::downgrade(&locker),
            policy,
        },
    );
    Ok(locker)
}

pub(crate) struct StoreHandle<V> {
    pub(crate) env: Arc<Env>,
    pub(crate) store: Store,
    pub(crate) key: RegistryKey,
    pub(crate) locker: Arc<Locker<V>>,
}

pub(crate) fn acquire<V: Clone + Send + Sync + 'static>(
    path: &Path,
    sub_db: Option<&str>,
    max_dbs: u32,
    policy: CachePolicy,
) -> Result<StoreHandle<V>> {
    fs::create_dir_all(path)?;
    let canonical = fs::canonicalize(path)?;

    let env = acquire_env(&canonical, max_dbs)?;
    let store = store::open_store(&env, sub_db)?;
    let key = RegistryKey {
        path: canonical,
        sub_db: sub_db.map(str::to_owned),
    };
    let locker = acquire_locker::<V>(&key, policy)?;

    tracing::debug!(path = %key.path.display(), sub_db = ?key.sub_db, "acquired store handle");

    Ok(StoreHandle {
        env,
        store,
        key,
        locker,
    })
}
