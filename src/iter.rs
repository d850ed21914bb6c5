//! Lazy key, value, and item views.
//!
//! `.keys()`/`.values()`/`.items()` are cheap to call: they don't touch the store until actually
//! iterated. Iteration itself snapshots the current key order in one short read transaction the
//! first time `next()` is called, then resolves each key's value lazily, one at a time, under
//! that key's own lock — so a value changed or removed after the view was created, but before
//! its key is reached, is reflected at yield time rather than frozen at snapshot time.

use std::vec::IntoIter as VecIntoIter;

use crate::codec::{Codec, MapKey};
use crate::error::{MapError, Result};
use crate::map::LmdbMap;
use crate::store;

enum Cursor {
    NotStarted,
    Running(VecIntoIter<Vec<u8>>),
    Failed,
}

pub struct KeysView<'a, V, Cd> {
    map: &'a LmdbMap<V, Cd>,
    reverse: bool,
}

impl<'a, V, Cd> KeysView<'a, V, Cd>
where
    V: Clone + Send + Sync + 'static,
    Cd: Codec<V>,
{
    pub(crate) fn new(map: &'a LmdbMap<V, Cd>, reverse: bool) -> Self {
        Self { map, reverse }
    }

    pub fn len(&self) -> Result<usize> {
        self.map.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.map.is_empty()
    }

    pub fn contains<K: Into<MapKey>>(&self, key: K) -> Result<bool> {
        self.map.contains(key)
    }
}

impl<'a, V, Cd> IntoIterator for KeysView<'a, V, Cd>
where
    V: Clone + Send + Sync + 'static,
    Cd: Codec<V>,
{
    type Item = Result<MapKey>;
    type IntoIter = Keys<'a, V, Cd>;

    fn into_iter(self) -> Keys<'a, V, Cd> {
        Keys {
            map: self.map,
            reverse: self.reverse,
            cursor: Cursor::NotStarted,
        }
    }
}

pub struct Keys<'a, V, Cd> {
    map: &'a LmdbMap<V, Cd>,
    reverse: bool,
    cursor: Cursor,
}

impl<'a, V, Cd> Iterator for Keys<'a, V, Cd>
where
    V: Clone + Send + Sync + 'static,
    Cd: Codec<V>,
{
    type Item = Result<MapKey>;

    fn next(&mut self) -> Option<Result<MapKey>> {
        if let Cursor::NotStarted = self.cursor {
            match store::keys(&self.map.env, &self.map.store, self.reverse) {
                Ok(keys) => self.cursor = Cursor::Running(keys.into_iter()),
                Err(e) => {
                    self.cursor = Cursor::Failed;
                    return Some(Err(e));
                }
            }
        }
        match &mut self.cursor {
            Cursor::Running(iter) => iter.next().map(|bytes| Ok(MapKey::decode(&bytes))),
            _ => None,
        }
    }
}

pub struct ValuesView<'a, V, Cd> {
    map: &'a LmdbMap<V, Cd>,
}

impl<'a, V, Cd> ValuesView<'a, V, Cd>
where
    V: Clone + Send + Sync + 'static,
    Cd: Codec<V>,
{
    pub(crate) fn new(map: &'a LmdbMap<V, Cd>) -> Self {
        Self { map }
    }

    pub fn len(&self) -> Result<usize> {
        self.map.len()
    }
}

impl<'a, V, Cd> ValuesView<'a, V, Cd>
where
    V: Clone + Send + Sync + 'static + PartialEq,
    Cd: Codec<V>,
{
    /// Scans every value looking for a match, populating the cache with MISSING for any key
    /// that turns out to have been removed mid-scan.
    pub fn contains(&self, value: &V) -> Result<bool> {
        for key in store::keys(&self.map.env, &self.map.store, false)? {
            if self.map.get_by_encoded(&key)?.as_ref() == Some(value) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl<'a, V, Cd> IntoIterator for ValuesView<'a, V, Cd>
where
    V: Clone + Send + Sync + 'static,
    Cd: Codec<V>,
{
    type Item = Result<V>;
    type IntoIter = Values<'a, V, Cd>;

    fn into_iter(self) -> Values<'a, V, Cd> {
        Values {
            map: self.map,
            cursor: Cursor::NotStarted,
        }
    }
}

pub struct Values<'a, V, Cd> {
    map: &'a LmdbMap<V, Cd>,
    cursor: Cursor,
}

impl<'a, V, Cd> Iterator for Values<'a, V, Cd>
where
    V: Clone + Send + Sync + 'static,
    Cd: Codec<V>,
{
    type Item = Result<V>;

    fn next(&mut self) -> Option<Result<V>> {
        if let Cursor::NotStarted = self.cursor {
            match store::keys(&self.map.env, &self.map.store, false) {
                Ok(keys) => self.cursor = Cursor::Running(keys.into_iter()),
                Err(e) => {
                    self.cursor = Cursor::Failed;
                    return Some(Err(e));
                }
            }
        }
        let key = match &mut self.cursor {
            Cursor::Running(iter) => iter.next()?,
            _ => return None,
        };
        match self.map.get_by_encoded(&key) {
            Ok(Some(v)) => Some(Ok(v)),
            Ok(None) => Some(Err(MapError::AbsentKey)),
            Err(e) => Some(Err(e)),
        }
    }
}

pub struct ItemsView<'a, V, Cd> {
    map: &'a LmdbMap<V, Cd>,
}

impl<'a, V, Cd> ItemsView<'a, V, Cd>
where
    V: Clone + Send + Sync + 'static,
    Cd: Codec<V>,
{
    pub(crate) fn new(map: &'a LmdbMap<V, Cd>) -> Self {
        Self { map }
    }

    pub fn len(&self) -> Result<usize> {
        self.map.len()
    }
}

impl<'a, V, Cd> ItemsView<'a, V, Cd>
where
    V: Clone + Send + Sync + 'static + PartialEq,
    Cd: Codec<V>,
{
    pub fn contains<K: Into<MapKey>>(&self, key: K, value: &V) -> Result<bool> {
        let encoded = key.into().encode();
        match self.map.get_by_encoded(&encoded)? {
            Some(v) => Ok(v == *value),
            None => Ok(false),
        }
    }
}

impl<'a, V, Cd> IntoIterator for ItemsView<'a, V, Cd>
where
    V: Clone + Send + Sync + 'static,
    Cd: Codec<V>,
{
    type Item = Result<(MapKey, V)>;
    type IntoIter = Items<'a, V, Cd>;

    fn into_iter(self) -> Items<'a, V, Cd> {
        Items {
            map: self.map,
            cursor: Cursor::NotStarted,
        }
    }
}

pub struct Items<'a, V, Cd> {
    map: &'a LmdbMap<V, Cd>,
    cursor: Cursor,
}

impl<'a, V, Cd> Iterator for Items<'a, V, Cd>
where
    V: Clone + Send + Sync + 'static,
    Cd: Codec<V>,
{
    type Item = Result<(MapKey, V)>;

    fn next(&mut self) -> Option<Result<(MapKey, V)>> {
        if let Cursor::NotStarted = self.cursor {
            match store::keys(&self.map.env, &self.map.store, false) {
                Ok(keys) => self.cursor = Cursor::Running(keys.into_iter()),
                Err(e) => {
                    self.cursor = Cursor::Failed;
                    return Some(Err(e));
                }
            }
        }
        let key = match &mut self.cursor {
            Cursor::Running(iter) => iter.next()?,
            _ => return None,
        };
        let decoded_key = MapKey::decode(&key);
        match self.map.get_by_encoded(&key) {
            Ok(Some(v)) => Some(Ok((decoded_key, v))),
            Ok(None) => Some(Err(MapError::AbsentKey)),
            Err(e) => Some(Err(e)),
        }
    }
}
