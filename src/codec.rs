//! Key encoding and value codecs.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{MapError, Result};

/// A value codec: how a decoded value is turned into the bytes actually stored in the mmap
/// database, and back.
pub trait Codec<V> {
    fn serialize(&self, value: &V) -> Result<Vec<u8>>;
    fn deserialize(&self, bytes: &[u8]) -> Result<V>;
}

/// JSON plus DEFLATE: readable on disk with `mdb_dump`-style tooling after decompression, and
/// small enough that the compression step rarely costs more than it saves once values cross a
/// few hundred bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredCodec;

impl<V> Codec<V> for StructuredCodec
where
    V: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &V) -> Result<Vec<u8>> {
        let text = serde_json::to_vec(value)?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&text)
            .map_err(|e| MapError::CodecFailure(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| MapError::CodecFailure(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<V> {
        let mut decoder = ZlibDecoder::new(bytes);
        let mut text = Vec::new();
        decoder
            .read_to_end(&mut text)
            .map_err(|e| MapError::CodecFailure(e.to_string()))?;
        Ok(serde_json::from_slice(&text)?)
    }
}

/// Identity codec: the decoded value type is `Vec<u8>` and it passes through unchanged. Used by
/// the raw-bytes facade, where a cache or a re-encoding step would only duplicate what the mmap
/// already gives you for free.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec<Vec<u8>> for RawCodec {
    fn serialize(&self, value: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// A caller-supplied key, accepted either as text (encoded as its UTF-8 bytes) or as
/// already-encoded bytes. The resulting bytes are the canonical identity shared by the cache,
/// the lock pool, and the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapKey {
    Text(String),
    Bytes(Vec<u8>),
}

impl MapKey {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            MapKey::Text(s) => s.as_bytes().to_vec(),
            MapKey::Bytes(b) => b.clone(),
        }
    }

    /// Reconstructs a key from raw bytes the way the store's own iteration order yields them:
    /// as text when the bytes are valid UTF-8 (the common case, since most keys originate from
    /// `&str`), and as raw bytes otherwise.
    pub fn decode(bytes: &[u8]) -> MapKey {
        match std::str::from_utf8(bytes) {
            Ok(s) => MapKey::Text(s.to_owned()),
            Err(_) => MapKey::Bytes(bytes.to_vec()),
        }
    }
}

impl std::fmt::Display for MapKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MapKey::Text(s) => write!(f, "{s}"),
            MapKey::Bytes(b) => write!(f, "{b:?}"),
        }
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        MapKey::Text(s.to_owned())
    }
}

impl From<String> for MapKey {
    fn from(s: String) -> Self {
        MapKey::Text(s)
    }
}

impl From<&String> for MapKey {
    fn from(s: &String) -> Self {
        MapKey::Text(s.clone())
    }
}

impl From<Vec<u8>> for MapKey {
    fn from(b: Vec<u8>) -> Self {
        MapKey::Bytes(b)
    }
}

impl From<&[u8]> for MapKey {
    fn from(b: &[u8]) -> Self {
        MapKey::Bytes(b.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for MapKey {
    fn from(b: &[u8; N]) -> Self {
        MapKey::Bytes(b.to_vec())
    }
}
