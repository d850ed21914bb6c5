use thiserror::Error;

/// Errors surfaced by the map facade and its supporting components.
///
/// Variants correspond to the error kinds in the coordination protocol, not to internal
/// implementation details: callers match on these, not on how the failure was detected.
#[derive(Error, Debug)]
pub enum MapError {
    /// The requested key is not present in the store (and, where applicable, is recorded as
    /// MISSING in the cache).
    #[error("key not found")]
    AbsentKey,

    /// A constructor-time mismatch between a facade's fixed policy and the cache/value type it
    /// was asked to use (e.g. a non-no-op cache passed to the raw-bytes facade).
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A second handle was opened against a registry key already bound to an incompatible cache
    /// policy.
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),

    /// Serialization or deserialization of a value failed.
    #[error("codec failure: {0}")]
    CodecFailure(String),

    /// The underlying mmap store reported a failure (I/O, map full, aborted transaction).
    #[error("store failure: {0}")]
    StoreFailure(String),
}

pub type Result<T> = std::result::Result<T, MapError>;

impl From<rkv::StoreError> for MapError {
    fn from(e: rkv::StoreError) -> Self {
        MapError::StoreFailure(e.to_string())
    }
}

impl From<std::io::Error> for MapError {
    fn from(e: std::io::Error) -> Self {
        MapError::StoreFailure(e.to_string())
    }
}

impl From<serde_json::Error> for MapError {
    fn from(e: serde_json::Error) -> Self {
        MapError::CodecFailure(e.to_string())
    }
}
