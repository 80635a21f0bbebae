//! Pluggable value serialization for cache entries
//!
//! A [`Serializer`] converts an in-memory value to bytes and back. The
//! serializer's identity is part of the cache key, so switching formats
//! invalidates existing entries. Formats are explicitly allowed to reject
//! value shapes they cannot represent (TOML has no null, for example);
//! that surfaces as a [`CacheError::Serialization`] to the caller.

pub mod formats;

pub use formats::{JsonSerializer, MessagePackSerializer, TomlSerializer, YamlSerializer};

use crate::error::CacheResult;
use serde_json::Value;
use std::fmt;

/// Abstract serialization interface
///
/// Implementations must be pure transformations: no side effects besides
/// encoding and decoding.
pub trait Serializer: fmt::Debug + Send + Sync {
    /// Stable identity of this serializer; participates in key derivation
    fn name(&self) -> &'static str;

    /// File extension used in storage paths (no leading dot)
    fn extension(&self) -> &'static str;

    /// Encode a value to bytes
    fn dumps(&self, value: &Value) -> CacheResult<Vec<u8>>;

    /// Decode bytes back to a value
    fn loads(&self, data: &[u8]) -> CacheResult<Value>;
}
