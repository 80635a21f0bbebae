//! Built-in serialization formats
//!
//! MessagePack is the default: it is binary and round-trips the whole value
//! domain. The text formats are for caches that humans want to inspect; each
//! has documented fidelity limits.

use crate::error::{CacheError, CacheResult};
use crate::serializer::Serializer;
use serde_json::Value;

/// Binary MessagePack format; round-trips the full value domain
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackSerializer;

impl Serializer for MessagePackSerializer {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn extension(&self) -> &'static str {
        "msgpack"
    }

    fn dumps(&self, value: &Value) -> CacheResult<Vec<u8>> {
        rmp_serde::to_vec_named(value).map_err(|e| CacheError::serialization("msgpack", e))
    }

    fn loads(&self, data: &[u8]) -> CacheResult<Value> {
        rmp_serde::from_slice(data).map_err(|e| CacheError::serialization("msgpack", e))
    }
}

/// Human-readable JSON format
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extension(&self) -> &'static str {
        "json"
    }

    fn dumps(&self, value: &Value) -> CacheResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(CacheError::Json)
    }

    fn loads(&self, data: &[u8]) -> CacheResult<Value> {
        serde_json::from_slice(data).map_err(CacheError::Json)
    }
}

/// Human-readable YAML format
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlSerializer;

impl Serializer for YamlSerializer {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn extension(&self) -> &'static str {
        "yaml"
    }

    fn dumps(&self, value: &Value) -> CacheResult<Vec<u8>> {
        let text = serde_yaml::to_string(value).map_err(|e| CacheError::serialization("yaml", e))?;
        Ok(text.into_bytes())
    }

    fn loads(&self, data: &[u8]) -> CacheResult<Value> {
        serde_yaml::from_slice(data).map_err(|e| CacheError::serialization("yaml", e))
    }
}

/// Human-readable TOML format
///
/// TOML cannot represent null values or non-map top-level values; such
/// values fail with a serialization error rather than losing fidelity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlSerializer;

impl Serializer for TomlSerializer {
    fn name(&self) -> &'static str {
        "toml"
    }

    fn extension(&self) -> &'static str {
        "toml"
    }

    fn dumps(&self, value: &Value) -> CacheResult<Vec<u8>> {
        if !value.is_object() {
            return Err(CacheError::serialization(
                "toml",
                "top-level value must be a table",
            ));
        }
        let text = toml::to_string(value).map_err(|e| CacheError::serialization("toml", e))?;
        Ok(text.into_bytes())
    }

    fn loads(&self, data: &[u8]) -> CacheResult<Value> {
        let text =
            std::str::from_utf8(data).map_err(|e| CacheError::serialization("toml", e))?;
        toml::from_str(text).map_err(|e| CacheError::serialization("toml", e))
    }
}
