//! Cache key derivation
//!
//! A cache key is a SHA-256 fingerprint over everything that determines a
//! call's result: the callable's code tag, the serializer identity, the
//! instance token for per-instance method scoping, and the bound arguments.
//! Same inputs = same key; changing any of them invalidates the entry.
//!
//! Argument values are hashed through their canonical JSON encoding, not a
//! display string, so two values that merely print alike still hash apart.

use crate::error::{CacheError, CacheResult};
use crate::serializer::Serializer;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Ordered binding of parameter names to argument values
///
/// The caller binds arguments in declaration order, the way the wrapped
/// callable declares them. Positional and named call sites that bind the
/// same values produce the same `CallArgs`.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    entries: Vec<(String, Value)>,
}

impl CallArgs {
    /// Create an empty binding (for zero-argument callables)
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the next parameter to a value
    ///
    /// Fails if the value cannot be encoded or the name is already bound.
    pub fn arg<T: Serialize>(mut self, name: &str, value: &T) -> CacheResult<Self> {
        if self.entries.iter().any(|(n, _)| n == name) {
            return Err(CacheError::config(format!(
                "argument {name} is bound twice"
            )));
        }
        let encoded = serde_json::to_value(value)?;
        self.entries.push((name.to_string(), encoded));
        Ok(self)
    }

    /// Parameter names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Number of bound parameters
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no parameters are bound
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical byte form of the binding with ignored parameters removed
    ///
    /// Rejects ignore names that do not exist in the binding; silently
    /// skipping a typo would quietly widen the cache scope.
    fn filtered_bytes(&self, ignore: &BTreeSet<String>) -> CacheResult<Vec<u8>> {
        for name in ignore {
            if !self.entries.iter().any(|(n, _)| n == name) {
                return Err(CacheError::config(format!(
                    "ignored parameter {name} is not an argument of this callable"
                )));
            }
        }

        // serde_json's Map preserves insertion order, so the encoding is
        // deterministic for a fixed declaration order.
        let mut map = Map::new();
        for (name, value) in &self.entries {
            if !ignore.contains(name) {
                map.insert(name.clone(), value.clone());
            }
        }
        Ok(serde_json::to_vec(&Value::Object(map))?)
    }
}

/// Identity of one live instance, for per-instance method scoping
///
/// Unique per construction and stable for the instance's lifetime. Not
/// stable across process restarts: a restarted process starts with fresh
/// per-instance scopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceToken(Uuid);

impl InstanceToken {
    /// Mint a fresh instance identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Grouping discriminator embedded in an entry's path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// A free function
    Function { name: String },
    /// A method of a named class
    Method { class: String, name: String },
}

impl Scope {
    fn prefix(&self) -> String {
        match self {
            Self::Function { name } => name.clone(),
            Self::Method { class, name } => format!("{class}.{name}"),
        }
    }
}

/// Compute the fingerprint for one invocation
///
/// The digest covers the code tag, the serializer identity, the optional
/// instance token and the canonical bytes of the non-ignored arguments.
pub fn derive_key(
    code: &str,
    serializer: &dyn Serializer,
    instance: Option<&InstanceToken>,
    args: &CallArgs,
    ignore: &BTreeSet<String>,
) -> CacheResult<String> {
    let arg_bytes = args.filtered_bytes(ignore)?;

    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hasher.update(serializer.name().as_bytes());
    if let Some(token) = instance {
        hasher.update(token.0.as_bytes());
    }
    hasher.update(&arg_bytes);

    Ok(hex::encode(hasher.finalize()))
}

/// Render the storage path for a scope, key and serializer extension
///
/// Format: `{class.}{name}-{key}.{extension}`
pub fn entry_path(scope: &Scope, key: &str, extension: &str) -> String {
    format!("{}-{}.{}", scope.prefix(), key, extension)
}
