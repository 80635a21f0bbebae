//! Error types for permacache
//!
//! All modules use `CacheResult<T>` as their return type.

use thiserror::Error;

/// Result type alias for permacache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors that can occur in permacache
#[derive(Error, Debug)]
pub enum CacheError {
    // Lookup outcomes recovered by the orchestrator
    #[error("No cache entry at {path}")]
    NotFound { path: String },

    #[error("Cache entry at {path} is older than the TTL deadline")]
    Expired { path: String },

    // Configuration errors, raised eagerly at build or call-binding time
    #[error("Invalid cache configuration: {reason}")]
    Config { reason: String },

    // Serialization errors
    #[error("Serialization failed ({format}): {reason}")]
    Serialization { format: &'static str, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create a serialization error for the given format
    pub fn serialization(format: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Serialization {
            format,
            reason: reason.to_string(),
        }
    }

    /// Whether this error is an expected lookup miss.
    ///
    /// `NotFound` and `Expired` trigger recomputation; every other variant
    /// propagates unchanged to the caller.
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Expired { .. })
    }
}
