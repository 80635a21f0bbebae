//! Permacache - Persistent Memoization
//!
//! Wraps any callable so repeated invocations with equivalent inputs are
//! served from durable storage. Results can be saved in any format to any
//! storage; serializers and storages are pluggable, and caches invalidate
//! when the callable's code tag, its arguments or the serializer change.

pub mod cache;
pub mod error;
pub mod key;
pub mod serializer;
pub mod storage;

pub use cache::{Cache, CachedFunction, CachedMethod, NoCache};
pub use error::{CacheError, CacheResult};
pub use key::{CallArgs, InstanceToken};
pub use serializer::{
    JsonSerializer, MessagePackSerializer, Serializer, TomlSerializer, YamlSerializer,
};
pub use storage::{LocalFileStorage, MemoryStorage, Storage};
