//! Durable byte storage for cache entries
//!
//! A [`Storage`] is a flat namespace of opaque string paths. Entries are
//! written wholesale (never mutated in place) and read subject to an
//! optional TTL deadline. A configured maximum aggregate size is enforced
//! by evicting least-recently-used entries before a write.
//!
//! Namespaces may be shared across processes; the design accepts
//! last-write-wins races and a slightly-over-budget namespace when an
//! eviction pass interleaves with concurrent writers.

pub mod local;
pub mod memory;

pub use local::LocalFileStorage;
pub use memory::MemoryStorage;

use crate::error::CacheResult;
use chrono::{DateTime, Utc};
use std::fmt;

/// Abstract storage interface
pub trait Storage: fmt::Debug + Send + Sync {
    /// Read the entry at `path`.
    ///
    /// Fails with `NotFound` if no entry exists. Fails with `Expired` if
    /// `deadline` is given and the entry's modification time is strictly
    /// older than it.
    fn read(&self, path: &str, deadline: Option<DateTime<Utc>>) -> CacheResult<Vec<u8>>;

    /// Write the entry at `path`, replacing any previous contents.
    ///
    /// Creates the namespace if absent. Runs eviction first when a
    /// configured maximum size would be exceeded.
    fn write(&self, path: &str, data: &[u8]) -> CacheResult<()>;

    /// Remove a single entry; `NotFound` if absent
    fn delete(&self, path: &str) -> CacheResult<()>;

    /// Remove the entire namespace and its contents; idempotent
    fn clear(&self) -> CacheResult<()>;

    /// Last modification time, `None` if the entry does not exist
    fn mtime(&self, path: &str) -> CacheResult<Option<DateTime<Utc>>>;

    /// Last access time, `None` if the entry does not exist
    fn atime(&self, path: &str) -> CacheResult<Option<DateTime<Utc>>>;

    /// Entry size in bytes, 0 if the entry does not exist
    fn size(&self, path: &str) -> CacheResult<u64>;

    /// All entry paths in the namespace
    fn list(&self) -> CacheResult<Vec<String>>;
}

/// Pick the entries to delete so the kept set stays under `target` bytes.
///
/// Entries are ranked most-recently-used first (higher recency value wins,
/// path order breaks ties so a single pass is stable). Sizes accumulate
/// down the ranking; the entry whose size would push the running total to
/// or past `target` is deleted along with everything ranked below it.
pub(crate) fn plan_eviction<K: Ord>(
    mut entries: Vec<(String, K, u64)>,
    target: u64,
) -> Vec<String> {
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut kept = 0u64;
    let mut victims = Vec::new();
    let mut evicting = false;
    for (path, _, size) in entries {
        if evicting || kept.saturating_add(size) >= target {
            evicting = true;
            victims.push(path);
        } else {
            kept += size;
        }
    }
    victims
}
