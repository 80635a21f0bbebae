//! In-memory storage
//!
//! Keeps entries in a mutex-guarded map with explicit access bookkeeping:
//! every read and write advances a logical clock, so least-recently-used
//! ordering is exact rather than subject to filesystem atime policy.
//! Clones share the same namespace.

use crate::error::{CacheError, CacheResult};
use crate::storage::{plan_eviction, Storage};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    mtime: DateTime<Utc>,
    atime: DateTime<Utc>,
    access_tick: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    clock: u64,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.data.len() as u64).sum()
    }
}

/// Shared in-memory storage with an optional size budget
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
    max_size: Option<u64>,
}

impl MemoryStorage {
    /// Empty storage without a size budget
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty storage with a maximum aggregate size in bytes
    pub fn with_max_size(max_size: u64) -> Self {
        Self {
            inner: Arc::default(),
            max_size: Some(max_size),
        }
    }

    /// Total size of all entries in bytes
    pub fn total_size(&self) -> u64 {
        self.lock().total_size()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock poisoning only happens if a holder panicked; the map itself
        // is still consistent, every mutation completes under the lock.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn read(&self, path: &str, deadline: Option<DateTime<Utc>>) -> CacheResult<Vec<u8>> {
        let mut inner = self.lock();
        let tick = inner.tick();
        let entry = inner
            .entries
            .get_mut(path)
            .ok_or_else(|| CacheError::NotFound {
                path: path.to_string(),
            })?;

        if let Some(deadline) = deadline {
            if entry.mtime < deadline {
                debug!("Cache entry {} expired", path);
                return Err(CacheError::Expired {
                    path: path.to_string(),
                });
            }
        }

        entry.atime = Utc::now();
        entry.access_tick = tick;
        Ok(entry.data.clone())
    }

    fn write(&self, path: &str, data: &[u8]) -> CacheResult<()> {
        let mut inner = self.lock();

        if let Some(max_size) = self.max_size {
            let incoming = data.len() as u64;
            // Overwrites replace the old entry, so its size does not count
            let existing = inner
                .entries
                .get(path)
                .map_or(0, |e| e.data.len() as u64);
            if inner.total_size() - existing + incoming > max_size {
                let candidates = inner
                    .entries
                    .iter()
                    .map(|(p, e)| (p.clone(), e.access_tick, e.data.len() as u64))
                    .collect();
                for victim in plan_eviction(candidates, max_size) {
                    debug!("Evicting cache entry {}", victim);
                    inner.entries.remove(&victim);
                }
            }
        }

        let tick = inner.tick();
        let now = Utc::now();
        inner.entries.insert(
            path.to_string(),
            Entry {
                data: data.to_vec(),
                mtime: now,
                atime: now,
                access_tick: tick,
            },
        );
        Ok(())
    }

    fn delete(&self, path: &str) -> CacheResult<()> {
        self.lock()
            .entries
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| CacheError::NotFound {
                path: path.to_string(),
            })
    }

    fn clear(&self) -> CacheResult<()> {
        let mut inner = self.lock();
        inner.entries.clear();
        Ok(())
    }

    fn mtime(&self, path: &str) -> CacheResult<Option<DateTime<Utc>>> {
        Ok(self.lock().entries.get(path).map(|e| e.mtime))
    }

    fn atime(&self, path: &str) -> CacheResult<Option<DateTime<Utc>>> {
        Ok(self.lock().entries.get(path).map(|e| e.atime))
    }

    fn size(&self, path: &str) -> CacheResult<u64> {
        Ok(self
            .lock()
            .entries
            .get(path)
            .map_or(0, |e| e.data.len() as u64))
    }

    fn list(&self) -> CacheResult<Vec<String>> {
        let mut paths: Vec<String> = self.lock().entries.keys().cloned().collect();
        paths.sort();
        Ok(paths)
    }
}
