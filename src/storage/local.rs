//! Local filesystem storage
//!
//! Entries live as regular files directly under a root directory. The root
//! is created lazily on first write. Recency for eviction comes from file
//! access times, falling back to modification times on filesystems that
//! suppress atime.

use crate::error::{CacheError, CacheResult};
use crate::storage::{plan_eviction, Storage};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Filesystem-backed storage with an optional size budget
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    location: PathBuf,
    max_size: Option<u64>,
}

impl LocalFileStorage {
    /// Storage rooted at `location`, without a size budget
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            max_size: None,
        }
    }

    /// Storage rooted at `location` with a maximum aggregate size in bytes
    pub fn with_max_size(location: impl Into<PathBuf>, max_size: u64) -> Self {
        Self {
            location: location.into(),
            max_size: Some(max_size),
        }
    }

    /// The root directory of this namespace
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Total size of all entries in bytes
    pub fn total_size(&self) -> CacheResult<u64> {
        let mut total = 0;
        for path in self.list()? {
            total += self.size(&path)?;
        }
        Ok(total)
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.location.join(path)
    }

    fn entry_metadata(&self, path: &str) -> CacheResult<Option<fs::Metadata>> {
        match fs::metadata(self.full_path(path)) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(format!("stat {path}"), e)),
        }
    }

    /// Remove least recently used entries until under `target` bytes
    fn remove_least_recently_used(&self, target: u64) -> CacheResult<()> {
        let mut entries = Vec::new();
        for path in self.list()? {
            if let Some(meta) = self.entry_metadata(&path)? {
                let accessed = meta
                    .accessed()
                    .or_else(|_| meta.modified())
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                entries.push((path, accessed, meta.len()));
            }
        }

        for victim in plan_eviction(entries, target) {
            debug!("Evicting cache entry {}", victim);
            match fs::remove_file(self.full_path(&victim)) {
                Ok(()) => {}
                // A concurrent writer may have removed it already
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::io(format!("evicting {victim}"), e)),
            }
        }
        Ok(())
    }
}

impl Default for LocalFileStorage {
    fn default() -> Self {
        Self::new(".cache")
    }
}

impl Storage for LocalFileStorage {
    fn read(&self, path: &str, deadline: Option<DateTime<Utc>>) -> CacheResult<Vec<u8>> {
        let meta = self.entry_metadata(path)?.ok_or_else(|| CacheError::NotFound {
            path: path.to_string(),
        })?;

        if let Some(deadline) = deadline {
            let modified = meta
                .modified()
                .map_err(|e| CacheError::io(format!("mtime of {path}"), e))?;
            if DateTime::<Utc>::from(modified) < deadline {
                debug!("Cache entry {} expired", path);
                return Err(CacheError::Expired {
                    path: path.to_string(),
                });
            }
        }

        match fs::read(self.full_path(path)) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CacheError::NotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(CacheError::io(format!("reading entry {path}"), e)),
        }
    }

    fn write(&self, path: &str, data: &[u8]) -> CacheResult<()> {
        fs::create_dir_all(&self.location)
            .map_err(|e| CacheError::io("creating cache directory", e))?;

        if let Some(max_size) = self.max_size {
            if self.total_size()? + data.len() as u64 > max_size {
                self.remove_least_recently_used(max_size)?;
            }
        }

        fs::write(self.full_path(path), data)
            .map_err(|e| CacheError::io(format!("writing entry {path}"), e))
    }

    fn delete(&self, path: &str) -> CacheResult<()> {
        match fs::remove_file(self.full_path(path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CacheError::NotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(CacheError::io(format!("deleting entry {path}"), e)),
        }
    }

    fn clear(&self) -> CacheResult<()> {
        match fs::remove_dir_all(&self.location) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io("clearing cache directory", e)),
        }
    }

    fn mtime(&self, path: &str) -> CacheResult<Option<DateTime<Utc>>> {
        Ok(self
            .entry_metadata(path)?
            .and_then(|meta| meta.modified().ok())
            .map(DateTime::<Utc>::from))
    }

    fn atime(&self, path: &str) -> CacheResult<Option<DateTime<Utc>>> {
        Ok(self
            .entry_metadata(path)?
            .and_then(|meta| meta.accessed().or_else(|_| meta.modified()).ok())
            .map(DateTime::<Utc>::from))
    }

    fn size(&self, path: &str) -> CacheResult<u64> {
        Ok(self.entry_metadata(path)?.map_or(0, |meta| meta.len()))
    }

    fn list(&self) -> CacheResult<Vec<String>> {
        let dir = match fs::read_dir(&self.location) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io("listing cache directory", e)),
        };

        let mut paths = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| CacheError::io("listing cache directory", e))?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                paths.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        paths.sort();
        Ok(paths)
    }
}
