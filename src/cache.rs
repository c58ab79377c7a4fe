use crate::errors::{ImportError, ImportResult};
use bytes::Bytes;
use dashmap::DashMap;
use std::path::{Path, PathBuf};

/// Canonical absolute path, lower-cased where filesystems usually ignore case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(PathBuf);

impl CacheKey {
    pub fn new(canonical: &Path) -> Self {
        if cfg!(any(windows, target_os = "macos")) {
            Self(PathBuf::from(canonical.to_string_lossy().to_lowercase()))
        } else {
            Self(canonical.to_path_buf())
        }
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub enum EntryState {
    Found { content: Bytes, found_at: PathBuf },
    NotFound,
    /// Failure other than absence; replayed on every later lookup.
    Sticky(ImportError),
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    key: CacheKey,
    state: EntryState,
}

impl CacheEntry {
    pub fn new(key: CacheKey, state: EntryState) -> Self {
        Self { key, state }
    }
}

#[derive(Debug, Clone)]
pub enum Lookup {
    Miss,
    Hit(EntryState),
}

/// Write-once memo table shared by every resolution of one importer.
#[derive(Debug, Default)]
pub struct ImportCache {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl ImportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &CacheKey) -> ImportResult<Lookup> {
        match self.entries.get(key) {
            Some(entry) => Ok(Lookup::Hit(checked(key, entry.value())?.clone())),
            None => Ok(Lookup::Miss),
        }
    }

    /// First writer wins; returns whatever is authoritative for `key` afterwards.
    pub fn store(&self, entry: CacheEntry) -> ImportResult<EntryState> {
        let key = entry.key.clone();
        let stored = self.entries.entry(key.clone()).or_insert(entry);
        Ok(checked(&key, stored.value())?.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&self, slot: CacheKey, entry: CacheEntry) {
        self.entries.insert(slot, entry);
    }
}

// An entry filed under another key is corruption, never a usable answer.
fn checked<'a>(key: &CacheKey, entry: &'a CacheEntry) -> ImportResult<&'a EntryState> {
    if entry.key != *key {
        return Err(ImportError::CacheInternalType { key: key.as_path().to_path_buf() });
    }
    Ok(&entry.state)
}
