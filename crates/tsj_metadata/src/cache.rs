//! Persistent descriptor cache.
//!
//! The symbol table keeps every resolution in memory. A
//! [`DescriptorCacheStore`] only moves whole snapshots ([`CacheEnvelope`])
//! in and out of durable storage: one load when a table is opened and one
//! store per checkpoint.

use crate::symbol_table::ClassResolution;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub const DEFAULT_SCHEMA_ID: &str = "tsj-descriptor-cache";
pub const DEFAULT_SCHEMA_VERSION: &str = "1";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache encoding error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("cache schema mismatch (expected {expected}, found {found})")]
    SchemaMismatch { expected: String, found: String },
    #[error("cache fingerprint mismatch (expected {expected}, found {found})")]
    FingerprintMismatch { expected: String, found: String },
    #[error("cache target release mismatch (expected {expected}, found {found})")]
    TargetReleaseMismatch { expected: u32, found: u32 },
    #[error("in-memory cache store poisoned")]
    Poisoned,
}

/// Identity a persisted snapshot must match to be reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
    pub schema_id: String,
    pub schema_version: String,
    pub fingerprint: String,
    pub target_release: u32,
}

impl CacheKey {
    fn schema(&self) -> String {
        format!("{}@{}", self.schema_id, self.schema_version)
    }
}

/// One cached lookup, positive or negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResolution {
    pub internal_name: String,
    pub resolution: ClassResolution,
}

/// A complete persisted snapshot of the symbol table cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEnvelope {
    pub key: CacheKey,
    pub entries: Vec<CachedResolution>,
}

impl CacheEnvelope {
    /// Rejects snapshots written under a different schema, fingerprint or
    /// target release.
    pub fn check(&self, expected: &CacheKey) -> Result<(), CacheError> {
        if self.key.schema_id != expected.schema_id
            || self.key.schema_version != expected.schema_version
        {
            return Err(CacheError::SchemaMismatch {
                expected: expected.schema(),
                found: self.key.schema(),
            });
        }
        if self.key.fingerprint != expected.fingerprint {
            return Err(CacheError::FingerprintMismatch {
                expected: expected.fingerprint.clone(),
                found: self.key.fingerprint.clone(),
            });
        }
        if self.key.target_release != expected.target_release {
            return Err(CacheError::TargetReleaseMismatch {
                expected: expected.target_release,
                found: self.key.target_release,
            });
        }
        Ok(())
    }
}

/// Durable storage for cache snapshots.
pub trait DescriptorCacheStore {
    /// Returns the stored snapshot, or `None` when nothing was stored yet.
    fn load(&mut self) -> Result<Option<CacheEnvelope>, CacheError>;

    fn store(&mut self, envelope: &CacheEnvelope) -> Result<(), CacheError>;

    /// Discards the stored snapshot.
    fn invalidate(&mut self) -> Result<(), CacheError>;
}

/// Snapshot stored as a bincode file.
#[derive(Debug, Clone)]
pub struct FileDescriptorCache {
    path: PathBuf,
}

impl FileDescriptorCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<root>/descriptor-cache-<key>.bin`.
    pub fn in_directory(root: &Path, key: &str) -> Self {
        Self::new(root.join(format!("descriptor-cache-{key}.bin")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DescriptorCacheStore for FileDescriptorCache {
    fn load(&mut self) -> Result<Option<CacheEnvelope>, CacheError> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let mut bytes = Vec::new();
        BufReader::new(File::open(&self.path)?).read_to_end(&mut bytes)?;
        // Slice decoding bounds every length prefix by the bytes actually read.
        let envelope: CacheEnvelope = bincode::deserialize(&bytes)?;
        Ok(Some(envelope))
    }

    fn store(&mut self, envelope: &CacheEnvelope) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.path)?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, envelope)?;
        writer.flush()?;
        Ok(())
    }

    fn invalidate(&mut self) -> Result<(), CacheError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// Process-local store. Clones share the same slot, so a snapshot stored by
/// one symbol table is visible to the next one opened with a clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryDescriptorCache {
    slot: Arc<Mutex<Option<CacheEnvelope>>>,
}

impl MemoryDescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<CacheEnvelope> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }

    /// Replaces the stored snapshot, e.g. to seed a table under test.
    pub fn replace(&self, envelope: Option<CacheEnvelope>) -> Result<(), CacheError> {
        let mut slot = self.slot.lock().map_err(|_| CacheError::Poisoned)?;
        *slot = envelope;
        Ok(())
    }
}

impl DescriptorCacheStore for MemoryDescriptorCache {
    fn load(&mut self) -> Result<Option<CacheEnvelope>, CacheError> {
        let slot = self.slot.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(slot.clone())
    }

    fn store(&mut self, envelope: &CacheEnvelope) -> Result<(), CacheError> {
        self.replace(Some(envelope.clone()))
    }

    fn invalidate(&mut self) -> Result<(), CacheError> {
        self.replace(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol_table::ClassResolution;
    use tempfile::tempdir;

    fn key() -> CacheKey {
        CacheKey {
            schema_id: DEFAULT_SCHEMA_ID.into(),
            schema_version: DEFAULT_SCHEMA_VERSION.into(),
            fingerprint: "abc".into(),
            target_release: 21,
        }
    }

    fn envelope() -> CacheEnvelope {
        CacheEnvelope {
            key: key(),
            entries: vec![CachedResolution {
                internal_name: "a/Missing".into(),
                resolution: ClassResolution::not_found("a/Missing"),
            }],
        }
    }

    #[test]
    fn file_store_round_trip_and_invalidate() {
        let dir = tempdir().unwrap();
        let mut store = FileDescriptorCache::in_directory(dir.path(), "k1");
        assert!(store.load().unwrap().is_none());

        store.store(&envelope()).unwrap();
        assert_eq!(store.load().unwrap(), Some(envelope()));

        store.invalidate().unwrap();
        assert!(!store.path().exists());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_an_encoding_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.bin");
        fs::write(&path, b"garbage").unwrap();
        let mut store = FileDescriptorCache::new(&path);
        assert!(matches!(store.load(), Err(CacheError::Encode(_))));
    }

    #[test]
    fn memory_store_clones_share_snapshot() {
        let first = MemoryDescriptorCache::new();
        let mut second = first.clone();
        second.store(&envelope()).unwrap();
        assert_eq!(first.snapshot(), Some(envelope()));
    }

    #[test]
    fn check_reports_first_mismatch() {
        let stored = envelope();
        assert!(stored.check(&key()).is_ok());

        let mut other = key();
        other.schema_version = "2".into();
        other.fingerprint = "def".into();
        assert!(matches!(
            stored.check(&other),
            Err(CacheError::SchemaMismatch { .. })
        ));

        let mut other = key();
        other.target_release = 17;
        assert!(matches!(
            stored.check(&other),
            Err(CacheError::TargetReleaseMismatch {
                expected: 17,
                found: 21
            })
        ));
    }
}
