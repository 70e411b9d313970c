//! Classpath symbol table.
//!
//! Resolves class names to parsed [`ClassDescriptor`]s by walking the
//! configured classpath in order. Every lookup result, including negative
//! ones, is cached under `(fingerprint, internal name)` so each class is
//! parsed at most once per fingerprint. An optional
//! [`DescriptorCacheStore`] carries the cache across sessions.

use crate::cache::{
    CacheEnvelope, CacheError, CacheKey, CachedResolution, DescriptorCacheStore,
    FileDescriptorCache, DEFAULT_SCHEMA_ID, DEFAULT_SCHEMA_VERSION,
};
use crate::classfile::{read_class, ClassDescriptor, ClassfileError};
use crate::classpath::{
    expand_classpath, ClasspathEntry, ClasspathError, ClasspathFingerprint, ClasspathOrigin,
    ClasspathScanner, EntryLookup,
};
use crate::config::ResolverConfig;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Lowest release the table resolves against; smaller values are clamped.
pub const MIN_TARGET_RELEASE: u32 = 8;
const NO_FINGERPRINT: &str = "no-fingerprint";

#[derive(Debug, Error)]
pub enum SymbolTableError {
    #[error("malformed class file {location}: {source}")]
    Malformed {
        location: String,
        #[source]
        source: ClassfileError,
    },
    #[error(transparent)]
    Classpath(#[from] ClasspathError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl SymbolTableError {
    /// Stable diagnostic code when the failure comes from a broken classfile.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            SymbolTableError::Malformed { source, .. }
            | SymbolTableError::Classpath(ClasspathError::ClassFile { source, .. }) => {
                Some(source.code())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionStatus {
    Found,
    ClassNotFound,
    TargetLevelMismatch,
}

/// Outcome of one class lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassResolution {
    pub internal_name: String,
    pub status: ResolutionStatus,
    pub descriptor: Option<Arc<ClassDescriptor>>,
    pub origin: Option<ClasspathOrigin>,
    pub diagnostic: Option<String>,
}

impl ClassResolution {
    pub fn found(descriptor: ClassDescriptor, origin: ClasspathOrigin) -> Self {
        Self {
            internal_name: descriptor.internal_name.clone(),
            status: ResolutionStatus::Found,
            descriptor: Some(Arc::new(descriptor)),
            origin: Some(origin),
            diagnostic: None,
        }
    }

    pub fn not_found(internal_name: impl Into<String>) -> Self {
        Self {
            internal_name: internal_name.into(),
            status: ResolutionStatus::ClassNotFound,
            descriptor: None,
            origin: None,
            diagnostic: Some("class-not-found".to_string()),
        }
    }

    pub fn target_level_mismatch(internal_name: impl Into<String>, version: Option<u32>) -> Self {
        let diagnostic = match version {
            Some(version) => format!("target-level-mismatch: requires class version {version}"),
            None => "target-level-mismatch".to_string(),
        };
        Self {
            internal_name: internal_name.into(),
            status: ResolutionStatus::TargetLevelMismatch,
            descriptor: None,
            origin: None,
            diagnostic: Some(diagnostic),
        }
    }

    fn unreadable(internal_name: impl Into<String>, error: &SymbolTableError) -> Self {
        let diagnostic = match error.code() {
            Some(code) => format!("{code}: {error}"),
            None => error.to_string(),
        };
        Self {
            internal_name: internal_name.into(),
            status: ResolutionStatus::ClassNotFound,
            descriptor: None,
            origin: None,
            diagnostic: Some(diagnostic),
        }
    }

    pub fn is_found(&self) -> bool {
        self.status == ResolutionStatus::Found
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

pub struct SymbolTable {
    classpath: Vec<ClasspathEntry>,
    fingerprint: String,
    target_release: u32,
    scanner: ClasspathScanner,
    resolutions: IndexMap<String, ClassResolution>,
    parse_counts: FxHashMap<String, u32>,
    stats: CacheStats,
    diagnostics: Vec<String>,
    store: Option<Box<dyn DescriptorCacheStore>>,
    schema_id: String,
    schema_version: String,
    dirty: bool,
}

impl SymbolTable {
    pub fn new(classpath: Vec<ClasspathEntry>, fingerprint: &str, target_release: u32) -> Self {
        Self {
            classpath,
            fingerprint: normalize_fingerprint(fingerprint),
            target_release: normalize_target_release(target_release),
            scanner: ClasspathScanner::default(),
            resolutions: IndexMap::new(),
            parse_counts: FxHashMap::default(),
            stats: CacheStats::default(),
            diagnostics: Vec::new(),
            store: None,
            schema_id: DEFAULT_SCHEMA_ID.to_string(),
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            dirty: false,
        }
    }

    /// Attaches a persistent store and loads its snapshot. Blank schema
    /// identifiers fall back to the defaults.
    pub fn with_cache_store(
        mut self,
        store: Box<dyn DescriptorCacheStore>,
        schema_id: &str,
        schema_version: &str,
    ) -> Self {
        self.schema_id = normalize_version(schema_id, DEFAULT_SCHEMA_ID);
        self.schema_version = normalize_version(schema_version, DEFAULT_SCHEMA_VERSION);
        self.store = Some(store);
        self.load_persisted();
        self
    }

    /// Builds a table from configuration. The runtime image, when set, is
    /// searched before the classpath. Without a configured fingerprint one is
    /// captured from the entries on disk.
    pub fn from_config(config: &ResolverConfig) -> Result<Self, SymbolTableError> {
        let mut classpath = Vec::new();
        if let Some(image) = &config.runtime_image {
            classpath.push(ClasspathEntry::RuntimeImage(image.clone()));
        }
        classpath.extend(expand_classpath(&config.classpath));

        let fingerprint = match &config.fingerprint {
            Some(fingerprint) => fingerprint.clone(),
            None => ClasspathFingerprint::capture(&classpath)?.digest_hex()?,
        };

        let table = Self::new(classpath, &fingerprint, config.target_release);
        Ok(match &config.cache_file {
            Some(path) => table.with_cache_store(
                Box::new(FileDescriptorCache::new(path.clone())),
                &config.schema_id,
                &config.schema_version,
            ),
            None => table,
        })
    }

    pub fn resolve_class(&mut self, name: &str) -> Option<Arc<ClassDescriptor>> {
        self.resolve_class_with_metadata(name).descriptor
    }

    /// Like [`SymbolTable::try_resolve_class_with_metadata`], but reports an
    /// unreadable class as not found.
    pub fn resolve_class_with_metadata(&mut self, name: &str) -> ClassResolution {
        match self.try_resolve_class_with_metadata(name) {
            Ok(resolution) => resolution,
            Err(error) => {
                let internal_name = normalize_class_name(name);
                warn!(class = %internal_name, error = %error, "unreadable class on classpath");
                ClassResolution::unreadable(internal_name, &error)
            }
        }
    }

    /// Resolves `name` (dotted or internal form). Malformed classfiles and
    /// unreadable classpath entries are errors and are not cached.
    pub fn try_resolve_class_with_metadata(
        &mut self,
        name: &str,
    ) -> Result<ClassResolution, SymbolTableError> {
        let internal_name = normalize_class_name(name);
        let key = cache_key(&internal_name, &self.fingerprint);
        if let Some(cached) = self.resolutions.get(&key) {
            self.stats.hits += 1;
            debug!(class = %internal_name, status = ?cached.status, "descriptor cache hit");
            return Ok(cached.clone());
        }

        self.stats.misses += 1;
        debug!(class = %internal_name, fingerprint = %self.fingerprint, "descriptor cache miss");
        let resolution = self.parse_class_descriptor(&internal_name)?;
        if resolution.is_found() {
            *self.parse_counts.entry(internal_name).or_insert(0) += 1;
        }
        self.resolutions.insert(key, resolution.clone());
        self.dirty = true;
        Ok(resolution)
    }

    fn parse_class_descriptor(
        &mut self,
        internal_name: &str,
    ) -> Result<ClassResolution, SymbolTableError> {
        let class_entry = format!("{internal_name}.class");
        let mut saw_mismatch = false;
        let mut lowest_version: Option<u32> = None;

        for entry in &self.classpath {
            match self
                .scanner
                .locate(entry, &class_entry, self.target_release)?
            {
                EntryLookup::Found { bytes, origin } => {
                    let descriptor =
                        read_class(&bytes).map_err(|source| SymbolTableError::Malformed {
                            location: format!("{}!/{}", origin.entry.display(), origin.entry_name),
                            source,
                        })?;
                    return Ok(ClassResolution::found(descriptor, origin));
                }
                EntryLookup::TargetMismatch { lowest_version: version } => {
                    saw_mismatch = true;
                    lowest_version = Some(lowest_version.map_or(version, |low| low.min(version)));
                }
                EntryLookup::Absent => {}
            }
        }

        if saw_mismatch {
            return Ok(ClassResolution::target_level_mismatch(
                internal_name,
                lowest_version,
            ));
        }
        Ok(ClassResolution::not_found(internal_name))
    }

    /// Replaces the classpath. A changed fingerprint drops every cached
    /// resolution and counts one invalidation.
    pub fn update_classpath(&mut self, classpath: Vec<ClasspathEntry>, fingerprint: &str) {
        let fingerprint = normalize_fingerprint(fingerprint);
        self.classpath = classpath;
        self.scanner.clear();
        if self.fingerprint != fingerprint {
            warn!(
                previous = %self.fingerprint,
                current = %fingerprint,
                dropped = self.resolutions.len(),
                "classpath fingerprint changed; invalidating descriptor cache"
            );
            self.invalidate_memory();
        }
        self.fingerprint = fingerprint;
    }

    pub fn set_target_release(&mut self, target_release: u32) {
        let target_release = normalize_target_release(target_release);
        if self.target_release != target_release {
            warn!(
                previous = self.target_release,
                current = target_release,
                "target release changed; invalidating descriptor cache"
            );
            self.invalidate_memory();
        }
        self.target_release = target_release;
    }

    fn invalidate_memory(&mut self) {
        self.resolutions.clear();
        self.stats.invalidations += 1;
        self.dirty = true;
    }

    /// Stores the current cache through the attached store, if any.
    pub fn checkpoint(&mut self) -> Result<(), SymbolTableError> {
        let envelope = self.snapshot();
        let Some(store) = self.store.as_mut() else {
            return Ok(());
        };
        if let Err(error) = store.store(&envelope) {
            self.diagnostics
                .push(format!("Persistent descriptor cache write failed: {error}"));
            return Err(error.into());
        }
        debug!(entries = envelope.entries.len(), "descriptor cache checkpointed");
        self.dirty = false;
        Ok(())
    }

    fn snapshot(&self) -> CacheEnvelope {
        CacheEnvelope {
            key: self.cache_key(),
            entries: self
                .resolutions
                .values()
                .map(|resolution| CachedResolution {
                    internal_name: resolution.internal_name.clone(),
                    resolution: resolution.clone(),
                })
                .collect(),
        }
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey {
            schema_id: self.schema_id.clone(),
            schema_version: self.schema_version.clone(),
            fingerprint: self.fingerprint.clone(),
            target_release: self.target_release,
        }
    }

    fn load_persisted(&mut self) {
        let expected = self.cache_key();
        let Some(store) = self.store.as_mut() else {
            return;
        };

        match store.load() {
            Ok(None) => {}
            Ok(Some(envelope)) => match envelope.check(&expected) {
                Ok(()) => {
                    debug!(entries = envelope.entries.len(), "loaded persistent descriptor cache");
                    for cached in envelope.entries {
                        let key = cache_key(&cached.internal_name, &self.fingerprint);
                        self.resolutions.insert(key, cached.resolution);
                    }
                }
                Err(error) => {
                    warn!(error = %error, "persistent descriptor cache invalidated");
                    self.stats.invalidations += 1;
                    self.diagnostics
                        .push(format!("Persistent descriptor cache invalidated: {error}."));
                    if let Err(error) = store.invalidate() {
                        self.diagnostics
                            .push(format!("Persistent descriptor cache cleanup failed: {error}"));
                    }
                }
            },
            Err(error) => {
                warn!(error = %error, "persistent descriptor cache unreadable");
                self.stats.invalidations += 1;
                self.diagnostics
                    .push(format!("Persistent descriptor cache could not be loaded: {error}"));
            }
        }
    }

    pub fn classpath(&self) -> &[ClasspathEntry] {
        &self.classpath
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn target_release(&self) -> u32 {
        self.target_release
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.stats
    }

    /// Number of times `name` was actually parsed.
    pub fn parse_count(&self, name: &str) -> u32 {
        self.parse_counts
            .get(&normalize_class_name(name))
            .copied()
            .unwrap_or(0)
    }

    pub fn cache_len(&self) -> usize {
        self.resolutions.len()
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }
}

impl Drop for SymbolTable {
    fn drop(&mut self) {
        if self.dirty && self.store.is_some() {
            if let Err(error) = self.checkpoint() {
                warn!(error = %error, "descriptor cache store on drop failed");
            }
        }
    }
}

/// `java.util.Map` and `java/util/Map` both become `java/util/Map`.
pub fn normalize_class_name(name: &str) -> String {
    name.trim().replace('.', "/")
}

fn normalize_fingerprint(fingerprint: &str) -> String {
    let trimmed = fingerprint.trim();
    if trimmed.is_empty() {
        NO_FINGERPRINT.to_string()
    } else {
        trimmed.to_lowercase()
    }
}

fn normalize_target_release(target_release: u32) -> u32 {
    target_release.max(MIN_TARGET_RELEASE)
}

fn normalize_version(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

fn cache_key(internal_name: &str, fingerprint: &str) -> String {
    format!("{internal_name}@{fingerprint}")
}
