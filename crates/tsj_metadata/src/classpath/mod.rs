//! Classpath entries and class-byte lookup.
//!
//! A classpath is an ordered list of [`ClasspathEntry`] values. Lookups go
//! through [`ClasspathScanner`], which indexes each jar and runtime image the
//! first time it is touched and keeps those indexes until the classpath
//! changes. Jar lookups honour multi-release manifests for the requested
//! target release.

mod fingerprint;
mod jar;
mod manifest;
mod runtime_image;

pub use fingerprint::ClasspathFingerprint;
pub use jar::automatic_module_name;
pub use manifest::Manifest;

pub(crate) use jar::{JarIndex, JarSelection};
pub(crate) use runtime_image::{scan_exploded, RuntimeImage};

use crate::classfile::{read_class, ClassfileError, ModuleAttribute};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use zip::result::ZipError;

#[derive(Debug, Error)]
pub enum ClasspathError {
    #[error("IO error while reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("ZIP error while reading {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: ZipError,
    },
    #[error("class parse error in {location}: {source}")]
    ClassFile {
        location: String,
        #[source]
        source: ClassfileError,
    },
    #[error("fingerprint encoding error: {0}")]
    Encode(#[from] bincode::Error),
}

/// One element of the lookup path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClasspathEntry {
    Directory(PathBuf),
    /// A jar or zip archive; multi-release handling follows its manifest.
    Jar(PathBuf),
    /// Exploded `modules/<module>/…` tree or a directory of `.jmod` files.
    RuntimeImage(PathBuf),
}

impl ClasspathEntry {
    /// Archives by extension (`.jar`, `.zip`), everything else as a directory.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if is_archive(&path) {
            ClasspathEntry::Jar(path)
        } else {
            ClasspathEntry::Directory(path)
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ClasspathEntry::Directory(path)
            | ClasspathEntry::Jar(path)
            | ClasspathEntry::RuntimeImage(path) => path,
        }
    }
}

/// Where a class was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClasspathOrigin {
    pub entry: PathBuf,
    /// Concrete entry name inside the classpath element, e.g.
    /// `META-INF/versions/17/pkg/Name.class`.
    pub entry_name: String,
    pub versioned: bool,
    pub selected_version: Option<u32>,
    pub module_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EntryLookup {
    Found {
        bytes: Vec<u8>,
        origin: ClasspathOrigin,
    },
    Absent,
    TargetMismatch {
        lowest_version: u32,
    },
}

/// Caches per-entry indexes across lookups.
#[derive(Debug, Default)]
pub(crate) struct ClasspathScanner {
    jars: FxHashMap<PathBuf, JarIndex>,
    images: FxHashMap<PathBuf, RuntimeImage>,
    directory_modules: FxHashMap<PathBuf, Option<ModuleAttribute>>,
}

impl ClasspathScanner {
    pub(crate) fn clear(&mut self) {
        self.jars.clear();
        self.images.clear();
        self.directory_modules.clear();
    }

    /// Looks up `class_entry` (`pkg/Name.class`) in one classpath element.
    pub(crate) fn locate(
        &mut self,
        entry: &ClasspathEntry,
        class_entry: &str,
        target_release: u32,
    ) -> Result<EntryLookup, ClasspathError> {
        if !entry.path().exists() {
            return Ok(EntryLookup::Absent);
        }

        match entry {
            ClasspathEntry::Directory(dir) => {
                let path = dir.join(class_entry);
                if !path.is_file() {
                    return Ok(EntryLookup::Absent);
                }
                let bytes = fs::read(&path).map_err(|source| ClasspathError::Io {
                    path: path.clone(),
                    source,
                })?;
                let module_name = self.directory_module(dir)?.map(|module| module.name.clone());
                Ok(EntryLookup::Found {
                    bytes,
                    origin: ClasspathOrigin {
                        entry: dir.clone(),
                        entry_name: class_entry.to_string(),
                        versioned: false,
                        selected_version: None,
                        module_name,
                    },
                })
            }
            ClasspathEntry::Jar(path) => {
                let jar = self.jar(path)?;
                match jar.select(class_entry, target_release) {
                    JarSelection::Found {
                        entry_name,
                        version,
                    } => {
                        debug!(
                            jar = %path.display(),
                            entry = %entry_name,
                            version = ?version,
                            target_release,
                            "selected jar entry"
                        );
                        let bytes = jar.read(&entry_name)?;
                        Ok(EntryLookup::Found {
                            bytes,
                            origin: ClasspathOrigin {
                                entry: path.clone(),
                                entry_name,
                                versioned: version.is_some(),
                                selected_version: version,
                                module_name: Some(jar.module_name()),
                            },
                        })
                    }
                    JarSelection::TargetMismatch { lowest_version } => {
                        Ok(EntryLookup::TargetMismatch { lowest_version })
                    }
                    JarSelection::Absent => Ok(EntryLookup::Absent),
                }
            }
            ClasspathEntry::RuntimeImage(root) => {
                let image = self.runtime_image(root)?;
                Ok(match image.find(class_entry)? {
                    Some((bytes, origin)) => EntryLookup::Found { bytes, origin },
                    None => EntryLookup::Absent,
                })
            }
        }
    }

    pub(crate) fn jar(&mut self, path: &Path) -> Result<&mut JarIndex, ClasspathError> {
        match self.jars.entry(path.to_path_buf()) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => Ok(slot.insert(JarIndex::open(path)?)),
        }
    }

    pub(crate) fn runtime_image(&mut self, root: &Path) -> Result<&RuntimeImage, ClasspathError> {
        match self.images.entry(root.to_path_buf()) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => Ok(slot.insert(RuntimeImage::open(root)?)),
        }
    }

    /// Module declared by `<dir>/module-info.class`, if any.
    pub(crate) fn directory_module(
        &mut self,
        dir: &Path,
    ) -> Result<Option<&ModuleAttribute>, ClasspathError> {
        if !self.directory_modules.contains_key(dir) {
            let path = dir.join("module-info.class");
            let module = if path.is_file() {
                let bytes = fs::read(&path).map_err(|source| ClasspathError::Io {
                    path: path.clone(),
                    source,
                })?;
                read_class(&bytes)
                    .map_err(|source| ClasspathError::ClassFile {
                        location: path.display().to_string(),
                        source,
                    })?
                    .module
            } else {
                None
            };
            self.directory_modules.insert(dir.to_path_buf(), module);
        }
        Ok(self.directory_modules.get(dir).and_then(Option::as_ref))
    }
}

/// Splits raw classpath strings on the platform separator and drops blanks.
pub fn expand_classpath(raw: &[String]) -> Vec<ClasspathEntry> {
    let separator = if cfg!(windows) { ';' } else { ':' };
    raw.iter()
        .flat_map(|entry| entry.split(separator))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(ClasspathEntry::from_path)
        .collect()
}

/// Package (internal form) of an entry name such as `java/util/Map.class`.
pub(crate) fn package_of_entry(entry_name: &str) -> &str {
    entry_name
        .rsplit_once('/')
        .map(|(package, _)| package)
        .unwrap_or("")
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| ext.eq_ignore_ascii_case("jar") || ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}
