use super::{ClasspathEntry, ClasspathError};
use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

const FINGERPRINT_VERSION: u32 = 2;

/// Snapshot of the class-bearing files a classpath can serve, in classpath
/// order.
///
/// Archives are stamped by size and modification time. Directories and
/// runtime images are stamped by a digest over the relative path, size and
/// modification time of every `.class` (and, for images, `.jmod`) file below
/// them, so sources and resources next to the classes do not count.
///
/// Callers that do not track their own build fingerprint can use
/// [`ClasspathFingerprint::digest_hex`] as the symbol-table fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClasspathFingerprint {
    version: u32,
    entries: Vec<EntryStamp>,
}

impl ClasspathFingerprint {
    pub fn capture(entries: &[ClasspathEntry]) -> Result<Self, ClasspathError> {
        let entries = entries
            .iter()
            .map(EntryStamp::capture)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            version: FINGERPRINT_VERSION,
            entries,
        })
    }

    pub fn digest_hex(&self) -> Result<String, ClasspathError> {
        let encoded = bincode::serialize(self)?;
        Ok(blake3::hash(&encoded).to_hex().to_string())
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Class-bearing files seen below directory and runtime-image entries.
    pub fn class_file_count(&self) -> u64 {
        self.entries
            .iter()
            .map(|stamp| match stamp.state {
                EntryState::Tree { files, .. } => files,
                EntryState::Absent | EntryState::Archive(_) => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct EntryStamp {
    entry: ClasspathEntry,
    state: EntryState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
enum EntryState {
    Absent,
    Archive(FileStamp),
    Tree { files: u64, digest: [u8; 32] },
}

impl EntryStamp {
    fn capture(entry: &ClasspathEntry) -> Result<Self, ClasspathError> {
        let root = entry.path();
        let state = if !root.exists() {
            EntryState::Absent
        } else if root.is_file() {
            EntryState::Archive(FileStamp::of(root)?)
        } else {
            let extensions: &[&str] = match entry {
                ClasspathEntry::RuntimeImage(_) => &["class", "jmod"],
                ClasspathEntry::Directory(_) | ClasspathEntry::Jar(_) => &["class"],
            };
            digest_tree(root, extensions)?
        };
        Ok(Self {
            entry: entry.clone(),
            state,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    /// Seconds and subsecond nanoseconds since the epoch.
    modified: Option<(u64, u32)>,
}

impl FileStamp {
    fn of(path: &Path) -> Result<Self, ClasspathError> {
        let metadata = fs::metadata(path).map_err(|source| ClasspathError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| (elapsed.as_secs(), elapsed.subsec_nanos()));
        Ok(Self {
            len: metadata.len(),
            modified,
        })
    }

    fn feed(&self, hasher: &mut Hasher) {
        hasher.update(&self.len.to_le_bytes());
        if let Some((secs, nanos)) = self.modified {
            hasher.update(&secs.to_le_bytes());
            hasher.update(&nanos.to_le_bytes());
        }
    }
}

fn digest_tree(root: &Path, extensions: &[&str]) -> Result<EntryState, ClasspathError> {
    let mut files: Vec<(String, FileStamp)> = Vec::new();
    let mut dirs = vec![root.to_path_buf()];

    while let Some(dir) = dirs.pop() {
        let listing = fs::read_dir(&dir).map_err(|source| ClasspathError::Io {
            path: dir.clone(),
            source,
        })?;
        for item in listing {
            let item = item.map_err(|source| ClasspathError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = item.path();
            if path.is_dir() {
                dirs.push(path);
                continue;
            }
            let extension = path.extension().and_then(OsStr::to_str);
            if !extension.is_some_and(|ext| extensions.contains(&ext)) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            files.push((relative, FileStamp::of(&path)?));
        }
    }

    // read_dir order is platform dependent.
    files.sort_by(|left, right| left.0.cmp(&right.0));

    let mut hasher = Hasher::new();
    for (relative, stamp) in &files {
        hasher.update(relative.as_bytes());
        hasher.update(&[0]);
        stamp.feed(&mut hasher);
    }
    Ok(EntryState::Tree {
        files: files.len() as u64,
        digest: *hasher.finalize().as_bytes(),
    })
}
