use super::manifest::Manifest;
use super::{package_of_entry, ClasspathError};
use crate::classfile::{read_class, ModuleAttribute};
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

const MANIFEST_ENTRY: &str = "META-INF/MANIFEST.MF";
const VERSIONS_PREFIX: &str = "META-INF/versions/";
const MODULE_INFO: &str = "module-info.class";
const FIRST_VERSIONED_RELEASE: u32 = 9;

/// Outcome of choosing the entry that represents one class inside a jar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JarSelection {
    Found {
        entry_name: String,
        version: Option<u32>,
    },
    Absent,
    /// Only versioned slots above the target release contain the class.
    TargetMismatch { lowest_version: u32 },
}

/// Entry-name index of one jar, built once and reused for every lookup. The
/// archive stays open so reads skip the central directory.
#[derive(Debug)]
pub(crate) struct JarIndex {
    path: PathBuf,
    archive: ZipArchive<BufReader<File>>,
    names: FxHashSet<String>,
    manifest: Manifest,
    module: Option<ModuleAttribute>,
}

impl JarIndex {
    pub(crate) fn open(path: &Path) -> Result<Self, ClasspathError> {
        let mut archive = open_archive(path)?;
        let mut names = FxHashSet::default();
        for idx in 0..archive.len() {
            let entry = archive.by_index(idx).map_err(|source| ClasspathError::Zip {
                path: path.to_path_buf(),
                source,
            })?;
            if entry.is_file() {
                names.insert(entry.name().to_string());
            }
        }

        let manifest = if names.contains(MANIFEST_ENTRY) {
            let bytes = read_archive_entry(&mut archive, path, MANIFEST_ENTRY)?;
            Manifest::parse(&String::from_utf8_lossy(&bytes))
        } else {
            Manifest::default()
        };

        let module = if names.contains(MODULE_INFO) {
            let bytes = read_archive_entry(&mut archive, path, MODULE_INFO)?;
            let descriptor = read_class(&bytes).map_err(|source| ClasspathError::ClassFile {
                location: format!("{}!/{MODULE_INFO}", path.display()),
                source,
            })?;
            descriptor.module
        } else {
            None
        };

        debug!(
            jar = %path.display(),
            entries = names.len(),
            multi_release = manifest.is_multi_release(),
            explicit_module = module.is_some(),
            "indexed jar"
        );

        Ok(Self {
            path: path.to_path_buf(),
            archive,
            names,
            manifest,
            module,
        })
    }

    pub(crate) fn is_multi_release(&self) -> bool {
        self.manifest.is_multi_release()
    }

    pub(crate) fn module_descriptor(&self) -> Option<&ModuleAttribute> {
        self.module.as_ref()
    }

    /// Explicit module name, else the automatic module name.
    pub(crate) fn module_name(&self) -> String {
        match &self.module {
            Some(module) => module.name.clone(),
            None => automatic_module_name(&self.path, &self.manifest),
        }
    }

    /// Packages (internal form) holding at least one class outside `META-INF`.
    pub(crate) fn packages(&self) -> BTreeSet<String> {
        self.names
            .iter()
            .filter(|name| name.ends_with(".class") && !name.starts_with("META-INF/"))
            .filter(|name| name.as_str() != MODULE_INFO)
            .map(|name| package_of_entry(name).to_string())
            .filter(|package| !package.is_empty())
            .collect()
    }

    /// Picks the entry for `class_entry` (e.g. `pkg/Name.class`) as seen by a
    /// runtime of `target_release`.
    pub(crate) fn select(&self, class_entry: &str, target_release: u32) -> JarSelection {
        if self.is_multi_release() {
            for version in (FIRST_VERSIONED_RELEASE..=target_release).rev() {
                let candidate = format!("{VERSIONS_PREFIX}{version}/{class_entry}");
                if self.names.contains(&candidate) {
                    return JarSelection::Found {
                        entry_name: candidate,
                        version: Some(version),
                    };
                }
            }
        }

        if self.names.contains(class_entry) {
            return JarSelection::Found {
                entry_name: class_entry.to_string(),
                version: None,
            };
        }

        if self.is_multi_release() {
            if let Some(lowest_version) = self.lowest_versioned_slot(class_entry, target_release) {
                return JarSelection::TargetMismatch { lowest_version };
            }
        }

        JarSelection::Absent
    }

    fn lowest_versioned_slot(&self, class_entry: &str, target_release: u32) -> Option<u32> {
        self.names
            .iter()
            .filter_map(|name| {
                let rest = name.strip_prefix(VERSIONS_PREFIX)?;
                let (version, entry) = rest.split_once('/')?;
                if entry != class_entry {
                    return None;
                }
                version.parse::<u32>().ok()
            })
            .filter(|version| *version > target_release)
            .min()
    }

    pub(crate) fn read(&mut self, entry_name: &str) -> Result<Vec<u8>, ClasspathError> {
        read_archive_entry(&mut self.archive, &self.path, entry_name)
    }
}

/// Derives the automatic module name of a jar without `module-info.class`.
///
/// `Automatic-Module-Name` wins. Otherwise the file name loses its `.jar`
/// extension and any `-<digit>…` version suffix; every character outside
/// `[A-Za-z0-9.]` becomes `.`, repeated dots collapse and outer dots are
/// trimmed.
pub fn automatic_module_name(path: &Path, manifest: &Manifest) -> String {
    if let Some(name) = manifest.automatic_module_name() {
        return name.to_string();
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name
        .strip_suffix(".jar")
        .or_else(|| file_name.strip_suffix(".JAR"))
        .unwrap_or(&file_name);

    let bytes = stem.as_bytes();
    let cut = (0..bytes.len().saturating_sub(1))
        .find(|&idx| bytes[idx] == b'-' && bytes[idx + 1].is_ascii_digit())
        .unwrap_or(stem.len());

    let mut name = String::with_capacity(cut);
    for ch in stem[..cut].chars() {
        let mapped = if ch.is_ascii_alphanumeric() { ch } else { '.' };
        if mapped == '.' && name.ends_with('.') {
            continue;
        }
        name.push(mapped);
    }
    name.trim_matches('.').to_string()
}

pub(super) fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>, ClasspathError> {
    let file = File::open(path).map_err(|source| ClasspathError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ZipArchive::new(BufReader::new(file)).map_err(|source| ClasspathError::Zip {
        path: path.to_path_buf(),
        source,
    })
}

pub(super) fn read_archive_entry(
    archive: &mut ZipArchive<BufReader<File>>,
    path: &Path,
    entry_name: &str,
) -> Result<Vec<u8>, ClasspathError> {
    let mut entry = archive
        .by_name(entry_name)
        .map_err(|source| ClasspathError::Zip {
            path: path.to_path_buf(),
            source,
        })?;
    let mut buffer = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut buffer)
        .map_err(|source| ClasspathError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{ClassFileBuilder, JarBuilder};
    use tempfile::tempdir;
    use test_case::test_case;

    #[test_case("commons-lang3-3.12.0.jar" => "commons.lang3" ; "version suffix after second hyphen")]
    #[test_case("guava-33.0.0-jre.jar" => "guava" ; "qualifier after version")]
    #[test_case("my_lib.jar" => "my.lib" ; "underscore replaced")]
    #[test_case("foo--bar.jar" => "foo.bar" ; "repeated separators collapse")]
    #[test_case("-weird-.jar" => "weird" ; "outer dots trimmed")]
    fn derives_automatic_names(file_name: &str) -> String {
        automatic_module_name(Path::new(file_name), &Manifest::default())
    }

    #[test]
    fn manifest_name_overrides_file_name() {
        let manifest = Manifest::parse("Automatic-Module-Name: org.example.lib\n");
        assert_eq!(
            automatic_module_name(Path::new("lib-1.0.jar"), &manifest),
            "org.example.lib"
        );
    }

    #[test]
    fn selects_highest_compatible_slot() {
        let dir = tempdir().unwrap();
        let jar = dir.path().join("mr.jar");
        let class = ClassFileBuilder::new("a/A").build();
        JarBuilder::new()
            .multi_release()
            .class("a/A", class.clone())
            .versioned_class(11, "a/A", class.clone())
            .versioned_class(21, "a/A", class.clone())
            .versioned_class(17, "b/Only17", class)
            .write(&jar)
            .unwrap();

        let index = JarIndex::open(&jar).unwrap();
        assert_eq!(
            index.select("a/A.class", 17),
            JarSelection::Found {
                entry_name: "META-INF/versions/11/a/A.class".into(),
                version: Some(11),
            }
        );
        assert_eq!(
            index.select("a/A.class", 8),
            JarSelection::Found {
                entry_name: "a/A.class".into(),
                version: None,
            }
        );
        assert_eq!(
            index.select("b/Only17.class", 11),
            JarSelection::TargetMismatch { lowest_version: 17 }
        );
        assert_eq!(index.select("c/Missing.class", 21), JarSelection::Absent);
        assert_eq!(
            index.packages().into_iter().collect::<Vec<_>>(),
            vec!["a".to_string()]
        );
    }

    #[test]
    fn versioned_slots_ignored_without_manifest_flag() {
        let dir = tempdir().unwrap();
        let jar = dir.path().join("plain.jar");
        let class = ClassFileBuilder::new("a/A").build();
        JarBuilder::new()
            .class("a/A", class.clone())
            .versioned_class(11, "a/A", class)
            .write(&jar)
            .unwrap();

        let index = JarIndex::open(&jar).unwrap();
        assert!(!index.is_multi_release());
        assert_eq!(
            index.select("a/A.class", 21),
            JarSelection::Found {
                entry_name: "a/A.class".into(),
                version: None,
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn reads_reuse_the_open_archive() {
        let dir = tempdir().unwrap();
        let jar = dir.path().join("lib.jar");
        let class = ClassFileBuilder::new("a/A").build();
        JarBuilder::new()
            .class("a/A", class.clone())
            .write(&jar)
            .unwrap();

        let mut index = JarIndex::open(&jar).unwrap();
        std::fs::remove_file(&jar).unwrap();
        assert_eq!(index.read("a/A.class").unwrap(), class);
        assert_eq!(index.read("a/A.class").unwrap(), class);
        assert!(matches!(
            index.read("a/Missing.class"),
            Err(ClasspathError::Zip { .. })
        ));
    }
}
