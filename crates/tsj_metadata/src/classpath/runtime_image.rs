use super::jar::{open_archive, read_archive_entry};
use super::{package_of_entry, ClasspathError, ClasspathOrigin};
use crate::classfile::{read_class, ModuleAttribute};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const JMOD_CLASSES: &str = "classes/";
const MODULE_INFO: &str = "module-info.class";

#[derive(Debug, Clone)]
pub(crate) enum ModuleLocation {
    Exploded(PathBuf),
    Jmod(PathBuf),
}

impl ModuleLocation {
    fn path(&self) -> &Path {
        match self {
            ModuleLocation::Exploded(path) | ModuleLocation::Jmod(path) => path,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ImageModule {
    pub(crate) name: String,
    pub(crate) location: ModuleLocation,
    pub(crate) descriptor: Option<ModuleAttribute>,
    pub(crate) packages: BTreeSet<String>,
}

/// Platform modules of a runtime image, laid out either as exploded
/// `modules/<module>/…` directories or as `.jmod` archives whose classes live
/// under `classes/`.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeImage {
    root: PathBuf,
    modules: Vec<ImageModule>,
    package_index: FxHashMap<String, usize>,
}

impl RuntimeImage {
    pub(crate) fn open(root: &Path) -> Result<Self, ClasspathError> {
        let base = [root.join("modules"), root.join("jmods")]
            .into_iter()
            .find(|candidate| candidate.is_dir())
            .unwrap_or_else(|| root.to_path_buf());

        let mut locations = Vec::new();
        if base.is_dir() {
            let entries = fs::read_dir(&base).map_err(|source| ClasspathError::Io {
                path: base.clone(),
                source,
            })?;
            for entry in entries {
                let entry = entry.map_err(|source| ClasspathError::Io {
                    path: base.clone(),
                    source,
                })?;
                let path = entry.path();
                if path.is_dir() {
                    locations.push(ModuleLocation::Exploded(path));
                } else if is_jmod(&path) {
                    locations.push(ModuleLocation::Jmod(path));
                }
            }
        }

        let mut modules = locations
            .into_iter()
            .map(load_module)
            .collect::<Result<Vec<_>, _>>()?;
        modules.sort_by(|left, right| left.name.cmp(&right.name));

        let mut package_index = FxHashMap::default();
        for (idx, module) in modules.iter().enumerate() {
            for package in &module.packages {
                package_index.entry(package.clone()).or_insert(idx);
            }
        }

        debug!(
            image = %root.display(),
            modules = modules.len(),
            packages = package_index.len(),
            "opened runtime image"
        );

        Ok(Self {
            root: root.to_path_buf(),
            modules,
            package_index,
        })
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    /// Modules sorted by name.
    pub(crate) fn modules(&self) -> &[ImageModule] {
        &self.modules
    }

    pub(crate) fn find(
        &self,
        class_entry: &str,
    ) -> Result<Option<(Vec<u8>, ClasspathOrigin)>, ClasspathError> {
        let Some(&idx) = self.package_index.get(package_of_entry(class_entry)) else {
            return Ok(None);
        };
        let module = &self.modules[idx];
        match &module.location {
            ModuleLocation::Exploded(dir) => {
                let path = dir.join(class_entry);
                if !path.is_file() {
                    return Ok(None);
                }
                let bytes = fs::read(&path).map_err(|source| ClasspathError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(Some((bytes, image_origin(module, class_entry.to_string()))))
            }
            ModuleLocation::Jmod(path) => {
                let entry_name = format!("{JMOD_CLASSES}{class_entry}");
                let mut archive = open_archive(path)?;
                if archive.by_name(&entry_name).is_err() {
                    return Ok(None);
                }
                let bytes = read_archive_entry(&mut archive, path, &entry_name)?;
                Ok(Some((bytes, image_origin(module, entry_name))))
            }
        }
    }
}

fn image_origin(module: &ImageModule, entry_name: String) -> ClasspathOrigin {
    ClasspathOrigin {
        entry: module.location.path().to_path_buf(),
        entry_name,
        versioned: false,
        selected_version: None,
        module_name: Some(module.name.clone()),
    }
}

fn is_jmod(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| ext.eq_ignore_ascii_case("jmod"))
        .unwrap_or(false)
}

fn fallback_module_name(location: &ModuleLocation) -> String {
    let path = location.path();
    let name = match location {
        ModuleLocation::Exploded(_) => path.file_name(),
        ModuleLocation::Jmod(_) => path.file_stem(),
    };
    name.map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn load_module(location: ModuleLocation) -> Result<ImageModule, ClasspathError> {
    let (module_info, packages) = match &location {
        ModuleLocation::Exploded(dir) => scan_exploded(dir)?,
        ModuleLocation::Jmod(path) => scan_jmod(path)?,
    };

    let descriptor = match module_info {
        Some((bytes, display)) => {
            let class = read_class(&bytes).map_err(|source| ClasspathError::ClassFile {
                location: display,
                source,
            })?;
            class.module
        }
        None => {
            warn!(
                module = %location.path().display(),
                "runtime image module has no module-info.class"
            );
            None
        }
    };

    let mut packages = packages;
    if let Some(module) = &descriptor {
        packages.extend(module.exports.iter().map(|grant| grant.package.clone()));
    }

    let name = descriptor
        .as_ref()
        .map(|module| module.name.clone())
        .unwrap_or_else(|| fallback_module_name(&location));

    Ok(ImageModule {
        name,
        location,
        descriptor,
        packages,
    })
}

pub(crate) type ScannedModule = (Option<(Vec<u8>, String)>, BTreeSet<String>);

pub(crate) fn scan_exploded(root: &Path) -> Result<ScannedModule, ClasspathError> {
    let mut module_info = None;
    let mut packages = BTreeSet::new();
    let mut dirs = vec![root.to_path_buf()];

    while let Some(dir) = dirs.pop() {
        let entries = fs::read_dir(&dir).map_err(|source| ClasspathError::Io {
            path: dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| ClasspathError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path);
                continue;
            }
            if path.extension().and_then(OsStr::to_str) != Some("class") {
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if relative == MODULE_INFO {
                let bytes = fs::read(&path).map_err(|source| ClasspathError::Io {
                    path: path.clone(),
                    source,
                })?;
                module_info = Some((bytes, path.display().to_string()));
                continue;
            }
            let package = package_of_entry(&relative);
            if !package.is_empty() {
                packages.insert(package.to_string());
            }
        }
    }

    Ok((module_info, packages))
}

fn scan_jmod(path: &Path) -> Result<ScannedModule, ClasspathError> {
    let mut archive = open_archive(path)?;
    let mut packages = BTreeSet::new();
    let mut has_module_info = false;

    for idx in 0..archive.len() {
        let entry = archive.by_index(idx).map_err(|source| ClasspathError::Zip {
            path: path.to_path_buf(),
            source,
        })?;
        let Some(name) = entry.name().strip_prefix(JMOD_CLASSES) else {
            continue;
        };
        if !name.ends_with(".class") || name.starts_with("META-INF/") {
            continue;
        }
        if name == MODULE_INFO {
            has_module_info = true;
            continue;
        }
        let package = package_of_entry(name);
        if !package.is_empty() {
            packages.insert(package.to_string());
        }
    }

    let module_info = if has_module_info {
        let entry_name = format!("{JMOD_CLASSES}{MODULE_INFO}");
        let bytes = read_archive_entry(&mut archive, path, &entry_name)?;
        Some((bytes, format!("{}!/{entry_name}", path.display())))
    } else {
        None
    };

    Ok((module_info, packages))
}
