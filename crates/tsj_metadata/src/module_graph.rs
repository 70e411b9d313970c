//! JPMS module graph.
//!
//! [`ModuleGraphBuilder`] collects module declarations from a runtime image
//! and from module-path entries, then derives per-module exports, the
//! readability closure and package ownership. Package names are kept in
//! internal form (`java/util`).

use crate::classfile::{read_class, ModuleAttribute, ModulePackageGrant};
use crate::classpath::{scan_exploded, ClasspathEntry, ClasspathError, ClasspathScanner};
use crate::config::ResolverConfig;
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const JAVA_BASE: &str = "java.base";

#[derive(Debug, Error)]
pub enum ModuleGraphError {
    #[error("failed to read runtime image {path}: {source}")]
    RuntimeImage {
        path: PathBuf,
        #[source]
        source: ClasspathError,
    },
}

/// One module as seen by the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDeclaration {
    pub name: String,
    pub automatic: bool,
    pub requires: Vec<String>,
    pub exports: Vec<ModulePackageGrant>,
    pub packages: BTreeSet<String>,
}

impl ModuleDeclaration {
    /// From a `Module` attribute. Exported and opened packages count as
    /// contained even if the scan missed them.
    pub fn explicit(module: &ModuleAttribute, packages: impl IntoIterator<Item = String>) -> Self {
        let mut packages: BTreeSet<String> = packages.into_iter().collect();
        packages.extend(module.exports.iter().map(|grant| grant.package.clone()));
        packages.extend(module.opens.iter().map(|grant| grant.package.clone()));
        Self {
            name: module.name.clone(),
            automatic: false,
            requires: module
                .requires
                .iter()
                .map(|requires| requires.module.clone())
                .collect(),
            exports: module.exports.clone(),
            packages,
        }
    }

    pub fn automatic(name: impl Into<String>, packages: impl IntoIterator<Item = String>) -> Self {
        Self {
            name: name.into(),
            automatic: true,
            requires: Vec::new(),
            exports: Vec::new(),
            packages: packages.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleGraph {
    exported_packages: IndexMap<String, BTreeSet<String>>,
    qualified_exports: IndexMap<String, BTreeMap<String, BTreeSet<String>>>,
    readable_modules: IndexMap<String, BTreeSet<String>>,
    package_to_module: IndexMap<String, String>,
    automatic_modules: BTreeSet<String>,
    diagnostics: Vec<String>,
}

impl ModuleGraph {
    /// Derives the graph from declarations in priority order. A later
    /// declaration with an already-seen name replaces the earlier one in place.
    pub fn from_declarations(
        declarations: impl IntoIterator<Item = ModuleDeclaration>,
        mut diagnostics: Vec<String>,
    ) -> Self {
        let mut modules: IndexMap<String, ModuleDeclaration> = IndexMap::new();
        for declaration in declarations {
            modules.insert(declaration.name.clone(), declaration);
        }

        let mut exported_packages = IndexMap::new();
        let mut qualified_exports = IndexMap::new();
        for (name, module) in &modules {
            let mut exported = BTreeSet::new();
            let mut qualified: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            if module.automatic {
                exported.extend(module.packages.iter().cloned());
            } else {
                for grant in &module.exports {
                    if grant.targets.is_empty() {
                        exported.insert(grant.package.clone());
                    } else {
                        qualified
                            .entry(grant.package.clone())
                            .or_default()
                            .extend(grant.targets.iter().cloned());
                    }
                }
            }
            exported_packages.insert(name.clone(), exported);
            qualified_exports.insert(name.clone(), qualified);
        }

        let readable_modules = readable_closure(&modules);

        let mut package_to_module: IndexMap<String, String> = IndexMap::new();
        for (name, module) in &modules {
            for package in &module.packages {
                match package_to_module.get(package) {
                    None => {
                        package_to_module.insert(package.clone(), name.clone());
                    }
                    Some(existing) if existing != name => {
                        warn!(
                            package = %package,
                            first = %existing,
                            second = %name,
                            "split package"
                        );
                        diagnostics
                            .push(format!("split-package: {package} in {existing} and {name}"));
                    }
                    Some(_) => {}
                }
            }
        }

        let automatic_modules = modules
            .values()
            .filter(|module| module.automatic)
            .map(|module| module.name.clone())
            .collect();

        Self {
            exported_packages,
            qualified_exports,
            readable_modules,
            package_to_module,
            automatic_modules,
            diagnostics,
        }
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.exported_packages.keys().map(String::as_str)
    }

    pub fn contains_module(&self, module: &str) -> bool {
        self.exported_packages.contains_key(module)
    }

    pub fn is_automatic(&self, module: &str) -> bool {
        self.automatic_modules.contains(module)
    }

    /// Unqualified exports of `module`.
    pub fn exported_packages(&self, module: &str) -> Option<&BTreeSet<String>> {
        self.exported_packages.get(module)
    }

    /// Qualified exports of `module`: package to target modules.
    pub fn qualified_exports(&self, module: &str) -> Option<&BTreeMap<String, BTreeSet<String>>> {
        self.qualified_exports.get(module)
    }

    /// Transitive readability closure of `module`.
    pub fn readable_modules(&self, module: &str) -> Option<&BTreeSet<String>> {
        self.readable_modules.get(module)
    }

    pub fn package_owner(&self, package: &str) -> Option<&str> {
        self.package_to_module.get(package).map(String::as_str)
    }

    pub fn reads(&self, requester: &str, owner: &str) -> bool {
        self.readable_modules
            .get(requester)
            .map(|readable| readable.contains(owner))
            .unwrap_or(false)
    }

    /// `true` when `owner` exports `package` to everyone, or to `requester`
    /// through a qualified export.
    pub fn exports_to(&self, owner: &str, package: &str, requester: &str) -> bool {
        let unqualified = self
            .exported_packages
            .get(owner)
            .map(|exported| exported.contains(package))
            .unwrap_or(false);
        unqualified
            || self
                .qualified_exports
                .get(owner)
                .and_then(|qualified| qualified.get(package))
                .map(|targets| targets.contains(requester))
                .unwrap_or(false)
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }
}

fn readable_closure(
    modules: &IndexMap<String, ModuleDeclaration>,
) -> IndexMap<String, BTreeSet<String>> {
    let has_base = modules.contains_key(JAVA_BASE);
    let mut direct: IndexMap<&str, BTreeSet<&str>> = IndexMap::new();
    for (name, module) in modules {
        let mut readable = BTreeSet::new();
        if module.automatic {
            readable.extend(modules.keys().map(String::as_str));
            readable.remove(name.as_str());
        }
        if name != JAVA_BASE && has_base {
            readable.insert(JAVA_BASE);
        }
        readable.extend(module.requires.iter().map(String::as_str));
        direct.insert(name.as_str(), readable);
    }

    let mut closure = IndexMap::new();
    for name in modules.keys() {
        let mut reachable: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<&str> = direct
            .get(name.as_str())
            .map(|edges| edges.iter().copied().collect())
            .unwrap_or_default();
        while let Some(next) = queue.pop_front() {
            if !reachable.insert(next.to_string()) {
                continue;
            }
            if let Some(edges) = direct.get(next) {
                queue.extend(edges.iter().copied());
            }
        }
        closure.insert(name.clone(), reachable);
    }
    closure
}

/// Collects module declarations and builds a [`ModuleGraph`].
#[derive(Debug, Default)]
pub struct ModuleGraphBuilder {
    runtime_image: Option<PathBuf>,
    scanner: ClasspathScanner,
}

impl ModuleGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runtime_image(mut self, root: impl Into<PathBuf>) -> Self {
        self.runtime_image = Some(root.into());
        self
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            runtime_image: config.runtime_image.clone(),
            scanner: ClasspathScanner::default(),
        }
    }

    /// Platform modules (sorted by name) first, then `module_path` entries in
    /// order. Unreadable module-path entries become `module-path-scan-failed`
    /// diagnostics; an unreadable runtime image is an error.
    pub fn build(
        &mut self,
        module_path: &[ClasspathEntry],
    ) -> Result<ModuleGraph, ModuleGraphError> {
        let mut declarations = Vec::new();
        let mut diagnostics = Vec::new();

        if let Some(root) = self.runtime_image.clone() {
            self.collect_image(&root, &mut declarations)
                .map_err(|source| ModuleGraphError::RuntimeImage { path: root, source })?;
        }

        for entry in module_path {
            if let Err(error) = self.collect_entry(entry, &mut declarations) {
                warn!(entry = %entry.path().display(), error = %error, "module path entry skipped");
                diagnostics.push(format!("module-path-scan-failed: {error}"));
            }
        }

        let graph = ModuleGraph::from_declarations(declarations, diagnostics);
        debug!(
            modules = graph.exported_packages.len(),
            packages = graph.package_to_module.len(),
            "built module graph"
        );
        Ok(graph)
    }

    fn collect_image(
        &mut self,
        root: &Path,
        out: &mut Vec<ModuleDeclaration>,
    ) -> Result<(), ClasspathError> {
        let image = self.scanner.runtime_image(root)?;
        debug!(
            image = %image.root().display(),
            modules = image.modules().len(),
            "reading platform modules"
        );
        for module in image.modules() {
            let packages = module.packages.iter().cloned();
            out.push(match &module.descriptor {
                Some(descriptor) => ModuleDeclaration::explicit(descriptor, packages),
                None => ModuleDeclaration::automatic(module.name.clone(), packages),
            });
        }
        Ok(())
    }

    fn collect_entry(
        &mut self,
        entry: &ClasspathEntry,
        out: &mut Vec<ModuleDeclaration>,
    ) -> Result<(), ClasspathError> {
        if !entry.path().exists() {
            return Ok(());
        }
        match entry {
            ClasspathEntry::Jar(path) => self.collect_jar(path, out),
            ClasspathEntry::RuntimeImage(root) => self.collect_image(root, out),
            ClasspathEntry::Directory(dir) => {
                if dir.join("module-info.class").is_file() {
                    return collect_exploded(dir, out);
                }
                self.collect_module_directory(dir, out)
            }
        }
    }

    fn collect_jar(
        &mut self,
        path: &Path,
        out: &mut Vec<ModuleDeclaration>,
    ) -> Result<(), ClasspathError> {
        let jar = self.scanner.jar(path)?;
        let packages = jar.packages();
        out.push(match jar.module_descriptor() {
            Some(descriptor) => ModuleDeclaration::explicit(descriptor, packages),
            None => ModuleDeclaration::automatic(jar.module_name(), packages),
        });
        Ok(())
    }

    /// A directory without `module-info.class` holds modules: jars and
    /// exploded module directories, visited in name order.
    fn collect_module_directory(
        &mut self,
        dir: &Path,
        out: &mut Vec<ModuleDeclaration>,
    ) -> Result<(), ClasspathError> {
        let entries = fs::read_dir(dir).map_err(|source| ClasspathError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut children = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ClasspathError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            children.push(entry.path());
        }
        children.sort();

        for child in children {
            if child.is_dir() && child.join("module-info.class").is_file() {
                collect_exploded(&child, out)?;
            } else if child
                .extension()
                .and_then(OsStr::to_str)
                .map(|ext| ext.eq_ignore_ascii_case("jar"))
                .unwrap_or(false)
            {
                self.collect_jar(&child, out)?;
            }
        }
        Ok(())
    }
}

fn collect_exploded(dir: &Path, out: &mut Vec<ModuleDeclaration>) -> Result<(), ClasspathError> {
    let (module_info, packages) = scan_exploded(dir)?;
    let Some((bytes, location)) = module_info else {
        return Ok(());
    };
    let class =
        read_class(&bytes).map_err(|source| ClasspathError::ClassFile { location, source })?;
    if let Some(module) = class.module {
        out.push(ModuleDeclaration::explicit(&module, packages));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(package: &str, targets: &[&str]) -> ModulePackageGrant {
        ModulePackageGrant {
            package: package.into(),
            flags: 0,
            targets: targets.iter().map(|target| target.to_string()).collect(),
        }
    }

    fn explicit(
        name: &str,
        requires: &[&str],
        exports: Vec<ModulePackageGrant>,
        packages: &[&str],
    ) -> ModuleDeclaration {
        ModuleDeclaration {
            name: name.into(),
            automatic: false,
            requires: requires.iter().map(|r| r.to_string()).collect(),
            exports,
            packages: packages.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn sample_graph() -> ModuleGraph {
        ModuleGraph::from_declarations(
            vec![
                explicit(
                    JAVA_BASE,
                    &[],
                    vec![grant("java/lang", &[])],
                    &["java/lang", "jdk/internal/misc"],
                ),
                explicit("app.core", &["app.util"], vec![grant("app/core", &[])], &["app/core"]),
                explicit(
                    "app.util",
                    &[],
                    vec![grant("app/util", &[]), grant("app/util/spi", &["app.core"])],
                    &["app/util", "app/util/spi", "app/util/internal"],
                ),
                explicit("app.other", &[], vec![], &["app/other", "app/util"]),
                ModuleDeclaration::automatic("legacy.lib", vec!["legacy/api".to_string()]),
            ],
            Vec::new(),
        )
    }

    #[test]
    fn readability_is_transitive_and_includes_java_base() {
        let graph = sample_graph();
        assert!(graph.reads("app.core", "app.util"));
        assert!(graph.reads("app.core", JAVA_BASE));
        assert!(!graph.reads("app.util", "app.core"));
        assert!(!graph.reads(JAVA_BASE, "app.core"));
        assert!(graph.reads("legacy.lib", "app.other"));
        assert!(!graph.reads("legacy.lib", "legacy.lib"));
    }

    #[test]
    fn exports_distinguish_qualified_targets() {
        let graph = sample_graph();
        assert!(graph.exports_to("app.util", "app/util", "app.other"));
        assert!(graph.exports_to("app.util", "app/util/spi", "app.core"));
        assert!(!graph.exports_to("app.util", "app/util/spi", "app.other"));
        assert!(!graph.exports_to("app.util", "app/util/internal", "app.core"));
        assert!(graph.exports_to("legacy.lib", "legacy/api", "app.core"));
        assert!(graph.is_automatic("legacy.lib"));
    }

    #[test]
    fn split_packages_keep_first_owner() {
        let graph = sample_graph();
        assert_eq!(graph.package_owner("app/util"), Some("app.util"));
        assert_eq!(
            graph.diagnostics(),
            &["split-package: app/util in app.util and app.other".to_string()]
        );
    }

    #[test]
    fn readability_closure_survives_require_cycles() {
        let graph = ModuleGraph::from_declarations(
            vec![
                explicit("a", &["b"], vec![], &["a"]),
                explicit("b", &["a"], vec![], &["b"]),
            ],
            Vec::new(),
        );
        assert!(graph.reads("a", "b"));
        assert!(graph.reads("a", "a"));
        assert!(!graph.reads("a", JAVA_BASE));
    }
}
