//! Module-aware class accessibility.
//!
//! [`ModuleAccessResolver`] layers JPMS readability and export checks on top
//! of a symbol-table lookup. Every check reads from an explicit
//! [`AccessContext`]; there is no notion of a process-wide current module.

use rustc_hash::FxHashMap;
use std::fmt;
use tracing::debug;
use tsj_metadata::classfile::package_of;
use tsj_metadata::symbol_table::normalize_class_name;
use tsj_metadata::{ClasspathOrigin, ModuleGraph, ResolutionStatus, SymbolTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessStatus {
    Accessible,
    ClassNotFound,
    ClassNotReadable,
    ClassNotExported,
    TargetLevelMismatch,
}

impl AccessStatus {
    pub fn label(self) -> &'static str {
        match self {
            AccessStatus::Accessible => "accessible",
            AccessStatus::ClassNotFound => "class-not-found",
            AccessStatus::ClassNotReadable => "class-not-readable",
            AccessStatus::ClassNotExported => "class-not-exported",
            AccessStatus::TargetLevelMismatch => "target-level-mismatch",
        }
    }

    pub fn is_accessible(self) -> bool {
        self == AccessStatus::Accessible
    }
}

impl fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of [`ModuleAccessResolver::resolve_class`].
#[derive(Debug, Clone, PartialEq)]
pub struct AccessResolution {
    pub internal_name: String,
    pub status: AccessStatus,
    pub owner_module: Option<String>,
    pub detail: String,
    /// Classpath location the class was read from; present whenever the
    /// class itself was found, even when access is denied.
    pub selected_origin: Option<ClasspathOrigin>,
}

/// Who is asking, and the module facts needed to answer.
///
/// A context without a requester module (the unnamed module, or
/// [`AccessContext::unrestricted`]) skips every module check.
#[derive(Debug, Clone, Default)]
pub struct AccessContext<'g> {
    requester_module: Option<String>,
    class_modules: FxHashMap<String, String>,
    graph: Option<&'g ModuleGraph>,
}

impl<'g> AccessContext<'g> {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn for_requester_module(module: impl Into<String>, graph: &'g ModuleGraph) -> Self {
        Self {
            requester_module: Some(module.into()),
            class_modules: FxHashMap::default(),
            graph: Some(graph),
        }
    }

    /// Unnamed-module requester that still sees the graph's package owners.
    pub fn unnamed(graph: &'g ModuleGraph) -> Self {
        Self {
            requester_module: None,
            class_modules: FxHashMap::default(),
            graph: Some(graph),
        }
    }

    /// Pins the module of one class, overriding what the classpath says.
    pub fn with_class_module(mut self, class_name: &str, module: impl Into<String>) -> Self {
        self.class_modules
            .insert(normalize_class_name(class_name), module.into());
        self
    }

    pub fn requester_module(&self) -> Option<&str> {
        self.requester_module.as_deref()
    }

    pub fn graph(&self) -> Option<&'g ModuleGraph> {
        self.graph
    }

    /// Owner module of `internal_name`: the pinned module, then whatever
    /// `origin_module` reports, then the graph's package owner.
    pub fn owner_module(
        &self,
        internal_name: &str,
        origin_module: impl FnOnce() -> Option<String>,
    ) -> Option<String> {
        if let Some(module) = self.class_modules.get(internal_name) {
            return Some(module.clone());
        }
        origin_module().or_else(|| {
            self.graph
                .and_then(|graph| graph.package_owner(package_of(internal_name)))
                .map(str::to_string)
        })
    }

    pub fn module_readable(&self, owner_module: Option<&str>) -> bool {
        match (owner_module, self.requester_module()) {
            (Some(owner), Some(requester)) if owner != requester => self
                .graph
                .map(|graph| graph.reads(requester, owner))
                .unwrap_or(false),
            _ => true,
        }
    }

    pub fn package_exported(&self, owner_module: Option<&str>, package: &str) -> bool {
        match (owner_module, self.requester_module()) {
            (Some(owner), Some(requester)) if owner != requester => self
                .graph
                .map(|graph| graph.exports_to(owner, package, requester))
                .unwrap_or(false),
            _ => true,
        }
    }
}

/// Class-level access checks against a [`SymbolTable`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleAccessResolver;

impl ModuleAccessResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve_class(
        &self,
        table: &mut SymbolTable,
        class_name: &str,
        context: &AccessContext<'_>,
    ) -> AccessResolution {
        let resolution = table.resolve_class_with_metadata(class_name);
        let internal_name = resolution.internal_name.clone();

        match resolution.status {
            ResolutionStatus::ClassNotFound => {
                return denied(
                    internal_name,
                    AccessStatus::ClassNotFound,
                    None,
                    AccessStatus::ClassNotFound.label().to_string(),
                    None,
                );
            }
            ResolutionStatus::TargetLevelMismatch => {
                let detail = resolution
                    .diagnostic
                    .unwrap_or_else(|| AccessStatus::TargetLevelMismatch.label().to_string());
                return denied(
                    internal_name,
                    AccessStatus::TargetLevelMismatch,
                    None,
                    detail,
                    None,
                );
            }
            ResolutionStatus::Found => {}
        }

        let origin = resolution.origin;
        let owner_module = context.owner_module(&internal_name, || {
            origin.as_ref().and_then(|origin| origin.module_name.clone())
        });

        let requester = context.requester_module();
        if let (Some(owner), Some(requester)) = (owner_module.as_deref(), requester) {
            let package = package_of(&internal_name);
            if !context.module_readable(Some(owner)) {
                let detail = format!("class-not-readable: {owner} from {requester}");
                return denied(
                    internal_name,
                    AccessStatus::ClassNotReadable,
                    owner_module,
                    detail,
                    origin,
                );
            }
            if !context.package_exported(Some(owner), package) {
                let detail = format!("class-not-exported: {package} from {owner}");
                return denied(
                    internal_name,
                    AccessStatus::ClassNotExported,
                    owner_module,
                    detail,
                    origin,
                );
            }
        }

        AccessResolution {
            internal_name,
            status: AccessStatus::Accessible,
            owner_module,
            detail: AccessStatus::Accessible.label().to_string(),
            selected_origin: origin,
        }
    }
}

fn denied(
    internal_name: String,
    status: AccessStatus,
    owner_module: Option<String>,
    detail: String,
    origin: Option<ClasspathOrigin>,
) -> AccessResolution {
    debug!(class = %internal_name, status = status.label(), %detail, "class access denied");
    AccessResolution {
        internal_name,
        status,
        owner_module,
        detail,
        selected_origin: origin,
    }
}
