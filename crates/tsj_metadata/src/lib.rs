//! Binary metadata layer for JVM interop.
//!
//! Reads classfiles, jars, multi-release jars and runtime images into
//! immutable descriptors, caches them per classpath fingerprint and derives
//! the module graph the access checks run against.

pub mod cache;
pub mod classfile;
pub mod classpath;
pub mod config;
pub mod descriptor;
pub mod module_graph;
pub mod signature;
pub mod symbol_table;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixture;

pub use cache::{
    CacheEnvelope, CacheError, CacheKey, DescriptorCacheStore, FileDescriptorCache,
    MemoryDescriptorCache,
};
pub use classfile::{read_class, AccessFlags, ClassDescriptor, ClassfileError};
pub use classpath::{ClasspathEntry, ClasspathError, ClasspathFingerprint, ClasspathOrigin};
pub use config::{ConfigError, ResolverConfig};
pub use module_graph::{ModuleDeclaration, ModuleGraph, ModuleGraphBuilder, ModuleGraphError};
pub use signature::JType;
pub use symbol_table::{
    CacheStats, ClassResolution, ResolutionStatus, SymbolTable, SymbolTableError,
};
