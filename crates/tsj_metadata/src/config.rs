use crate::cache::{DEFAULT_SCHEMA_ID, DEFAULT_SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Release resolved against when nothing else is configured.
pub const DEFAULT_TARGET_RELEASE: u32 = 21;

/// File created inside `TSJ_CACHE_DIR`.
pub const CACHE_FILE_NAME: &str = "descriptor-cache.bin";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read resolver config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid resolver config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid TSJ_TARGET_RELEASE value `{0}`")]
    InvalidTargetRelease(String),
}

/// Inputs shared by the symbol table and the module graph builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Raw classpath strings; each may join several paths with the platform
    /// separator.
    pub classpath: Vec<String>,
    /// Runtime image providing the platform modules.
    pub runtime_image: Option<PathBuf>,
    pub target_release: u32,
    /// Caller-supplied classpath fingerprint. Captured from disk when absent.
    pub fingerprint: Option<String>,
    /// Persistent descriptor cache file; no persistence when absent.
    pub cache_file: Option<PathBuf>,
    pub schema_id: String,
    pub schema_version: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            classpath: Vec::new(),
            runtime_image: None,
            target_release: DEFAULT_TARGET_RELEASE,
            fingerprint: None,
            cache_file: None,
            schema_id: DEFAULT_SCHEMA_ID.to_string(),
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
        }
    }
}

impl ResolverConfig {
    /// Defaults overlaid with `TSJ_TARGET_RELEASE`, `TSJ_CACHE_DIR` and the
    /// detected Java home (`JAVA_HOME`, else the `java` on `PATH`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(raw) = env::var("TSJ_TARGET_RELEASE") {
            let release = raw
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidTargetRelease(raw.clone()))?;
            config.set_target_release(release);
        }

        if let Some(dir) = env::var_os("TSJ_CACHE_DIR").filter(|dir| !dir.is_empty()) {
            config.cache_file = Some(PathBuf::from(dir).join(CACHE_FILE_NAME));
        }

        config.runtime_image = detect_java_home().map(|home| runtime_image_root(&home));
        Ok(config)
    }

    /// Reads a JSON document; missing fields keep their defaults.
    pub fn load_json(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_target_release(mut self, release: u32) -> Self {
        self.set_target_release(release);
        self
    }

    pub fn set_target_release(&mut self, release: u32) {
        self.target_release = release;
    }

    pub fn with_classpath<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.classpath = entries.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_runtime_image(mut self, root: impl Into<PathBuf>) -> Self {
        self.runtime_image = Some(root.into());
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn with_cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_file = Some(path.into());
        self
    }

    pub fn with_schema(mut self, id: impl Into<String>, version: impl Into<String>) -> Self {
        self.schema_id = id.into();
        self.schema_version = version.into();
        self
    }
}

fn detect_java_home() -> Option<PathBuf> {
    if let Ok(path) = env::var("JAVA_HOME") {
        let candidate = PathBuf::from(path);
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(java_path) = which::which("java") {
        let resolved = fs::canonicalize(&java_path).unwrap_or(java_path);
        if let Some(home) = resolved.parent().and_then(Path::parent) {
            return Some(home.to_path_buf());
        }
    }

    None
}

/// Prefers the `jmods` directory of a JDK home, which carries the class bytes.
fn runtime_image_root(java_home: &Path) -> PathBuf {
    let jmods = java_home.join("jmods");
    if jmods.is_dir() {
        jmods
    } else {
        java_home.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_documented_values() {
        let config = ResolverConfig::default();
        assert_eq!(config.target_release, DEFAULT_TARGET_RELEASE);
        assert_eq!(config.schema_id, "tsj-descriptor-cache");
        assert_eq!(config.schema_version, "1");
        assert!(config.cache_file.is_none());
    }

    #[test]
    fn json_overrides_keep_defaults_for_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("resolver.json");
        fs::write(
            &path,
            r#"{ "classpath": ["lib/a.jar"], "target_release": 17, "fingerprint": "abc" }"#,
        )
        .unwrap();

        let config = ResolverConfig::load_json(&path).unwrap();
        assert_eq!(config.classpath, vec!["lib/a.jar".to_string()]);
        assert_eq!(config.target_release, 17);
        assert_eq!(config.fingerprint.as_deref(), Some("abc"));
        assert_eq!(config.schema_version, DEFAULT_SCHEMA_VERSION);
    }

    #[test]
    fn malformed_json_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let error = ResolverConfig::load_json(&path).unwrap_err();
        assert!(matches!(error, ConfigError::Parse { .. }));
        assert!(error.to_string().contains("broken.json"));
    }

    #[test]
    fn builders_compose() {
        let config = ResolverConfig::default()
            .with_classpath(["out", "lib/x.jar"])
            .with_target_release(11)
            .with_schema("custom", "7")
            .with_cache_file("cache.bin");
        assert_eq!(config.classpath.len(), 2);
        assert_eq!(config.target_release, 11);
        assert_eq!(config.schema_id, "custom");
        assert_eq!(config.cache_file, Some(PathBuf::from("cache.bin")));
    }

    #[test]
    fn jmods_directory_preferred_when_present() {
        let dir = tempdir().unwrap();
        assert_eq!(runtime_image_root(dir.path()), dir.path());
        fs::create_dir(dir.path().join("jmods")).unwrap();
        assert_eq!(runtime_image_root(dir.path()), dir.path().join("jmods"));
    }
}
