//! Pre-parsed engine configuration
//!
//! The engine never reads configuration files itself. Callers build an
//! [`EngineConfig`] (the `ramws` binary does it from `.ramws.yml`) and hand it
//! to the [`Controller`](crate::Controller).

use mirror::BackendKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::Role;

/// Default lock acquisition timeout
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Excludes applied to the default `.` source
pub const DEFAULT_SOURCE_EXCLUDES: [&str; 4] = [".git/**", "build/**", "target/**", "node_modules/**"];

/// A tracked source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRule {
    /// Relative to the project root, may contain glob metacharacters
    pub path: PathBuf,
    /// Patterns that re-include paths an exclude would drop
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl SourceRule {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    pub fn with_include<S: Into<String>>(mut self, include: impl IntoIterator<Item = S>) -> Self {
        self.include = include.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exclude<S: Into<String>>(mut self, exclude: impl IntoIterator<Item = S>) -> Self {
        self.exclude = exclude.into_iter().map(Into::into).collect();
        self
    }

    /// The `.` source with the standard excludes
    pub fn project_default() -> Self {
        Self::new(".").with_exclude(DEFAULT_SOURCE_EXCLUDES)
    }
}

/// Kind of build directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildDirKind {
    /// Pulled from disk on start, never pushed back
    Cache,
    /// Created empty in RAM, never synced
    #[default]
    Scratch,
}

impl BuildDirKind {
    pub fn role(self) -> Role {
        match self {
            BuildDirKind::Cache => Role::Cache,
            BuildDirKind::Scratch => Role::Scratch,
        }
    }
}

/// A build output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDirRule {
    pub path: PathBuf,
    #[serde(rename = "type", default)]
    pub kind: BuildDirKind,
}

impl BuildDirRule {
    pub fn cache(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: BuildDirKind::Cache,
        }
    }

    pub fn scratch(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: BuildDirKind::Scratch,
        }
    }
}

/// What to do with unsynced changes when an interactive shell exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnExit {
    /// Ask before syncing
    #[default]
    Ask,
    /// Sync without asking
    #[serde(alias = "auto")]
    Always,
    /// Leave changes in RAM
    Never,
}

/// Sync behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPolicy {
    pub on_exit: OnExit,
    /// Mirror deletions for source paths
    pub delete: bool,
    pub backend: BackendKind,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            on_exit: OnExit::default(),
            delete: true,
            backend: BackendKind::default(),
        }
    }
}

/// Everything the engine needs to know about one project.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Durable on-disk project directory
    pub project_root: PathBuf,
    /// Volatile workspace directory
    pub ram_root: PathBuf,
    /// Stable identifier derived from `project_root`
    pub project_key: String,
    pub sources: Vec<SourceRule>,
    pub build_dirs: Vec<BuildDirRule>,
    pub sync: SyncPolicy,
    pub lock_timeout: Duration,
}

impl EngineConfig {
    /// Config with no rules, default policy, and a key derived from the
    /// project root.
    pub fn new(project_root: impl Into<PathBuf>, ram_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            project_key: project_key(&project_root),
            project_root,
            ram_root: ram_root.into(),
            sources: Vec::new(),
            build_dirs: Vec::new(),
            sync: SyncPolicy::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_source(mut self, rule: SourceRule) -> Self {
        self.sources.push(rule);
        self
    }

    pub fn with_build_dir(mut self, rule: BuildDirRule) -> Self {
        self.build_dirs.push(rule);
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Absolute RAM-side path for a relative tracked path
    pub fn ram_path(&self, relative: &Path) -> PathBuf {
        join_relative(&self.ram_root, relative)
    }

    /// Absolute disk-side path for a relative tracked path
    pub fn disk_path(&self, relative: &Path) -> PathBuf {
        join_relative(&self.project_root, relative)
    }
}

/// `<dir-name>-<7 hex chars of blake3(canonical path)>`
pub fn project_key(project_root: &Path) -> String {
    let canonical = project_root
        .canonicalize()
        .unwrap_or_else(|_| project_root.to_path_buf());
    let name = canonical
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "root".to_string());
    let hash = blake3::hash(canonical.as_os_str().as_encoded_bytes());
    format!("{name}-{}", &hash.to_hex()[..7])
}

/// Join without producing a trailing separator for the empty (root) path.
pub(crate) fn join_relative(root: &Path, relative: &Path) -> PathBuf {
    if relative.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_project_key_is_stable() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("myproj");
        std::fs::create_dir(&project).unwrap();

        let a = project_key(&project);
        let b = project_key(&project.join("."));
        assert_eq!(a, b);
        assert!(a.starts_with("myproj-"));
        assert_eq!(a.len(), "myproj-".len() + 7);
    }

    #[test]
    fn test_project_key_differs_per_path() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a/app");
        let b = tmp.path().join("b/app");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();
        assert_ne!(project_key(&a), project_key(&b));
    }

    #[test]
    fn test_root_path_join() {
        let config = EngineConfig::new("/home/me/p", "/dev/shm/p");
        assert_eq!(config.ram_path(Path::new("")), PathBuf::from("/dev/shm/p"));
        assert_eq!(config.disk_path(Path::new("src")), PathBuf::from("/home/me/p/src"));
    }

    #[test]
    fn test_defaults() {
        let policy = SyncPolicy::default();
        assert!(policy.delete);
        assert_eq!(policy.on_exit, OnExit::Ask);
        assert_eq!(BuildDirKind::default().role(), Role::Scratch);
    }
}
