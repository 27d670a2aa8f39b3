//! `.ramws.yml` loading and project discovery

use anyhow::{Context, Result};
use mirror::BackendKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use syncengine::{BuildDirRule, EngineConfig, OnExit, SourceRule, SyncPolicy};

use crate::shell::{ENV_ORIG_ROOT, ENV_WS_ROOT};

/// Config file name, looked up in the project root
pub const CONFIG_FILE: &str = ".ramws.yml";

const DEFAULT_ROOT: &str = "/dev/shm/ramws-${USER}/${PROJECT}";
const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 5;

/// Starter config written by `ramws init`
pub const TEMPLATE: &str = r#"# ramws workspace configuration
workspace:
  # ${USER} and ${PROJECT} are expanded; ${PROJECT} is <dir>-<hash>
  root: /dev/shm/ramws-${USER}/${PROJECT}

# Trees copied into RAM and synced back. Paths are relative to the project
# root and may be globs (e.g. crates/*).
sources:
  - path: .
    exclude:
      - .git/**
      - build/**
      - target/**
      - node_modules/**

# Build output. cache: pulled from disk on start, never pushed back.
# scratch: created empty in RAM, never synced.
build_dirs:
  - path: target
    type: scratch

sync:
  on_exit: ask # ask | always | never
  delete: true
  backend: auto # auto | rsync | local

lock:
  timeout_secs: 5
"#;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceSection {
    pub root: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncSection {
    #[serde(default)]
    pub on_exit: OnExit,
    #[serde(default = "default_true")]
    pub delete: bool,
    #[serde(default)]
    pub backend: BackendKind,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            on_exit: OnExit::default(),
            delete: true,
            backend: BackendKind::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockSection {
    #[serde(default = "default_lock_timeout")]
    pub timeout_secs: u64,
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_lock_timeout() -> u64 {
    DEFAULT_LOCK_TIMEOUT_SECS
}

/// Contents of `.ramws.yml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub workspace: WorkspaceSection,
    /// `None` means the default `.` source
    #[serde(default)]
    pub sources: Option<Vec<SourceRule>>,
    #[serde(default)]
    pub build_dirs: Vec<BuildDirRule>,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub lock: LockSection,
}

impl FileConfig {
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| {
            syncengine::Error::config(format!("{}: {e}", origin.display())).into()
        })
    }

    /// Resolve into the engine's configuration for `project_root`.
    pub fn to_engine(&self, project_root: &Path) -> Result<EngineConfig> {
        let key = syncengine::config::project_key(project_root);
        let template = self.workspace.root.as_deref().unwrap_or(DEFAULT_ROOT);
        let ram_root = expand_root(template, &key);

        if !ram_root.is_absolute() {
            return Err(syncengine::Error::config(format!(
                "workspace.root must be absolute, got {}",
                ram_root.display()
            ))
            .into());
        }
        let ram_root = resolve_existing(&ram_root);
        if ram_root.starts_with(project_root) || project_root.starts_with(&ram_root) {
            return Err(syncengine::Error::config(format!(
                "workspace.root {} overlaps the project at {}",
                ram_root.display(),
                project_root.display()
            ))
            .into());
        }

        let mut config = EngineConfig::new(project_root, ram_root);
        config.sources = self
            .sources
            .clone()
            .unwrap_or_else(|| vec![SourceRule::project_default()]);
        config.build_dirs = self.build_dirs.clone();
        config.sync = SyncPolicy {
            on_exit: self.sync.on_exit,
            delete: self.sync.delete,
            backend: self.sync.backend,
        };
        config.lock_timeout = Duration::from_secs(self.lock.timeout_secs);
        Ok(config)
    }
}

/// A project with its (possibly default) configuration.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    /// The file the config came from, if any
    pub config_path: Option<PathBuf>,
    pub file: FileConfig,
}

impl Project {
    /// Find the project for `start` and load its config.
    pub fn discover(start: &Path, explicit: Option<&Path>) -> Result<Self> {
        let start = map_from_workspace(start);
        let root = find_project_root(&start);

        let config_path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Some(root.join(CONFIG_FILE)).filter(|p| p.is_file()),
        };
        let file = match &config_path {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Could not read {}", path.display()))?;
                FileConfig::parse(&content, path)?
            }
            None => FileConfig::default(),
        };
        log::debug!(
            "project root {} (config: {})",
            root.display(),
            config_path
                .as_ref()
                .map_or_else(|| "defaults".to_string(), |p| p.display().to_string())
        );
        Ok(Self {
            root,
            config_path,
            file,
        })
    }

    pub fn engine_config(&self) -> Result<EngineConfig> {
        self.file.to_engine(&self.root)
    }
}

/// Nearest ancestor containing `.git`, else `start` itself.
pub fn find_project_root(start: &Path) -> PathBuf {
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .unwrap_or(start.as_path())
        .to_path_buf()
}

/// Inside a ramws shell the working directory is in RAM, where `.git` is not
/// copied. Map it back to the project on disk.
fn map_from_workspace(start: &Path) -> PathBuf {
    let (Ok(ws_root), Ok(orig_root)) = (std::env::var(ENV_WS_ROOT), std::env::var(ENV_ORIG_ROOT)) else {
        return start.to_path_buf();
    };
    match start.strip_prefix(resolve_existing(Path::new(&ws_root))) {
        Ok(rel) => Path::new(&orig_root).join(rel),
        Err(_) => start.to_path_buf(),
    }
}

/// Resolve symlinks in the longest existing prefix of `path` and append the
/// rest unchanged. `/dev/shm` is a symlink on some hosts, and paths derived
/// from the working directory are always physical.
pub fn resolve_existing(path: &Path) -> PathBuf {
    for existing in path.ancestors() {
        if let Ok(resolved) = existing.canonicalize() {
            return match path.strip_prefix(existing) {
                Ok(rest) if !rest.as_os_str().is_empty() => resolved.join(rest),
                _ => resolved,
            };
        }
    }
    path.to_path_buf()
}

/// Expand `${PROJECT}`, `${USER}`, `~` and other environment variables.
pub fn expand_root(template: &str, project_key: &str) -> PathBuf {
    let user = current_user();
    let substituted = template
        .replace("${PROJECT}", project_key)
        .replace("$PROJECT", project_key)
        .replace("${USER}", &user)
        .replace("$USER", &user);
    let expanded =
        shellexpand::full(&substituted).unwrap_or(std::borrow::Cow::Borrowed(&substituted));
    PathBuf::from(expanded.as_ref())
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .ok()
        .filter(|u| !u.is_empty())
        .or_else(|| {
            dirs::home_dir()
                .and_then(|h| h.file_name().map(|n| n.to_string_lossy().into_owned()))
        })
        .unwrap_or_else(|| "user".to_string())
}
