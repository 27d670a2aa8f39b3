//! Workspace state persistence and the workspace lock
//!
//! The record lives inside the RAM root, under `.ramws/state.toml`, so it
//! disappears together with the workspace. Writes go to a temp file that is
//! renamed over the previous version.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::types::{Direction, Role, WorkspaceState};

/// Metadata directory inside the RAM root
pub const META_DIR: &str = ".ramws";
const STATE_FILE: &str = "state.toml";
const LOCK_FILE: &str = "lock";
const STATE_VERSION: u32 = 1;
const LOCK_POLL: Duration = Duration::from_millis(50);

/// Sync bookkeeping for one role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_to_disk: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_from_disk: Option<DateTime<Utc>>,
    /// Unsynced RAM-side changes observed (source only)
    #[serde(default)]
    pub dirty: bool,
    /// Changed files seen by the last detection
    #[serde(default)]
    pub dirty_files: usize,
}

impl RoleRecord {
    /// Most recent sync in either direction
    pub fn last_sync(&self) -> Option<(Direction, DateTime<Utc>)> {
        match (self.last_to_disk, self.last_from_disk) {
            (Some(to), Some(from)) if to >= from => Some((Direction::ToDisk, to)),
            (_, Some(from)) => Some((Direction::FromDisk, from)),
            (Some(to), None) => Some((Direction::ToDisk, to)),
            (None, None) => None,
        }
    }
}

/// Per-role records. One field per role keeps the TOML keys readable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecords {
    #[serde(default)]
    pub source: RoleRecord,
    #[serde(default)]
    pub cache: RoleRecord,
    #[serde(default)]
    pub scratch: RoleRecord,
}

impl RoleRecords {
    pub fn get(&self, role: Role) -> &RoleRecord {
        match role {
            Role::Source => &self.source,
            Role::Cache => &self.cache,
            Role::Scratch => &self.scratch,
        }
    }

    pub fn get_mut(&mut self, role: Role) -> &mut RoleRecord {
        match role {
            Role::Source => &mut self.source,
            Role::Cache => &mut self.cache,
            Role::Scratch => &mut self.scratch,
        }
    }
}

/// Marker for a mirror operation that was started but not confirmed done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlight {
    pub role: Role,
    pub path: PathBuf,
    pub direction: Direction,
    pub started_at: DateTime<Utc>,
}

/// Persisted workspace metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    pub version: u32,
    pub project_key: String,
    pub project_root: PathBuf,
    pub ram_root: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_flight: Option<InFlight>,
    #[serde(default)]
    pub roles: RoleRecords,
}

impl WorkspaceRecord {
    pub fn new(config: &EngineConfig) -> Self {
        let now = Utc::now();
        Self {
            version: STATE_VERSION,
            project_key: config.project_key.clone(),
            project_root: config.project_root.clone(),
            ram_root: config.ram_root.clone(),
            created_at: now,
            updated_at: now,
            in_flight: None,
            roles: RoleRecords::default(),
        }
    }

    pub fn state(&self) -> WorkspaceState {
        if self.is_dirty() {
            WorkspaceState::Dirty
        } else {
            WorkspaceState::Populated
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.roles.source.dirty
    }

    /// Roles with unsynced changes
    pub fn dirty_roles(&self) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|r| self.roles.get(*r).dirty)
            .collect()
    }

    /// Number of unsynced files across dirty roles
    pub fn dirty_files(&self) -> usize {
        Role::ALL
            .into_iter()
            .map(|r| self.roles.get(r))
            .filter(|r| r.dirty)
            .map(|r| r.dirty_files)
            .sum()
    }

    pub fn record_sync(&mut self, role: Role, direction: Direction, at: DateTime<Utc>) {
        let record = self.roles.get_mut(role);
        match direction {
            Direction::ToDisk => record.last_to_disk = Some(at),
            Direction::FromDisk => record.last_from_disk = Some(at),
        }
    }

    /// Record the result of a dirtiness detection.
    pub fn observe(&mut self, role: Role, changed_files: usize) {
        let record = self.roles.get_mut(role);
        record.dirty = changed_files > 0;
        record.dirty_files = changed_files;
    }

    pub fn mark_clean(&mut self, role: Role) {
        self.observe(role, 0);
    }
}

/// Reads and writes the workspace record and owns the workspace lock.
#[derive(Debug, Clone)]
pub struct StateStore {
    ram_root: PathBuf,
}

impl StateStore {
    pub fn new(ram_root: impl Into<PathBuf>) -> Self {
        Self {
            ram_root: ram_root.into(),
        }
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.ram_root.join(META_DIR)
    }

    pub fn state_path(&self) -> PathBuf {
        self.meta_dir().join(STATE_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.meta_dir().join(LOCK_FILE)
    }

    /// Load the record for `project_key`, if the workspace has one.
    pub fn load(&self, project_key: &str) -> Result<Option<WorkspaceRecord>> {
        let path = self.state_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: WorkspaceRecord = toml::from_str(&content).map_err(|e| Error::State {
            path: path.clone(),
            message: e.to_string(),
        })?;

        if record.version > STATE_VERSION {
            return Err(Error::State {
                path,
                message: format!("written by a newer ramws (state version {})", record.version),
            });
        }
        if record.project_key != project_key {
            return Err(Error::config(format!(
                "{} already holds a workspace for {} ({})",
                self.ram_root.display(),
                record.project_root.display(),
                record.project_key
            )));
        }
        log::debug!("loaded workspace state from {}", path.display());
        Ok(Some(record))
    }

    /// Persist the record, bumping `updated_at`.
    pub fn save(&self, record: &mut WorkspaceRecord) -> Result<()> {
        record.updated_at = Utc::now();
        let path = self.state_path();
        fs::create_dir_all(self.meta_dir())?;

        let content = toml::to_string_pretty(record).map_err(|e| Error::State {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;
        log::debug!("saved workspace state to {}", path.display());
        Ok(())
    }

    /// Record a completed sync and persist it.
    pub fn record_sync(
        &self,
        record: &mut WorkspaceRecord,
        role: Role,
        direction: Direction,
        at: DateTime<Utc>,
    ) -> Result<()> {
        record.record_sync(role, direction, at);
        self.save(record)
    }

    /// Record unsynced changes for a role and persist it.
    pub fn mark_dirty(&self, record: &mut WorkspaceRecord, role: Role, files: usize) -> Result<()> {
        record.observe(role, files.max(1));
        self.save(record)
    }

    /// Remove the record for `project_key`. Missing state is not an error.
    pub fn clear(&self, project_key: &str) -> Result<()> {
        match self.load(project_key) {
            Ok(None) => return Ok(()),
            Ok(Some(_)) | Err(Error::State { .. }) => {}
            Err(e) => return Err(e),
        }
        match fs::remove_file(self.state_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Take the exclusive workspace lock, waiting at most `timeout`.
    pub fn lock(&self, timeout: Duration) -> Result<StateLock> {
        fs::create_dir_all(self.meta_dir())?;
        let path = self.lock_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let started = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    log::debug!("acquired workspace lock {}", path.display());
                    return Ok(StateLock { file, path });
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(Error::WorkspaceBusy { lock: path, waited });
                    }
                    std::thread::sleep(LOCK_POLL.min(timeout - waited));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Whether another handle currently holds the lock. Never blocks.
    pub fn is_locked(&self) -> bool {
        let Ok(file) = File::open(self.lock_path()) else {
            return false;
        };
        match FileExt::try_lock_shared(&file) {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                false
            }
            Err(_) => true,
        }
    }
}

/// Held workspace lock; released on drop.
#[derive(Debug)]
pub struct StateLock {
    file: File,
    path: PathBuf,
}

impl StateLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            log::debug!("unlocking {}: {e}", self.path.display());
        }
    }
}
