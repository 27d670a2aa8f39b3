//! Workspace lifecycle controller
//!
//! Every mutating operation follows the same sequence: take the lock, load
//! the record, re-derive dirtiness with a dry run, ask the guard, then plan
//! and execute. `status` never takes the lock for longer than a save.

use chrono::{DateTime, Utc};
use mirror::Mirror;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classifier::{Classification, classify, display_relative, listing_depth};
use crate::config::{EngineConfig, OnExit};
use crate::context::{AutoDecline, ConfirmCallback, ProgressCallback};
use crate::error::{Error, Result};
use crate::guard::{self, Denial, ExitDecision, GuardedAction, Verdict};
use crate::listing::Listing;
use crate::medium::{self, MediumInfo};
use crate::planner::{self, OperationResult, SyncOutcome};
use crate::state::{InFlight, StateLock, StateStore, WorkspaceRecord};
use crate::types::{Direction, Role, Scope, WorkspaceState};

/// Options for [`Controller::start`]
#[derive(Debug, Clone, Copy, Default)]
pub struct StartOptions {
    /// Re-populate even if RAM holds unsynced source changes
    pub force: bool,
    /// Only refresh sources: no cache pulls, no scratch dirs
    pub sources_only: bool,
}

/// What `start` did.
#[derive(Debug, Clone, Serialize)]
pub struct StartReport {
    pub ram_root: PathBuf,
    pub medium: MediumInfo,
    /// The RAM root did not exist before
    pub created_root: bool,
    /// The workspace already had a record
    pub resumed: bool,
    pub results: Vec<OperationResult>,
    /// Cache dirs missing on disk, created empty in RAM
    pub empty_caches: Vec<PathBuf>,
    pub scratch_dirs: Vec<PathBuf>,
    pub state: WorkspaceState,
}

impl StartReport {
    pub fn changed_files(&self) -> usize {
        self.results.iter().map(|r| r.report.changed_files()).sum()
    }
}

/// A sync request from the CLI.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub direction: Direction,
    pub scope: Scope,
    pub force: bool,
}

impl SyncRequest {
    pub fn to_disk(scope: Scope) -> Self {
        Self {
            direction: Direction::ToDisk,
            scope,
            force: false,
        }
    }

    pub fn from_disk(scope: Scope, force: bool) -> Self {
        Self {
            direction: Direction::FromDisk,
            scope,
            force,
        }
    }
}

/// Changes a RAM → disk sync of the source paths would make.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingChanges {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Changed regular files
    pub files: usize,
}

/// Status of one role.
#[derive(Debug, Clone, Serialize)]
pub struct RoleStatus {
    pub role: Role,
    pub paths: Vec<String>,
    pub dirty: bool,
    pub dirty_files: usize,
    pub last_to_disk: Option<DateTime<Utc>>,
    pub last_from_disk: Option<DateTime<Utc>>,
}

/// Result of [`Controller::status`].
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub project_root: PathBuf,
    pub project_key: String,
    pub ram_root: PathBuf,
    pub exists: bool,
    pub state: WorkspaceState,
    pub medium: Option<MediumInfo>,
    pub backend: &'static str,
    /// Another process holds the lock; figures may be out of date
    pub possibly_stale: bool,
    /// An operation was interrupted; its role is indeterminate
    pub interrupted: Option<InFlight>,
    pub roles: Vec<RoleStatus>,
    pub pending: PendingChanges,
    pub on_exit: OnExit,
}

/// Result of [`Controller::destroy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "outcome")]
pub enum DestroyOutcome {
    Destroyed { forced: bool, discarded_files: usize },
    NotFound,
}

/// Drives the workspace through its lifecycle.
#[derive(Debug)]
pub struct Controller {
    config: EngineConfig,
    mirror: Mirror,
    store: StateStore,
}

impl Controller {
    pub fn new(config: EngineConfig, mirror: Mirror) -> Self {
        let store = StateStore::new(&config.ram_root);
        Self {
            config,
            mirror,
            store,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn backend_name(&self) -> &'static str {
        self.mirror.backend_name()
    }

    /// Whether a workspace record exists
    pub fn is_started(&self) -> bool {
        self.store.state_path().is_file()
    }

    /// Classify the configured rules against the current project tree.
    pub fn classify(&self) -> Result<Classification> {
        let depth = listing_depth(&self.config);
        let listing = if depth > 0 && self.config.project_root.is_dir() {
            Listing::capture(&self.config.project_root, depth)?
        } else {
            Listing::empty()
        };
        classify(&self.config, &listing)
    }

    /// Materialize the workspace: pull sources and caches, create scratch dirs.
    pub fn start<C: ConfirmCallback, P: ProgressCallback>(
        &self,
        options: StartOptions,
        confirm: &mut C,
        progress: &mut P,
    ) -> Result<StartReport> {
        let classification = self.classify()?;
        self.check_disk_sources(&classification)?;

        let ram_root = &self.config.ram_root;
        let medium = medium::probe(ram_root)?;
        if !medium.medium.is_volatile() {
            log::warn!(
                "{} is on {}, not a RAM-backed filesystem",
                ram_root.display(),
                medium.medium
            );
        }
        let created_root = !ram_root.exists();
        fs::create_dir_all(ram_root)?;
        let _lock = self.lock()?;

        let existing = self.store.load(&self.config.project_key)?;
        let resumed = existing.is_some();
        let mut record = match existing {
            Some(mut record) => {
                warn_interrupted(&record);
                let pending = self.detect_dirty(&classification, &mut record)?;
                self.record_dirty(&mut record, &pending)?;
                let verdict = guard::check_start(Some(&record), options.force);
                enforce(verdict, GuardedAction::Start, &record, confirm)?;
                record
            }
            None => WorkspaceRecord::new(&self.config),
        };
        record.in_flight = None;

        let roles = if options.sources_only {
            vec![Role::Source]
        } else {
            vec![Role::Source, Role::Cache]
        };
        let mut plan = planner::plan(
            &self.config,
            &classification,
            Direction::FromDisk,
            &Scope::Roles(roles),
        )?;

        let mut empty_caches = Vec::new();
        plan.operations.retain(|op| {
            let present = op.role != Role::Cache || op.from.is_dir();
            if !present {
                empty_caches.push(op.path.clone());
            }
            present
        });
        for path in &empty_caches {
            log::info!("cache '{}' not on disk, starting empty", display_relative(path));
            fs::create_dir_all(self.config.ram_path(path))?;
        }

        let outcome = planner::execute(
            &plan,
            &classification,
            &self.mirror,
            &self.store,
            &mut record,
            progress,
        )?;

        let mut scratch_dirs = Vec::new();
        if !options.sources_only {
            for tracked in classification.of_role(Role::Scratch) {
                fs::create_dir_all(self.config.ram_path(&tracked.path))?;
                scratch_dirs.push(tracked.path.clone());
            }
        }

        if resumed {
            self.detect_dirty(&classification, &mut record)?;
        } else {
            record.mark_clean(Role::Source);
        }
        self.store.save(&mut record)?;

        log::info!(
            "workspace {} ready at {} ({} file(s) copied)",
            self.config.project_key,
            ram_root.display(),
            outcome.changed_files()
        );
        Ok(StartReport {
            ram_root: ram_root.clone(),
            medium,
            created_root,
            resumed,
            results: outcome.results,
            empty_caches,
            scratch_dirs,
            state: record.state(),
        })
    }

    /// Report workspace state without holding the lock.
    pub fn status(&self) -> Result<StatusReport> {
        let ram_root = &self.config.ram_root;
        let mut report = StatusReport {
            project_root: self.config.project_root.clone(),
            project_key: self.config.project_key.clone(),
            ram_root: ram_root.clone(),
            exists: ram_root.is_dir(),
            state: WorkspaceState::Uninitialized,
            medium: medium::probe(ram_root).ok(),
            backend: self.backend_name(),
            possibly_stale: false,
            interrupted: None,
            roles: Vec::new(),
            pending: PendingChanges::default(),
            on_exit: self.config.sync.on_exit,
        };
        if !report.exists {
            return Ok(report);
        }
        let Some(mut record) = self.store.load(&self.config.project_key)? else {
            return Ok(report);
        };

        report.possibly_stale = self.store.is_locked();
        report.interrupted = record.in_flight.clone();
        let classification = self.classify()?;
        report.pending = self.detect_dirty(&classification, &mut record)?;

        if !report.possibly_stale {
            match self.store.lock(Duration::ZERO) {
                Ok(_lock) => self.store.save(&mut record)?,
                Err(Error::WorkspaceBusy { .. }) => report.possibly_stale = true,
                Err(e) => return Err(e),
            }
        }

        report.state = record.state();
        report.roles = Role::ALL
            .into_iter()
            .map(|role| {
                let r = record.roles.get(role);
                RoleStatus {
                    role,
                    paths: classification.of_role(role).map(|t| t.display()).collect(),
                    dirty: r.dirty,
                    dirty_files: r.dirty_files,
                    last_to_disk: r.last_to_disk,
                    last_from_disk: r.last_from_disk,
                }
            })
            .collect();
        Ok(report)
    }

    /// Sync in one direction.
    pub fn sync<C: ConfirmCallback, P: ProgressCallback>(
        &self,
        request: &SyncRequest,
        confirm: &mut C,
        progress: &mut P,
    ) -> Result<SyncOutcome> {
        let classification = self.classify()?;
        let plan = planner::plan(&self.config, &classification, request.direction, &request.scope)?;

        if !self.config.ram_root.is_dir() {
            return Err(Error::NotStarted(self.config.ram_root.clone()));
        }
        let _lock = self.lock()?;
        let Some(mut record) = self.store.load(&self.config.project_key)? else {
            return Err(Error::NotStarted(self.config.ram_root.clone()));
        };
        warn_interrupted(&record);

        let roles = plan.roles();
        if request.direction == Direction::FromDisk && roles.contains(&Role::Source) {
            let pending = self.detect_dirty(&classification, &mut record)?;
            self.record_dirty(&mut record, &pending)?;
        }
        let verdict = guard::check_sync(&record, request.direction, &roles, request.force);
        enforce(verdict, GuardedAction::SyncFromDisk, &record, confirm)?;

        record.in_flight = None;
        let outcome = planner::execute(
            &plan,
            &classification,
            &self.mirror,
            &self.store,
            &mut record,
            progress,
        )?;
        self.store.save(&mut record)?;
        Ok(outcome)
    }

    /// Remove the RAM root and its records.
    ///
    /// With `force`, a record or configuration that cannot be read does not
    /// block the removal; the discarded count is then unknown and reported
    /// as 0. The record is cleared and the workspace emptied while the lock
    /// is held. Only the metadata dir holding the lock file is removed after
    /// the lock is released, so a waiter that gets the lock finds no record.
    pub fn destroy(&self, force: bool) -> Result<DestroyOutcome> {
        let ram_root = &self.config.ram_root;
        if !ram_root.exists() {
            return Ok(DestroyOutcome::NotFound);
        }

        let lock = self.lock()?;
        let record = match self.observed_record() {
            Ok(record) => record,
            Err(e) if force => {
                log::warn!("destroying {} without a dirty check: {e}", ram_root.display());
                WorkspaceRecord::new(&self.config)
            }
            Err(e) => return Err(e),
        };

        let verdict = guard::check_destroy(&record, force);
        enforce(verdict, GuardedAction::Destroy, &record, &mut AutoDecline)?;

        let discarded_files = if record.is_dirty() {
            record.dirty_files()
        } else {
            0
        };
        self.store.clear(&self.config.project_key)?;
        let meta_dir = self.store.meta_dir();
        for entry in fs::read_dir(ram_root)? {
            let path = entry?.path();
            if path != meta_dir {
                remove_entry(&path)?;
            }
        }
        drop(lock);
        fs::remove_dir_all(ram_root)?;

        if discarded_files > 0 {
            log::warn!(
                "destroyed {} and discarded {discarded_files} unsynced file(s)",
                ram_root.display()
            );
        } else {
            log::info!("destroyed {}", ram_root.display());
        }
        Ok(DestroyOutcome::Destroyed {
            forced: force && discarded_files > 0,
            discarded_files,
        })
    }

    /// What the interactive shell should do on exit.
    pub fn exit_decision(&self) -> Result<ExitDecision> {
        let Some(mut record) = self.store.load(&self.config.project_key)? else {
            return Ok(ExitDecision::Nothing);
        };
        let classification = self.classify()?;
        self.detect_dirty(&classification, &mut record)?;
        Ok(guard::exit_decision(self.config.sync.on_exit, &record))
    }

    /// The stored record (or a fresh one) with dirtiness re-derived.
    fn observed_record(&self) -> Result<WorkspaceRecord> {
        let mut record = self
            .store
            .load(&self.config.project_key)?
            .unwrap_or_else(|| WorkspaceRecord::new(&self.config));
        let classification = self.classify()?;
        self.detect_dirty(&classification, &mut record)?;
        Ok(record)
    }

    /// Persist dirtiness seen before a guarded prompt, so a declined or
    /// denied operation still leaves it on record.
    fn record_dirty(&self, record: &mut WorkspaceRecord, pending: &PendingChanges) -> Result<()> {
        if pending.files > 0 {
            self.store.mark_dirty(record, Role::Source, pending.files)?;
        }
        Ok(())
    }

    fn lock(&self) -> Result<StateLock> {
        self.store.lock(self.config.lock_timeout)
    }

    /// Dry-run RAM → disk for every source path and store the result on the
    /// record.
    fn detect_dirty(
        &self,
        classification: &Classification,
        record: &mut WorkspaceRecord,
    ) -> Result<PendingChanges> {
        let plan = planner::plan(&self.config, classification, Direction::ToDisk, &Scope::Default)?;
        let mut pending = PendingChanges::default();
        for operation in &plan.operations {
            if !operation.from.is_dir() {
                continue;
            }
            let preview = self
                .mirror
                .preview(&operation.request(true))
                .map_err(|source| Error::MirrorFailure {
                    completed: Vec::new(),
                    failed: format!("{} (dry run)", operation.label()),
                    pending: Vec::new(),
                    source,
                })?;
            pending.created += preview.created();
            pending.updated += preview.updated();
            pending.deleted += preview.deleted();
            pending.files += preview.changed_files();
        }
        record.observe(Role::Source, pending.files);
        log::debug!("dirty detection: {} changed source file(s)", pending.files);
        Ok(pending)
    }

    fn check_disk_sources(&self, classification: &Classification) -> Result<()> {
        if !self.config.project_root.is_dir() {
            return Err(Error::config(format!(
                "project root {} does not exist",
                self.config.project_root.display()
            )));
        }
        for tracked in classification.of_role(Role::Source) {
            let disk = self.config.disk_path(&tracked.path);
            if !disk.is_dir() {
                return Err(Error::config(format!(
                    "source '{}' is not a directory on disk ({})",
                    tracked.display(),
                    disk.display()
                )));
            }
        }
        Ok(())
    }
}

fn enforce<C: ConfirmCallback>(
    verdict: Verdict,
    action: GuardedAction,
    record: &WorkspaceRecord,
    confirm: &mut C,
) -> Result<()> {
    match verdict {
        Verdict::Allow => Ok(()),
        Verdict::Deny(denial) => Err(Error::Denied(denial)),
        Verdict::AskConfirmation(prompt) => {
            if confirm.confirm(&prompt)? {
                log::warn!(
                    "{action}: overwriting {} unsynced file(s) in RAM",
                    record.dirty_files()
                );
                Ok(())
            } else {
                Err(Error::Denied(Denial::declined(action, record)))
            }
        }
    }
}

fn remove_entry(path: &Path) -> std::io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn warn_interrupted(record: &WorkspaceRecord) {
    if let Some(marker) = &record.in_flight {
        log::warn!(
            "a previous {} sync of {} ({}) was interrupted at {}; its state is indeterminate",
            marker.direction,
            display_relative(&marker.path),
            marker.role,
            marker.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BuildDirRule, SourceRule};
    use crate::context::{AutoConfirm, NoProgress};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Controller) {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("proj");
        fs::create_dir_all(project.join("src")).unwrap();
        fs::create_dir_all(project.join(".git")).unwrap();
        fs::create_dir_all(project.join("target/debug")).unwrap();
        fs::write(project.join("src/a.txt"), "v1").unwrap();
        fs::write(project.join("README.md"), "readme").unwrap();
        fs::write(project.join(".git/HEAD"), "ref: main").unwrap();
        fs::write(project.join("target/debug/app"), "bin").unwrap();

        let config = EngineConfig::new(&project, tmp.path().join("ram"))
            .with_source(SourceRule::project_default())
            .with_build_dir(BuildDirRule::cache("target"))
            .with_build_dir(BuildDirRule::cache("node_modules"))
            .with_build_dir(BuildDirRule::scratch("out"))
            .with_lock_timeout(Duration::from_millis(200));
        (tmp, Controller::new(config, Mirror::local()))
    }

    fn start(controller: &Controller) -> StartReport {
        controller
            .start(StartOptions::default(), &mut AutoConfirm, &mut NoProgress)
            .unwrap()
    }

    fn ram(controller: &Controller, rel: &str) -> PathBuf {
        controller.config().ram_root.join(rel)
    }

    fn disk(controller: &Controller, rel: &str) -> PathBuf {
        controller.config().project_root.join(rel)
    }

    #[test]
    fn test_start_populates_workspace() {
        let (_tmp, controller) = setup();
        let report = start(&controller);

        assert!(report.created_root);
        assert!(!report.resumed);
        assert_eq!(report.state, WorkspaceState::Populated);
        assert_eq!(fs::read_to_string(ram(&controller, "src/a.txt")).unwrap(), "v1");
        assert!(ram(&controller, "target/debug/app").exists());
        assert!(!ram(&controller, ".git").exists());
        assert!(ram(&controller, "out").is_dir());
        assert!(ram(&controller, "node_modules").is_dir());
        assert_eq!(report.empty_caches, vec![PathBuf::from("node_modules")]);
        assert!(controller.is_started());
    }

    #[test]
    fn test_start_is_idempotent() {
        let (_tmp, controller) = setup();
        assert!(start(&controller).changed_files() > 0);
        let again = start(&controller);
        assert!(again.resumed);
        assert_eq!(again.changed_files(), 0);
        assert_eq!(again.state, WorkspaceState::Populated);
    }

    #[test]
    fn test_sources_only_refresh() {
        let (_tmp, controller) = setup();
        let options = StartOptions {
            force: false,
            sources_only: true,
        };
        let report = controller.start(options, &mut AutoConfirm, &mut NoProgress).unwrap();
        assert!(report.scratch_dirs.is_empty());
        assert!(!ram(&controller, "target").exists());
        assert!(ram(&controller, "src/a.txt").exists());
    }

    #[test]
    fn test_edit_then_sync_back_then_destroy() {
        let (_tmp, controller) = setup();
        start(&controller);
        fs::write(ram(&controller, "src/a.txt"), "v2").unwrap();

        let status = controller.status().unwrap();
        assert_eq!(status.state, WorkspaceState::Dirty);
        assert_eq!(status.pending.updated, 1);

        let err = controller.destroy(false).unwrap_err();
        assert!(matches!(err, Error::Denied(_)));
        assert!(err.is_expected());
        assert!(ram(&controller, "src/a.txt").exists());

        let outcome = controller
            .sync(&SyncRequest::to_disk(Scope::Default), &mut AutoConfirm, &mut NoProgress)
            .unwrap();
        assert!(outcome.cleaned);
        assert_eq!(fs::read_to_string(disk(&controller, "src/a.txt")).unwrap(), "v2");

        let status = controller.status().unwrap();
        assert_eq!(status.state, WorkspaceState::Populated);
        assert_eq!(status.pending, PendingChanges::default());

        assert_eq!(
            controller.destroy(false).unwrap(),
            DestroyOutcome::Destroyed {
                forced: false,
                discarded_files: 0
            }
        );
        assert!(!controller.config().ram_root.exists());
        assert_eq!(controller.status().unwrap().state, WorkspaceState::Uninitialized);
        assert_eq!(controller.destroy(false).unwrap(), DestroyOutcome::NotFound);
    }

    #[test]
    fn test_forced_destroy_discards() {
        let (_tmp, controller) = setup();
        start(&controller);
        fs::write(ram(&controller, "src/new.txt"), "unsynced").unwrap();

        let outcome = controller.destroy(true).unwrap();
        assert_eq!(
            outcome,
            DestroyOutcome::Destroyed {
                forced: true,
                discarded_files: 1
            }
        );
        assert!(controller.store().load(&controller.config().project_key).unwrap().is_none());
        assert!(!disk(&controller, "src/new.txt").exists());
    }

    #[test]
    fn test_forced_destroy_with_corrupt_state() {
        let (_tmp, controller) = setup();
        start(&controller);
        fs::write(controller.store().state_path(), "not = [valid toml").unwrap();

        let err = controller.destroy(false).unwrap_err();
        assert!(matches!(err, Error::State { .. }));
        assert!(controller.config().ram_root.exists());

        assert_eq!(
            controller.destroy(true).unwrap(),
            DestroyOutcome::Destroyed {
                forced: false,
                discarded_files: 0
            }
        );
        assert!(!controller.config().ram_root.exists());
        assert!(controller.store().load(&controller.config().project_key).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_destroy_does_not_follow_symlinks() {
        let (_tmp, controller) = setup();
        start(&controller);
        std::os::unix::fs::symlink(disk(&controller, "src"), ram(&controller, "disk-src")).unwrap();

        controller.destroy(true).unwrap();
        assert!(!controller.config().ram_root.exists());
        assert_eq!(fs::read_to_string(disk(&controller, "src/a.txt")).unwrap(), "v1");
    }

    #[test]
    fn test_sync_single_file_both_directions() {
        let (_tmp, controller) = setup();
        start(&controller);
        fs::write(ram(&controller, "src/a.txt"), "v2").unwrap();
        fs::write(ram(&controller, "src/b.txt"), "unsynced").unwrap();
        let only_a = || Scope::Paths(vec![PathBuf::from("src/a.txt")]);

        let outcome = controller
            .sync(&SyncRequest::to_disk(only_a()), &mut AutoConfirm, &mut NoProgress)
            .unwrap();
        assert_eq!(outcome.changed_files(), 1);
        assert!(!outcome.cleaned);
        assert_eq!(fs::read_to_string(disk(&controller, "src/a.txt")).unwrap(), "v2");
        assert!(!disk(&controller, "src/b.txt").exists());

        fs::write(disk(&controller, "src/a.txt"), "disk edit").unwrap();
        controller
            .sync(&SyncRequest::from_disk(only_a(), true), &mut AutoConfirm, &mut NoProgress)
            .unwrap();
        assert_eq!(fs::read_to_string(ram(&controller, "src/a.txt")).unwrap(), "disk edit");
        assert_eq!(fs::read_to_string(ram(&controller, "src/b.txt")).unwrap(), "unsynced");

        fs::remove_file(ram(&controller, "src/a.txt")).unwrap();
        controller
            .sync(&SyncRequest::to_disk(only_a()), &mut AutoConfirm, &mut NoProgress)
            .unwrap();
        assert!(!disk(&controller, "src/a.txt").exists());
        assert!(disk(&controller, "README.md").exists());
        assert!(controller.store().load(&controller.config().project_key).unwrap().unwrap().in_flight.is_none());
    }

    #[test]
    fn test_from_disk_requires_force_and_confirmation() {
        let (_tmp, controller) = setup();
        start(&controller);
        fs::write(ram(&controller, "src/a.txt"), "ram edit").unwrap();
        fs::write(ram(&controller, "src/extra.txt"), "extra").unwrap();

        let denied = controller
            .sync(&SyncRequest::from_disk(Scope::Default, false), &mut AutoConfirm, &mut NoProgress)
            .unwrap_err();
        assert_eq!(denied.exit_code(), crate::error::exit::DENIED);
        let stored = controller.store().load(&controller.config().project_key).unwrap().unwrap();
        assert!(stored.is_dirty());
        assert_eq!(stored.dirty_files(), 2);

        let declined = controller
            .sync(&SyncRequest::from_disk(Scope::Default, true), &mut AutoDecline, &mut NoProgress)
            .unwrap_err();
        assert!(matches!(declined, Error::Denied(_)));
        assert_eq!(fs::read_to_string(ram(&controller, "src/a.txt")).unwrap(), "ram edit");

        controller
            .sync(&SyncRequest::from_disk(Scope::Default, true), &mut AutoConfirm, &mut NoProgress)
            .unwrap();
        assert_eq!(
            fs::read(ram(&controller, "src/a.txt")).unwrap(),
            fs::read(disk(&controller, "src/a.txt")).unwrap()
        );
        assert!(!ram(&controller, "src/extra.txt").exists());
        assert_eq!(controller.status().unwrap().state, WorkspaceState::Populated);
    }

    #[test]
    fn test_scratch_sync_rejected_without_touching_disk() {
        let (_tmp, controller) = setup();
        start(&controller);
        fs::write(ram(&controller, "out/obj.o"), "obj").unwrap();

        let request = SyncRequest::to_disk(Scope::Roles(vec![Role::Scratch]));
        let err = controller.sync(&request, &mut AutoConfirm, &mut NoProgress).unwrap_err();
        assert!(matches!(err, Error::InvalidRole { role: Role::Scratch, .. }));
        assert!(!disk(&controller, "out").exists());
    }

    #[test]
    fn test_sync_before_start() {
        let (_tmp, controller) = setup();
        let err = controller
            .sync(&SyncRequest::to_disk(Scope::Default), &mut AutoConfirm, &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::NotStarted(_)));
        assert!(!controller.config().ram_root.exists());
    }

    #[test]
    fn test_concurrent_mutation_is_busy() {
        let (_tmp, controller) = setup();
        start(&controller);
        let _held = controller.store().lock(Duration::from_millis(100)).unwrap();

        let other = Controller::new(controller.config().clone(), Mirror::local());
        let err = other
            .sync(&SyncRequest::to_disk(Scope::Default), &mut AutoConfirm, &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::WorkspaceBusy { .. }));
        assert!(err.is_retryable());

        let status = other.status().unwrap();
        assert!(status.possibly_stale);
    }

    #[test]
    fn test_interrupted_operation_is_reported_and_cleared() {
        let (_tmp, controller) = setup();
        start(&controller);
        let store = controller.store();
        let mut record = store.load(&controller.config().project_key).unwrap().unwrap();
        record.in_flight = Some(InFlight {
            role: Role::Source,
            path: PathBuf::new(),
            direction: Direction::ToDisk,
            started_at: Utc::now(),
        });
        store.save(&mut record).unwrap();

        let status = controller.status().unwrap();
        assert!(status.interrupted.is_some());

        controller
            .sync(&SyncRequest::to_disk(Scope::Default), &mut AutoConfirm, &mut NoProgress)
            .unwrap();
        assert!(controller.status().unwrap().interrupted.is_none());
    }

    #[test]
    fn test_explicit_path_sync() {
        let (_tmp, controller) = setup();
        start(&controller);
        fs::write(ram(&controller, "src/a.txt"), "v2").unwrap();
        fs::write(ram(&controller, "README.md"), "changed").unwrap();

        let request = SyncRequest::to_disk(Scope::Paths(vec![PathBuf::from("src")]));
        controller.sync(&request, &mut AutoConfirm, &mut NoProgress).unwrap();
        assert_eq!(fs::read_to_string(disk(&controller, "src/a.txt")).unwrap(), "v2");
        assert_eq!(fs::read_to_string(disk(&controller, "README.md")).unwrap(), "readme");
        assert_eq!(controller.status().unwrap().state, WorkspaceState::Dirty);

        let unknown = SyncRequest::to_disk(Scope::Paths(vec![PathBuf::from(".git/HEAD")]));
        let err = controller.sync(&unknown, &mut AutoConfirm, &mut NoProgress).unwrap_err();
        assert!(matches!(err, Error::UnknownPath(p) if p == Path::new(".git/HEAD")));
    }

    #[test]
    fn test_exit_decision_follows_policy() {
        let (_tmp, controller) = setup();
        start(&controller);
        assert_eq!(controller.exit_decision().unwrap(), ExitDecision::Nothing);
        fs::write(ram(&controller, "src/a.txt"), "v2").unwrap();
        assert!(matches!(controller.exit_decision().unwrap(), ExitDecision::Ask(_)));
    }
}
