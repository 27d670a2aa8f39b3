//! Sync planner - turns a scope into ordered mirror operations and runs them

use chrono::Utc;
use mirror::{Mirror, MirrorReport, MirrorRequest};
use mirror::filter::rebase_patterns;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::classifier::{Classification, PathClass, TrackedPath, display_relative, normalize_relative};
use crate::config::EngineConfig;
use crate::context::ProgressCallback;
use crate::error::{Error, Result};
use crate::state::{InFlight, StateStore, WorkspaceRecord};
use crate::types::{Direction, Role, Scope};

/// One mirror call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorOperation {
    /// Index of the tracked path this operation belongs to
    pub tracked: usize,
    pub role: Role,
    /// Relative path synced, the tracked path itself or a descendant
    pub path: PathBuf,
    pub direction: Direction,
    pub from: PathBuf,
    pub to: PathBuf,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub skip: Vec<String>,
    pub delete: bool,
    /// Single entry of `from`/`to` the operation is narrowed to, used when
    /// the requested path is not a directory on the sending side
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    /// Covers the whole tracked path, not just a subtree
    pub full: bool,
}

impl MirrorOperation {
    fn for_subtree(
        config: &EngineConfig,
        tracked: &TrackedPath,
        relative: &Path,
        direction: Direction,
    ) -> Self {
        let sub = relative.strip_prefix(&tracked.path).unwrap_or(Path::new(""));
        let full = sub.as_os_str().is_empty();
        let sending = match direction {
            Direction::ToDisk => config.ram_path(relative),
            Direction::FromDisk => config.disk_path(relative),
        };

        // A file, or a path gone from the sending side, is synced as one
        // entry of its parent directory.
        let (root, entry) = match (relative.parent(), relative.file_name()) {
            (Some(parent), Some(name)) if !full && !sending.is_dir() => {
                (parent, Some(name.to_string_lossy().into_owned()))
            }
            _ => (relative, None),
        };
        let base = root.strip_prefix(&tracked.path).unwrap_or(Path::new(""));

        let (ram, disk) = (config.ram_path(root), config.disk_path(root));
        let (from, to) = match direction {
            Direction::ToDisk => (ram, disk),
            Direction::FromDisk => (disk, ram),
        };
        Self {
            tracked: tracked.index,
            role: tracked.role,
            path: relative.to_path_buf(),
            direction,
            from,
            to,
            include: rebase_patterns(&tracked.include, base),
            exclude: rebase_patterns(&tracked.exclude, base),
            skip: rebase_patterns(&tracked.skip, base),
            delete: tracked.role.mirrors_deletions(config.sync.delete),
            entry,
            full,
        }
    }

    fn for_tracked(config: &EngineConfig, tracked: &TrackedPath, direction: Direction) -> Self {
        Self::for_subtree(config, tracked, &tracked.path, direction)
    }

    /// The mirror request for this operation
    pub fn request(&self, dry_run: bool) -> MirrorRequest {
        let request = MirrorRequest::new(&self.from, &self.to)
            .with_include(self.include.clone())
            .with_exclude(self.exclude.clone())
            .with_skip(self.skip.clone())
            .with_delete(self.delete);
        let request = match &self.entry {
            Some(entry) => request.with_entry(entry.clone()),
            None => request,
        };
        if dry_run { request.dry_run() } else { request }
    }

    /// `src (source)` style label for messages
    pub fn label(&self) -> String {
        format!("{} ({})", display_relative(&self.path), self.role)
    }
}

/// Ordered operations for one direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub direction: Direction,
    pub operations: Vec<MirrorOperation>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Roles touched by the plan, in role order
    pub fn roles(&self) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|r| self.operations.iter().any(|op| op.role == *r))
            .collect()
    }

    /// Whether every tracked path of `role` is synced in full
    pub fn covers_role(&self, role: Role, classification: &Classification) -> bool {
        classification.of_role(role).all(|t| {
            self.operations
                .iter()
                .any(|op| op.full && op.tracked == t.index)
        })
    }
}

/// One successful operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult {
    pub operation: MirrorOperation,
    pub report: MirrorReport,
}

/// Everything a plan execution did.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub direction: Direction,
    pub results: Vec<OperationResult>,
    /// Whether the run cleared the source dirty flag
    pub cleaned: bool,
}

impl SyncOutcome {
    pub fn changed_files(&self) -> usize {
        self.results.iter().map(|r| r.report.changed_files()).sum()
    }
}

/// Build a plan. Every requested path and role is validated before anything
/// is returned, so an invalid request never starts a partial sync.
pub fn plan(
    config: &EngineConfig,
    classification: &Classification,
    direction: Direction,
    scope: &Scope,
) -> Result<SyncPlan> {
    let mut operations = match scope {
        Scope::Default => classification
            .of_role(Role::Source)
            .map(|t| MirrorOperation::for_tracked(config, t, direction))
            .collect(),
        Scope::Roles(roles) => {
            for role in roles {
                check_role(*role, direction, None)?;
            }
            classification
                .tracked()
                .iter()
                .filter(|t| roles.contains(&t.role))
                .map(|t| MirrorOperation::for_tracked(config, t, direction))
                .collect()
        }
        Scope::Paths(paths) => plan_paths(config, classification, direction, paths)?,
    };

    operations.sort_by(|a, b| a.tracked.cmp(&b.tracked).then_with(|| a.path.cmp(&b.path)));
    operations.dedup_by(|a, b| a.path == b.path);
    log::debug!("planned {} {direction} operation(s)", operations.len());
    Ok(SyncPlan {
        direction,
        operations,
    })
}

fn plan_paths(
    config: &EngineConfig,
    classification: &Classification,
    direction: Direction,
    paths: &[PathBuf],
) -> Result<Vec<MirrorOperation>> {
    let mut operations = Vec::with_capacity(paths.len());
    for requested in paths {
        let relative = relative_to_roots(config, requested)
            .ok_or_else(|| Error::UnknownPath(requested.clone()))?;
        let (role, index) = match classification.resolve(&relative) {
            PathClass::Tracked { role, index } => (role, index),
            PathClass::Ignored => return Err(Error::UnknownPath(requested.clone())),
        };
        check_role(role, direction, Some(&relative))?;
        let tracked = classification
            .get(index)
            .ok_or_else(|| Error::UnknownPath(requested.clone()))?;
        operations.push(MirrorOperation::for_subtree(config, tracked, &relative, direction));
    }
    Ok(operations)
}

fn check_role(role: Role, direction: Direction, path: Option<&Path>) -> Result<()> {
    if role.permits(direction) {
        Ok(())
    } else {
        Err(Error::InvalidRole {
            role,
            direction,
            path: path.map(Path::to_path_buf),
        })
    }
}

/// Accept paths relative to the project root, or absolute paths under the
/// project root or the RAM root.
fn relative_to_roots(config: &EngineConfig, path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        let rel = path
            .strip_prefix(&config.ram_root)
            .or_else(|_| path.strip_prefix(&config.project_root))
            .ok()?;
        normalize_relative(rel)
    } else {
        normalize_relative(path)
    }
}

/// Run a plan in order, persisting progress after every operation.
///
/// On failure the completed operations keep their updated records, the
/// failed and pending ones are untouched, and the error lists all three.
pub fn execute<P: ProgressCallback>(
    plan: &SyncPlan,
    classification: &Classification,
    mirror: &Mirror,
    store: &StateStore,
    record: &mut WorkspaceRecord,
    progress: &mut P,
) -> Result<SyncOutcome> {
    progress.on_plan_start(plan.direction, plan.len());
    let mut results = Vec::with_capacity(plan.len());

    for (i, operation) in plan.operations.iter().enumerate() {
        record.in_flight = Some(InFlight {
            role: operation.role,
            path: operation.path.clone(),
            direction: operation.direction,
            started_at: Utc::now(),
        });
        store.save(record)?;
        progress.on_operation_start(operation);

        match mirror.reconcile(&operation.request(false)) {
            Ok(report) => {
                log::info!(
                    "{} {}: {} created, {} updated, {} deleted",
                    operation.direction.arrow(),
                    operation.label(),
                    report.created(),
                    report.updated(),
                    report.deleted()
                );
                record.in_flight = None;
                store.record_sync(record, operation.role, operation.direction, Utc::now())?;
                progress.on_operation_complete(operation, &report);
                results.push(OperationResult {
                    operation: operation.clone(),
                    report,
                });
            }
            Err(source) => {
                progress.on_operation_failed(operation, &source);
                record.in_flight = None;
                store.save(record)?;
                return Err(Error::MirrorFailure {
                    completed: results.iter().map(|r| r.operation.label()).collect(),
                    failed: operation.label(),
                    pending: plan.operations[i + 1..].iter().map(MirrorOperation::label).collect(),
                    source,
                });
            }
        }
    }

    let cleaned = plan.direction == Direction::ToDisk
        && plan.covers_role(Role::Source, classification)
        && classification.of_role(Role::Source).next().is_some();
    if cleaned {
        record.mark_clean(Role::Source);
        store.save(record)?;
    }
    progress.on_plan_complete();

    Ok(SyncOutcome {
        direction: plan.direction,
        results,
        cleaned,
    })
}
