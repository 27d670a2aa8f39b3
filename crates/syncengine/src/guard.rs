//! Safety guard - decides whether an action may discard unsynced work
//!
//! The guard is pure policy: it looks at a [`WorkspaceRecord`] whose dirty
//! flags the caller has just refreshed, and returns a [`Verdict`].

use serde::Serialize;
use std::fmt;

use crate::config::OnExit;
use crate::state::WorkspaceRecord;
use crate::types::{Direction, Role};

/// Action the guard is asked about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GuardedAction {
    Start,
    SyncFromDisk,
    Destroy,
}

impl fmt::Display for GuardedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GuardedAction::Start => "start",
            GuardedAction::SyncFromDisk => "sync --from",
            GuardedAction::Destroy => "destroy",
        };
        f.write_str(s)
    }
}

/// Why an action was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Denial {
    pub action: GuardedAction,
    /// Roles holding unsynced changes
    pub roles: Vec<Role>,
    /// Unsynced files observed
    pub files: usize,
    /// What the user can do about it
    pub hint: String,
}

impl Denial {
    fn unsynced(action: GuardedAction, record: &WorkspaceRecord) -> Self {
        let hint = match action {
            GuardedAction::Destroy => {
                "run `ramws sync --back` first, or pass --force to discard them"
            }
            GuardedAction::Start | GuardedAction::SyncFromDisk => {
                "run `ramws sync --back` first, or pass --force to overwrite them"
            }
        };
        Self {
            action,
            roles: record.dirty_roles(),
            files: record.dirty_files(),
            hint: hint.to_string(),
        }
    }

    /// Denial for a confirmation the user declined
    pub fn declined(action: GuardedAction, record: &WorkspaceRecord) -> Self {
        Self {
            hint: "nothing was changed".to_string(),
            ..Self::unsynced(action, record)
        }
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let roles = self
            .roles
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "refusing to {}: {} unsynced {} file(s) in RAM; {}",
            self.action, self.files, roles, self.hint
        )
    }
}

/// Guard decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny(Denial),
    /// Allowed once the caller's confirmation callback agrees
    AskConfirmation(String),
}

/// What to do when an interactive shell exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitDecision {
    Nothing,
    /// Sync to disk without asking
    Sync,
    /// Ask with this prompt, sync if confirmed
    Ask(String),
}

/// Destroying a dirty workspace needs `--force`.
pub fn check_destroy(record: &WorkspaceRecord, force: bool) -> Verdict {
    if !record.is_dirty() {
        return Verdict::Allow;
    }
    if force {
        log::warn!(
            "force-destroying workspace with {} unsynced file(s)",
            record.dirty_files()
        );
        return Verdict::Allow;
    }
    Verdict::Deny(Denial::unsynced(GuardedAction::Destroy, record))
}

/// Pulling from disk over dirty sources needs `--force` and a confirmation.
/// Pushing to disk is always allowed.
pub fn check_sync(record: &WorkspaceRecord, direction: Direction, roles: &[Role], force: bool) -> Verdict {
    match direction {
        Direction::ToDisk => Verdict::Allow,
        Direction::FromDisk if !roles.contains(&Role::Source) => Verdict::Allow,
        Direction::FromDisk => check_overwrite(GuardedAction::SyncFromDisk, record, force),
    }
}

/// Re-populating an existing dirty workspace follows the `sync --from` rule.
pub fn check_start(record: Option<&WorkspaceRecord>, force: bool) -> Verdict {
    match record {
        None => Verdict::Allow,
        Some(record) => check_overwrite(GuardedAction::Start, record, force),
    }
}

fn check_overwrite(action: GuardedAction, record: &WorkspaceRecord, force: bool) -> Verdict {
    if !record.is_dirty() {
        return Verdict::Allow;
    }
    if !force {
        return Verdict::Deny(Denial::unsynced(action, record));
    }
    Verdict::AskConfirmation(format!(
        "Discard {} unsynced source file(s) in RAM and copy from disk?",
        record.dirty_files()
    ))
}

/// Evaluate the on-exit policy.
pub fn exit_decision(policy: OnExit, record: &WorkspaceRecord) -> ExitDecision {
    if !record.is_dirty() {
        return ExitDecision::Nothing;
    }
    match policy {
        OnExit::Never => ExitDecision::Nothing,
        OnExit::Always => ExitDecision::Sync,
        OnExit::Ask => ExitDecision::Ask(format!(
            "{} unsynced source file(s) in RAM. Sync back to disk?",
            record.dirty_files()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn record(dirty_files: usize) -> WorkspaceRecord {
        let mut record = WorkspaceRecord::new(&EngineConfig::new("/p", "/r"));
        record.observe(Role::Source, dirty_files);
        record
    }

    #[test]
    fn test_destroy() {
        assert_eq!(check_destroy(&record(0), false), Verdict::Allow);
        assert_eq!(check_destroy(&record(2), true), Verdict::Allow);
        match check_destroy(&record(2), false) {
            Verdict::Deny(denial) => {
                assert_eq!(denial.roles, vec![Role::Source]);
                assert_eq!(denial.files, 2);
                assert!(denial.to_string().contains("--force"));
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[test]
    fn test_sync_directions() {
        let dirty = record(1);
        assert_eq!(check_sync(&dirty, Direction::ToDisk, &[Role::Source], false), Verdict::Allow);
        assert!(matches!(
            check_sync(&dirty, Direction::FromDisk, &[Role::Source], false),
            Verdict::Deny(_)
        ));
        assert!(matches!(
            check_sync(&dirty, Direction::FromDisk, &[Role::Source], true),
            Verdict::AskConfirmation(_)
        ));
        assert_eq!(check_sync(&dirty, Direction::FromDisk, &[Role::Cache], false), Verdict::Allow);
        assert_eq!(check_sync(&record(0), Direction::FromDisk, &[Role::Source], false), Verdict::Allow);
    }

    #[test]
    fn test_start() {
        assert_eq!(check_start(None, false), Verdict::Allow);
        assert_eq!(check_start(Some(&record(0)), false), Verdict::Allow);
        match check_start(Some(&record(4)), false) {
            Verdict::Deny(denial) => assert_eq!(denial.action, GuardedAction::Start),
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[test]
    fn test_exit_policy() {
        assert_eq!(exit_decision(OnExit::Ask, &record(0)), ExitDecision::Nothing);
        assert_eq!(exit_decision(OnExit::Never, &record(3)), ExitDecision::Nothing);
        assert_eq!(exit_decision(OnExit::Always, &record(3)), ExitDecision::Sync);
        assert!(matches!(exit_decision(OnExit::Ask, &record(3)), ExitDecision::Ask(p) if p.contains('3')));
    }
}
