//! Core types for the sync engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Role of a tracked path. Closed set: every match over it is exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Tracked project content, synced in both directions
    Source,
    /// Disposable build cache, only ever pulled from disk
    Cache,
    /// RAM-only build output, never synced
    Scratch,
}

impl Role {
    /// All roles, in display order
    pub const ALL: [Role; 3] = [Role::Source, Role::Cache, Role::Scratch];

    /// The permitted-operation table.
    pub fn permits(self, direction: Direction) -> bool {
        match (self, direction) {
            (Role::Source, Direction::ToDisk | Direction::FromDisk) => true,
            (Role::Cache, Direction::FromDisk) => true,
            (Role::Cache, Direction::ToDisk) => false,
            (Role::Scratch, Direction::ToDisk | Direction::FromDisk) => false,
        }
    }

    /// Whether a sync in this role mirrors deletions, given the configured
    /// policy for sources.
    pub fn mirrors_deletions(self, source_delete: bool) -> bool {
        match self {
            Role::Source => source_delete,
            Role::Cache | Role::Scratch => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Source => "source",
            Role::Cache => "cache",
            Role::Scratch => "scratch",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(Role::Source),
            "cache" => Ok(Role::Cache),
            "scratch" => Ok(Role::Scratch),
            other => Err(format!("unknown role '{other}' (expected source, cache or scratch)")),
        }
    }
}

/// Direction of a sync between the RAM copy and the disk copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// RAM → disk
    ToDisk,
    /// disk → RAM
    FromDisk,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::ToDisk => "to-disk",
            Direction::FromDisk => "from-disk",
        }
    }

    /// Arrow used in progress lines
    pub fn arrow(self) -> &'static str {
        match self {
            Direction::ToDisk => "RAM → disk",
            Direction::FromDisk => "disk → RAM",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived lifecycle state of a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceState {
    /// No RAM root has been materialized
    Uninitialized,
    /// RAM copy matches disk as of the last sync
    Populated,
    /// Source files in RAM changed since the last to-disk sync
    Dirty,
    /// RAM root removed and records purged
    Destroyed,
}

impl fmt::Display for WorkspaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkspaceState::Uninitialized => "uninitialized",
            WorkspaceState::Populated => "populated",
            WorkspaceState::Dirty => "dirty",
            WorkspaceState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Which tracked paths a sync covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Scope {
    /// Every source path
    #[default]
    Default,
    /// Every tracked path with one of these roles
    Roles(Vec<Role>),
    /// Explicit paths, each a tracked path or a descendant of one
    Paths(Vec<PathBuf>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permitted_operation_table() {
        assert!(Role::Source.permits(Direction::ToDisk));
        assert!(Role::Source.permits(Direction::FromDisk));
        assert!(Role::Cache.permits(Direction::FromDisk));
        assert!(!Role::Cache.permits(Direction::ToDisk));
        assert!(!Role::Scratch.permits(Direction::ToDisk));
        assert!(!Role::Scratch.permits(Direction::FromDisk));
    }

    #[test]
    fn test_deletion_policy() {
        assert!(!Role::Source.mirrors_deletions(false));
        assert!(Role::Source.mirrors_deletions(true));
        assert!(Role::Cache.mirrors_deletions(false));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("cache".parse::<Role>().unwrap(), Role::Cache);
        assert!("build".parse::<Role>().is_err());
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::ToDisk.to_string(), "to-disk");
        assert_eq!(Direction::FromDisk.arrow(), "disk → RAM");
    }
}
