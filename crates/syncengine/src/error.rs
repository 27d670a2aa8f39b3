use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::guard::Denial;
use crate::types::{Direction, Role};

/// Process exit codes, one per error category.
pub mod exit {
    pub const OTHER: u8 = 1;
    pub const UNKNOWN_PATH: u8 = 64;
    pub const INVALID_ROLE: u8 = 65;
    pub const NOT_STARTED: u8 = 66;
    pub const MIRROR_FAILURE: u8 = 74;
    pub const WORKSPACE_BUSY: u8 = 75;
    pub const DENIED: u8 = 77;
    pub const CONFIGURATION: u8 = 78;
}

/// Errors raised by the workspace sync engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or conflicting configuration. Nothing was changed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A requested path is not covered by any source or build-dir rule
    #[error("unknown path '{}': not covered by any source or build_dirs rule", .0.display())]
    UnknownPath(PathBuf),

    /// The role does not permit the requested direction
    #[error("{role} paths cannot be synced {direction}{}", path_suffix(.path.as_ref()))]
    InvalidRole {
        role: Role,
        direction: Direction,
        path: Option<PathBuf>,
    },

    /// Another process holds the workspace lock
    #[error("workspace is busy: lock {} held by another process (waited {waited:?})", .lock.display())]
    WorkspaceBusy { lock: PathBuf, waited: Duration },

    /// Refused by the safety guard
    #[error("{0}")]
    Denied(Denial),

    /// A mirror operation failed part-way through a plan
    #[error("sync failed at {failed} ({} completed, {} not started): {source}", .completed.len(), .pending.len())]
    MirrorFailure {
        completed: Vec<String>,
        failed: String,
        pending: Vec<String>,
        #[source]
        source: mirror::Error,
    },

    /// No workspace has been started for this project
    #[error("no workspace at {}; run `ramws start` first", .0.display())]
    NotStarted(PathBuf),

    /// State file could not be read or written
    #[error("state file {}: {message}", .path.display())]
    State { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn path_suffix(path: Option<&PathBuf>) -> String {
    path.map(|p| format!(" ({})", p.display()))
        .unwrap_or_default()
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// Exit code the CLI should terminate with
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Configuration(_) => exit::CONFIGURATION,
            Error::UnknownPath(_) => exit::UNKNOWN_PATH,
            Error::InvalidRole { .. } => exit::INVALID_ROLE,
            Error::WorkspaceBusy { .. } => exit::WORKSPACE_BUSY,
            Error::Denied(_) => exit::DENIED,
            Error::MirrorFailure { .. } => exit::MIRROR_FAILURE,
            Error::NotStarted(_) => exit::NOT_STARTED,
            Error::State { .. } | Error::Io(_) => exit::OTHER,
        }
    }

    /// Returns true if running the same command again later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::WorkspaceBusy { .. })
    }

    /// Returns true for refusals that are part of normal operation
    pub fn is_expected(&self) -> bool {
        matches!(self, Error::Denied(_))
    }
}

/// Result type for sync engine operations
pub type Result<T> = std::result::Result<T, Error>;
