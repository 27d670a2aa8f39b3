//! # syncengine
//!
//! Lifecycle engine for RAM-backed project workspaces.
//!
//! A project on durable storage is mirrored into a volatile directory (for
//! example under `/dev/shm`). The engine decides which paths take part in a
//! sync and in which direction, keeps a persisted record of what was synced
//! when, and refuses to throw away unsynced work unless forced.
//!
//! ## Architecture
//!
//! 1. **Classify** every path into a [`Role`]: source, cache or scratch
//! 2. **Guard** the request against the current dirtiness
//! 3. **Plan** the ordered mirror operations for a [`Scope`]
//! 4. **Execute** them through a [`mirror::Mirror`], persisting state after
//!    every operation
//!
//! ## Example
//!
//! ```no_run
//! use mirror::Mirror;
//! use syncengine::{
//!     AutoConfirm, Controller, EngineConfig, NoProgress, Scope, SourceRule, StartOptions,
//!     SyncRequest,
//! };
//!
//! let config = EngineConfig::new("/home/me/project", "/dev/shm/ramws-me/project")
//!     .with_source(SourceRule::project_default());
//! let controller = Controller::new(config, Mirror::new());
//!
//! controller.start(StartOptions::default(), &mut AutoConfirm, &mut NoProgress)?;
//! // ... build and edit inside the RAM copy ...
//! controller.sync(&SyncRequest::to_disk(Scope::Default), &mut AutoConfirm, &mut NoProgress)?;
//! controller.destroy(false)?;
//! # Ok::<(), syncengine::Error>(())
//! ```

pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod lifecycle;
pub mod listing;
pub mod medium;
pub mod planner;
pub mod state;
pub mod types;

pub use classifier::{Classification, PathClass, TrackedPath, classify};
pub use config::{BuildDirKind, BuildDirRule, EngineConfig, OnExit, SourceRule, SyncPolicy};
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback};
pub use error::{Error, Result};
pub use guard::{Denial, ExitDecision, GuardedAction, Verdict};
pub use lifecycle::{
    Controller, DestroyOutcome, PendingChanges, RoleStatus, StartOptions, StartReport,
    StatusReport, SyncRequest,
};
pub use listing::Listing;
pub use medium::{Medium, MediumInfo};
pub use planner::{MirrorOperation, OperationResult, SyncOutcome, SyncPlan};
pub use state::{InFlight, StateStore, WorkspaceRecord};
pub use types::{Direction, Role, Scope, WorkspaceState};
