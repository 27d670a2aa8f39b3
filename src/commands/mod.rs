pub mod destroy;
pub mod init;
pub mod shell;
pub mod start;
pub mod status;
pub mod sync;

use anyhow::Result;
use mirror::Mirror;
use serde::Serialize;
use syncengine::Controller;

use crate::Context;
use crate::config::Project;
use crate::progress::{Confirmer, SyncProgress};

/// A discovered project and the controller driving its workspace.
pub struct Workspace {
    pub project: Project,
    pub controller: Controller,
}

impl Workspace {
    pub fn open(ctx: &Context) -> Result<Self> {
        let project = Project::discover(&ctx.cwd, ctx.config_path.as_deref())?;
        let config = project.engine_config()?;
        let mirror = Mirror::from_kind(config.sync.backend).map_err(|e| {
            syncengine::Error::config(format!("mirror backend unavailable: {e}"))
        })?;
        log::debug!("using {} mirror backend", mirror.backend_name());
        Ok(Self {
            project,
            controller: Controller::new(config, mirror),
        })
    }
}

pub fn progress(ctx: &Context) -> SyncProgress {
    SyncProgress::new(ctx.quiet || ctx.json)
}

pub fn confirmer(ctx: &Context) -> Confirmer {
    Confirmer::new(ctx.interactive)
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
