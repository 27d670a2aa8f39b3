use anyhow::Result;
use syncengine::DestroyOutcome;

use super::{Workspace, print_json};
use crate::Context;
use crate::ui;

pub fn run(ctx: &Context, force: bool) -> Result<()> {
    let ws = Workspace::open(ctx)?;
    let ram_root = ws.controller.config().ram_root.clone();
    let outcome = ws.controller.destroy(force)?;

    if ctx.json {
        return print_json(&outcome);
    }
    if ctx.quiet {
        return Ok(());
    }
    match outcome {
        DestroyOutcome::NotFound => ui::info(&format!("No workspace at {}", ram_root.display())),
        DestroyOutcome::Destroyed {
            discarded_files: 0, ..
        } => ui::success(&format!("Removed {}", ram_root.display())),
        DestroyOutcome::Destroyed {
            discarded_files, ..
        } => ui::warn(&format!(
            "Removed {} and discarded {discarded_files} unsynced file(s)",
            ram_root.display()
        )),
    }
    Ok(())
}
