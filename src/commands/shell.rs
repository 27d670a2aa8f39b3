use anyhow::Result;
use std::process::{ExitCode, ExitStatus};
use syncengine::{ConfirmCallback, ExitDecision, Scope, SyncRequest};

use super::{Workspace, confirmer, progress};
use crate::Context;
use crate::cli::ShellArgs;
use crate::shell::{self, ENV_WS_ROOT, Session};
use crate::ui;

pub fn run(ctx: &Context, args: &ShellArgs) -> Result<ExitCode> {
    let ws = Workspace::open(ctx)?;
    let config = ws.controller.config();

    if std::env::var_os(ENV_WS_ROOT).is_some_and(|root| root == config.ram_root.as_os_str()) {
        log::warn!(
            "already inside this workspace (level {}), nesting another shell",
            shell::nesting_level()
        );
    }
    if !ws.controller.is_started() {
        log::info!("workspace not started, starting it first");
        super::start::start(ctx, &ws, false, false)?;
    }

    let session = Session {
        config,
        config_path: ws.project.config_path.as_deref(),
        cwd: &ctx.cwd,
    };

    if !args.command.is_empty() {
        let status = session.run(&args.command)?;
        return Ok(exit_code(status));
    }

    let shell_path = shell::resolve_shell(args.shell.as_deref());
    if !ctx.quiet {
        ui::info(&format!(
            "Entering {} (exit to leave)",
            config.ram_root.display()
        ));
    }
    let status = session.interactive(&shell_path, !args.no_prompt)?;
    on_exit(ctx, &ws)?;
    Ok(exit_code(status))
}

/// Apply the on-exit policy after an interactive shell ends.
fn on_exit(ctx: &Context, ws: &Workspace) -> Result<()> {
    let sync = match ws.controller.exit_decision()? {
        ExitDecision::Nothing => false,
        ExitDecision::Sync => true,
        ExitDecision::Ask(prompt) => {
            if ctx.interactive {
                confirmer(ctx).confirm(&prompt)?
            } else {
                ui::warn("unsynced changes left in RAM; run: ramws sync");
                false
            }
        }
    };
    if !sync {
        return Ok(());
    }

    let outcome = ws.controller.sync(
        &SyncRequest::to_disk(Scope::Default),
        &mut confirmer(ctx),
        &mut progress(ctx),
    )?;
    if !ctx.quiet {
        ui::success(&format!(
            "Synced {} file(s) back to {}",
            outcome.changed_files(),
            ws.controller.config().project_root.display()
        ));
    }
    Ok(())
}

fn exit_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        None => ExitCode::FAILURE,
    }
}
