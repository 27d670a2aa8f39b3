use anyhow::Result;
use colored::Colorize;
use syncengine::{StartOptions, StartReport, classifier::display_relative};

use super::{Workspace, confirmer, print_json, progress};
use crate::Context;
use crate::cli::StartArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &StartArgs) -> Result<()> {
    let ws = Workspace::open(ctx)?;
    let report = start(ctx, &ws, args.force, args.sources_only)?;
    if ctx.json {
        print_json(&report)
    } else {
        Ok(())
    }
}

/// Start the workspace and print the human summary.
pub fn start(
    ctx: &Context,
    ws: &Workspace,
    force: bool,
    sources_only: bool,
) -> Result<StartReport> {
    let options = StartOptions {
        force,
        sources_only,
    };
    let report = ws
        .controller
        .start(options, &mut confirmer(ctx), &mut progress(ctx))?;
    if !ctx.quiet && !ctx.json {
        print_report(&report);
    }
    Ok(report)
}

fn print_report(report: &StartReport) {
    if !report.medium.medium.is_volatile() {
        ui::warn(&format!(
            "{} is on {}; files are not held in RAM",
            report.ram_root.display(),
            report.medium.medium
        ));
    }
    for path in &report.empty_caches {
        ui::dim(&format!("cache {} not on disk, created empty", display_relative(path)));
    }
    let verb = if report.resumed { "Refreshed" } else { "Started" };
    ui::success(&format!(
        "{verb} workspace at {} ({} file(s) copied, {})",
        report.ram_root.display().to_string().bold(),
        report.changed_files(),
        report.state
    ));
}
