use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use syncengine::{StatusReport, WorkspaceState};

use super::{Workspace, print_json};
use crate::Context;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let ws = Workspace::open(ctx)?;
    let report = ws.controller.status()?;
    if ctx.json {
        return print_json(&report);
    }
    print_report(&ws, &report);
    Ok(())
}

fn print_report(ws: &Workspace, report: &StatusReport) {
    ui::header("Workspace Status");
    ui::kv("Project", &report.project_root.display().to_string());
    ui::kv(
        "Config",
        &ws.project
            .config_path
            .as_ref()
            .map_or_else(|| "defaults".to_string(), |p| p.display().to_string()),
    );
    ui::kv("RAM root", &report.ram_root.display().to_string());
    ui::kv("State", &state_label(report.state));

    if let Some(medium) = &report.medium {
        let capacity = match (medium.available_bytes, medium.total_bytes) {
            (Some(free), Some(total)) => {
                format!(" ({} free of {})", ui::format_size(free), ui::format_size(total))
            }
            _ => String::new(),
        };
        ui::kv("Medium", &format!("{}{capacity}", medium.medium));
    }
    ui::kv("Backend", report.backend);
    ui::kv("On exit", &format!("{:?}", report.on_exit).to_lowercase());

    if !report.exists {
        println!();
        ui::dim("Not started. Run: ramws start");
        return;
    }
    if report.possibly_stale {
        ui::warn("another ramws process holds the workspace lock; figures may be stale");
    }
    if let Some(marker) = &report.interrupted {
        ui::warn(&format!(
            "interrupted {} sync of {} ({}); run the sync again",
            marker.direction,
            marker.path.display(),
            marker.role
        ));
    }

    let now = Utc::now();
    for role in &report.roles {
        if role.paths.is_empty() {
            continue;
        }
        ui::section(&role.role.to_string());
        ui::kv("Paths", &role.paths.join(", "));
        ui::kv("Last to disk", &ui::format_age(role.last_to_disk, now));
        ui::kv("Last from disk", &ui::format_age(role.last_from_disk, now));
        if role.dirty {
            ui::kv("Unsynced", &format!("{} file(s)", role.dirty_files).yellow().to_string());
        }
    }

    let pending = report.pending;
    if pending.files > 0 || pending.deleted > 0 {
        println!();
        ui::info(&format!(
            "Pending RAM → disk: {} created, {} updated, {} deleted",
            pending.created, pending.updated, pending.deleted
        ));
        ui::dim("Run: ramws sync");
    }
}

fn state_label(state: WorkspaceState) -> String {
    match state {
        WorkspaceState::Populated => state.to_string().green().to_string(),
        WorkspaceState::Dirty => state.to_string().yellow().bold().to_string(),
        _ => state.to_string().dimmed().to_string(),
    }
}
