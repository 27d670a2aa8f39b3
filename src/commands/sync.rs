use anyhow::Result;
use std::path::{Path, PathBuf};
use syncengine::{Direction, Role, Scope, SyncOutcome, SyncRequest};

use super::{Workspace, confirmer, print_json, progress};
use crate::Context;
use crate::cli::SyncArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &SyncArgs) -> Result<()> {
    let ws = Workspace::open(ctx)?;
    let request = request(args, &ctx.cwd);
    let outcome = ws
        .controller
        .sync(&request, &mut confirmer(ctx), &mut progress(ctx))?;

    if ctx.json {
        return print_json(&outcome);
    }
    if !ctx.quiet {
        print_outcome(&outcome);
    }
    Ok(())
}

/// Translate CLI flags into an engine request.
pub fn request(args: &SyncArgs, cwd: &Path) -> SyncRequest {
    let scope = if !args.only.is_empty() {
        Scope::Paths(args.only.iter().map(|p| absolutize(p, cwd)).collect())
    } else if !args.role.is_empty() {
        Scope::Roles(args.role.iter().copied().map(Role::from).collect())
    } else {
        Scope::Default
    };
    if args.from {
        SyncRequest::from_disk(scope, args.force)
    } else {
        SyncRequest::to_disk(scope)
    }
}

fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };
    joined.canonicalize().unwrap_or(joined)
}

fn print_outcome(outcome: &SyncOutcome) {
    if outcome.results.is_empty() {
        ui::info("Nothing to sync");
        return;
    }
    for result in &outcome.results {
        let changed = result.report.changed_files();
        if changed == 0 {
            ui::dim(&format!("{}: up to date", result.operation.label()));
        } else {
            ui::kv(&result.operation.label(), &format!("{changed} file(s)"));
        }
    }
    let mut summary = format!(
        "Synced {} ({} file(s))",
        outcome.direction.arrow(),
        outcome.changed_files()
    );
    if outcome.direction == Direction::ToDisk && outcome.cleaned {
        summary.push_str(", workspace clean");
    }
    ui::success(&summary);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RoleArg;

    fn args() -> SyncArgs {
        SyncArgs {
            back: false,
            from: false,
            only: Vec::new(),
            role: Vec::new(),
            force: false,
        }
    }

    #[test]
    fn test_default_request_is_sources_to_disk() {
        let request = request(&args(), Path::new("/nowhere"));
        assert_eq!(request.direction, Direction::ToDisk);
        assert_eq!(request.scope, Scope::Default);
        assert!(!request.force);
    }

    #[test]
    fn test_from_disk_with_roles() {
        let mut a = args();
        a.from = true;
        a.force = true;
        a.role = vec![RoleArg::Cache, RoleArg::Source];
        let request = request(&a, Path::new("/nowhere"));
        assert_eq!(request.direction, Direction::FromDisk);
        assert!(request.force);
        assert_eq!(request.scope, Scope::Roles(vec![Role::Cache, Role::Source]));
    }

    #[test]
    fn test_only_paths_resolve_against_cwd() {
        let mut a = args();
        a.only = vec![PathBuf::from("src"), PathBuf::from("/abs/lib")];
        let request = request(&a, Path::new("/nowhere/proj"));
        assert_eq!(
            request.scope,
            Scope::Paths(vec![PathBuf::from("/nowhere/proj/src"), PathBuf::from("/abs/lib")])
        );
    }
}
