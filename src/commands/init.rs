use anyhow::{Context as _, Result, bail};
use std::fs;

use crate::Context;
use crate::config::{CONFIG_FILE, TEMPLATE, find_project_root};
use crate::ui;

pub fn run(ctx: &Context, force: bool) -> Result<()> {
    let root = find_project_root(&ctx.cwd);
    let path = ctx
        .config_path
        .clone()
        .unwrap_or_else(|| root.join(CONFIG_FILE));

    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    fs::write(&path, TEMPLATE).with_context(|| format!("Could not write {}", path.display()))?;
    log::info!("wrote config template to {}", path.display());

    if !ctx.quiet {
        ui::success(&format!("Created {}", path.display()));
        ui::dim("Edit sources and build_dirs, then run: ramws start");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx(dir: &std::path::Path) -> Context {
        Context {
            verbose: 0,
            quiet: true,
            json: false,
            interactive: false,
            cwd: dir.to_path_buf(),
            config_path: None,
        }
    }

    #[test]
    fn test_init_refuses_existing() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join(".git")).unwrap();
        let ctx = ctx(tmp.path());

        run(&ctx, false).unwrap();
        let written = tmp.path().join(CONFIG_FILE);
        assert_eq!(fs::read_to_string(&written).unwrap(), TEMPLATE);

        fs::write(&written, "sources: []\n").unwrap();
        assert!(run(&ctx, false).is_err());
        run(&ctx, true).unwrap();
        assert_eq!(fs::read_to_string(&written).unwrap(), TEMPLATE);
    }
}
