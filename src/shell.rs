//! Spawning shells and commands inside the RAM workspace

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use syncengine::EngineConfig;
use syncengine::state::META_DIR;

pub const ENV_ACTIVE: &str = "RAMWS_ACTIVE";
pub const ENV_LEVEL: &str = "RAMWS_LEVEL";
pub const ENV_PROJECT: &str = "RAMWS_PROJECT";
pub const ENV_ORIG_ROOT: &str = "RAMWS_ORIG_ROOT";
pub const ENV_WS_ROOT: &str = "RAMWS_WS_ROOT";
pub const ENV_CONFIG: &str = "RAMWS_CONFIG";

pub const PROMPT_PREFIX: &str = "(ramws) ";

/// How deep we are in nested ramws shells (0 outside any)
pub fn nesting_level() -> u32 {
    std::env::var(ENV_LEVEL)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Environment markers for a child process.
pub fn markers(config: &EngineConfig, config_path: Option<&Path>) -> Vec<(&'static str, String)> {
    let mut vars = vec![
        (ENV_ACTIVE, "1".to_string()),
        (ENV_LEVEL, (nesting_level() + 1).to_string()),
        (ENV_PROJECT, config.project_key.clone()),
        (ENV_ORIG_ROOT, config.project_root.display().to_string()),
        (ENV_WS_ROOT, config.ram_root.display().to_string()),
    ];
    if let Some(path) = config_path {
        let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        vars.push((ENV_CONFIG, absolute.display().to_string()));
    }
    vars
}

/// The RAM counterpart of `cwd` if it exists, else the RAM root.
pub fn working_dir(config: &EngineConfig, cwd: &Path) -> PathBuf {
    cwd.strip_prefix(&config.project_root)
        .ok()
        .map(|rel| config.ram_path(rel))
        .filter(|p| p.is_dir())
        .unwrap_or_else(|| config.ram_root.clone())
}

/// `--shell`, else `$SHELL`, else `/bin/sh`
pub fn resolve_shell(requested: Option<&Path>) -> PathBuf {
    requested
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("SHELL").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("/bin/sh"))
}

/// A process to launch inside the workspace.
pub struct Session<'a> {
    pub config: &'a EngineConfig,
    pub config_path: Option<&'a Path>,
    pub cwd: &'a Path,
}

impl Session<'_> {
    fn command(&self, program: &Path) -> Command {
        let mut cmd = Command::new(program);
        cmd.current_dir(working_dir(self.config, self.cwd))
            .envs(markers(self.config, self.config_path))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        cmd
    }

    /// Run an interactive shell until it exits.
    pub fn interactive(&self, shell: &Path, prompt: bool) -> Result<ExitStatus> {
        let mut cmd = self.command(shell);
        if prompt {
            self.apply_prompt(&mut cmd, shell)?;
        }
        log::debug!("spawning {cmd:?}");
        cmd.status()
            .with_context(|| format!("Failed to start shell {}", shell.display()))
    }

    /// Run one command and return its status.
    pub fn run(&self, argv: &[String]) -> Result<ExitStatus> {
        let (program, args) = argv.split_first().context("No command given")?;
        let mut cmd = self.command(Path::new(program));
        cmd.args(args);
        log::debug!("running {cmd:?}");
        cmd.status()
            .with_context(|| format!("Failed to execute: {}", argv.join(" ")))
    }

    fn apply_prompt(&self, cmd: &mut Command, shell: &Path) -> Result<()> {
        let meta = self.config.ram_root.join(META_DIR);
        fs::create_dir_all(&meta)?;
        match shell_name(shell).as_str() {
            "bash" => {
                let rc = meta.join("bashrc");
                fs::write(&rc, bash_rc())
                    .with_context(|| format!("Could not write {}", rc.display()))?;
                cmd.arg("--rcfile").arg(rc).arg("-i");
            }
            "zsh" => {
                let dir = meta.join("zsh");
                fs::create_dir_all(&dir)?;
                fs::write(dir.join(".zshrc"), zsh_rc())
                    .with_context(|| format!("Could not write {}", dir.display()))?;
                cmd.env("ZDOTDIR", dir);
            }
            _ => {
                let current = std::env::var("PS1").unwrap_or_else(|_| "$ ".to_string());
                cmd.env("PS1", format!("{PROMPT_PREFIX}{current}"));
            }
        }
        Ok(())
    }
}

fn shell_name(shell: &Path) -> String {
    shell
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn bash_rc() -> String {
    format!(
        "[ -f \"$HOME/.bashrc\" ] && . \"$HOME/.bashrc\"\nPS1=\"{PROMPT_PREFIX}$PS1\"\n"
    )
}

fn zsh_rc() -> String {
    format!(
        "[ -f \"$HOME/.zshrc\" ] && ZDOTDIR=\"$HOME\" . \"$HOME/.zshrc\"\nPROMPT=\"{PROMPT_PREFIX}$PROMPT\"\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_markers() {
        let config = EngineConfig::new("/home/me/app", "/dev/shm/ramws-me/app-1234567");
        let vars = markers(&config, None);
        let get = |k: &str| vars.iter().find(|(name, _)| *name == k).map(|(_, v)| v.clone());

        assert_eq!(get(ENV_ACTIVE).as_deref(), Some("1"));
        assert_eq!(get(ENV_LEVEL), Some((nesting_level() + 1).to_string()));
        assert_eq!(get(ENV_WS_ROOT).as_deref(), Some("/dev/shm/ramws-me/app-1234567"));
        assert_eq!(get(ENV_ORIG_ROOT).as_deref(), Some("/home/me/app"));
        assert!(get(ENV_CONFIG).is_none());
    }

    #[test]
    fn test_working_dir_follows_cwd() {
        let tmp = TempDir::new().unwrap();
        let config = EngineConfig::new(tmp.path().join("disk"), tmp.path().join("ram"));
        fs::create_dir_all(config.ram_root.join("src")).unwrap();

        assert_eq!(working_dir(&config, &config.project_root.join("src")), config.ram_root.join("src"));
        assert_eq!(working_dir(&config, &config.project_root.join("missing")), config.ram_root);
        assert_eq!(working_dir(&config, Path::new("/elsewhere")), config.ram_root);
    }

    #[test]
    fn test_shell_resolution_and_rc() {
        assert_eq!(resolve_shell(Some(Path::new("/bin/zsh"))), PathBuf::from("/bin/zsh"));
        assert_eq!(shell_name(Path::new("/usr/local/bin/bash")), "bash");
        assert!(bash_rc().contains("PS1=\"(ramws) $PS1\""));
    }

    #[test]
    fn test_run_command_in_workspace() {
        let tmp = TempDir::new().unwrap();
        let config = EngineConfig::new(tmp.path().join("disk"), tmp.path().join("ram"));
        fs::create_dir_all(&config.ram_root).unwrap();
        let session = Session {
            config: &config,
            config_path: None,
            cwd: tmp.path(),
        };
        let status = session
            .run(&["sh".to_string(), "-c".to_string(), "test \"$RAMWS_ACTIVE\" = 1 && touch marker".to_string()])
            .unwrap();
        assert!(status.success());
        assert!(config.ram_root.join("marker").exists());
    }
}
