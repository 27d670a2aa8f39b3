use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;
use syncengine::Role;

#[derive(Parser)]
#[command(name = "ramws")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Run your project from a RAM-backed workspace, sync back safely", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Run as if started in this directory
    #[arg(short = 'C', long = "chdir", value_name = "DIR", global = true)]
    pub chdir: Option<PathBuf>,

    /// Use this config file instead of discovering .ramws.yml
    #[arg(long, value_name = "FILE", global = true, env = "RAMWS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Never prompt; guarded actions that need confirmation are confirmed
    #[arg(long, global = true)]
    pub noninteractive: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a starter .ramws.yml in the project root
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Create the RAM workspace and copy the project into it
    Start(StartArgs),

    /// Open a shell (or run a command) inside the RAM workspace
    Shell(ShellArgs),

    /// Sync between the RAM workspace and the disk copy
    Sync(SyncArgs),

    /// Show workspace state, dirtiness and storage
    Status,

    /// Remove the RAM workspace
    Destroy {
        /// Discard unsynced changes
        #[arg(short, long)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct StartArgs {
    /// Re-populate even if RAM has unsynced source changes
    #[arg(short, long)]
    pub force: bool,

    /// Only refresh source paths (no cache pulls, no scratch dirs)
    #[arg(long)]
    pub sources_only: bool,
}

#[derive(Args)]
pub struct ShellArgs {
    /// Shell to launch (default: $SHELL)
    #[arg(long, value_name = "SHELL")]
    pub shell: Option<PathBuf>,

    /// Do not prefix the prompt with (ramws)
    #[arg(long)]
    pub no_prompt: bool,

    /// Command to run instead of an interactive shell
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Args)]
pub struct SyncArgs {
    /// RAM → disk (default)
    #[arg(long, conflicts_with = "from")]
    pub back: bool,

    /// disk → RAM
    #[arg(long)]
    pub from: bool,

    /// Only these paths (tracked paths or descendants)
    #[arg(long, value_name = "PATH", num_args = 1.., conflicts_with = "role")]
    pub only: Vec<PathBuf>,

    /// Only tracked paths of these roles
    #[arg(long, value_enum, value_delimiter = ',')]
    pub role: Vec<RoleArg>,

    /// Overwrite unsynced RAM changes when syncing from disk
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum RoleArg {
    Source,
    Cache,
    Scratch,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Source => Role::Source,
            RoleArg::Cache => Role::Cache,
            RoleArg::Scratch => Role::Scratch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_sync_flags() {
        let cli = Cli::try_parse_from(["ramws", "sync", "--from", "--only", "src", "docs", "--force"]).unwrap();
        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert!(args.from && args.force && !args.back);
        assert_eq!(args.only, vec![PathBuf::from("src"), PathBuf::from("docs")]);

        assert!(Cli::try_parse_from(["ramws", "sync", "--back", "--from"]).is_err());
        assert!(Cli::try_parse_from(["ramws", "sync", "--only", "src", "--role", "cache"]).is_err());
    }

    #[test]
    fn test_shell_trailing_command() {
        let cli = Cli::try_parse_from(["ramws", "-C", "/tmp", "shell", "cargo", "build", "--release"]).unwrap();
        assert_eq!(cli.chdir, Some(PathBuf::from("/tmp")));
        let Command::Shell(args) = cli.command else {
            panic!("expected shell");
        };
        assert_eq!(args.command, vec!["cargo", "build", "--release"]);
    }
}
