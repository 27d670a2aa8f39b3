//! rsync backend implementation.
//!
//! Shells out to `rsync -a --itemize-changes` and turns the itemized output
//! into a [`MirrorReport`]. Filter rules are translated by
//! [`Filter::rsync_args`] so both backends agree on what a pattern means.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;

use super::{Backend, check_roots};
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::types::{Change, ChangeKind, MirrorReport, MirrorRequest};

/// `YXcstpoguax path` or `*deleting path`
static ITEMIZE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\*deleting|[<>ch.*][fdLDS][^ ]*)\s+(.+)$").expect("valid itemize regex")
});

/// Backend implementation using the rsync binary.
#[derive(Debug, Clone)]
pub struct RsyncBackend {
    binary: PathBuf,
}

impl RsyncBackend {
    /// Create a backend using `rsync` from PATH.
    ///
    /// Returns an error if rsync cannot be executed.
    pub fn new() -> Result<Self> {
        if !Self::is_available() {
            return Err(Error::RsyncNotFound);
        }
        Ok(Self {
            binary: PathBuf::from("rsync"),
        })
    }

    /// Check if rsync is available on this system.
    pub fn is_available() -> bool {
        Command::new("rsync")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn command(&self, request: &MirrorRequest, filter: &Filter) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-a").arg("--itemize-changes");
        if request.delete {
            cmd.arg("--delete");
        }
        if request.dry_run {
            cmd.arg("--dry-run");
        }
        cmd.args(filter.rsync_args());
        cmd.arg(with_trailing_slash(&request.source));
        cmd.arg(&request.dest);
        cmd
    }
}

impl Backend for RsyncBackend {
    fn name(&self) -> &'static str {
        "rsync"
    }

    fn reconcile(&self, request: &MirrorRequest) -> Result<MirrorReport> {
        check_roots(request)?;
        let filter = Filter::for_request(request)?;

        if !request.dry_run
            && let Some(parent) = request.dest.parent()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let mut cmd = self.command(request, &filter);
        log::debug!("running {cmd:?}");
        let output = cmd.output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::RsyncNotFound
            } else {
                Error::io(&self.binary, e)
            }
        })?;

        if !output.status.success() {
            return Err(Error::RsyncFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(MirrorReport::new(parse_itemized(&stdout), request.dry_run))
    }
}

/// Parse `--itemize-changes` output.
///
/// Lines whose update type is `.` only changed attributes and are not counted;
/// the transfer root (`./`) is skipped.
pub fn parse_itemized(output: &str) -> Vec<Change> {
    let mut changes = Vec::new();
    for line in output.lines() {
        let Some(caps) = ITEMIZE_LINE.captures(line) else {
            continue;
        };
        let code = &caps[1];
        let raw_path = &caps[2];

        if code == "*deleting" {
            let (path, is_dir) = split_dir_marker(raw_path);
            changes.push(Change {
                path,
                kind: ChangeKind::Deleted,
                is_dir,
            });
            continue;
        }

        let mut chars = code.chars();
        let update = chars.next().unwrap_or('.');
        let file_type = chars.next().unwrap_or('f');
        if update == '.' {
            continue;
        }

        let raw_path = raw_path.split(" -> ").next().unwrap_or(raw_path);
        let (path, is_dir) = split_dir_marker(raw_path);
        if path.as_os_str().is_empty() || path == Path::new(".") {
            continue;
        }

        let kind = if code[2..].starts_with('+') {
            ChangeKind::Created
        } else {
            ChangeKind::Updated
        };
        changes.push(Change {
            path,
            kind,
            is_dir: is_dir || file_type == 'd',
        });
    }
    changes
}

fn split_dir_marker(raw: &str) -> (PathBuf, bool) {
    match raw.strip_suffix('/') {
        Some(dir) => (PathBuf::from(dir), true),
        None => (PathBuf::from(raw), false),
    }
}

fn with_trailing_slash(path: &Path) -> String {
    let mut s = path.to_string_lossy().into_owned();
    if !s.ends_with('/') {
        s.push('/');
    }
    s
}
