//! Pure-Rust backend.
//!
//! Both trees are listed with `walkdir`, files of equal length are compared
//! by blake3 digest (in parallel), and the destination is patched in two
//! passes: removals deepest-first, then creations and updates parents-first.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use walkdir::WalkDir;

use super::{Backend, check_roots};
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::types::{Change, ChangeKind, MirrorReport, MirrorRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
enum EntryKind {
    Dir,
    File { len: u64 },
    Symlink(PathBuf),
}

impl EntryKind {
    fn same_type(&self, other: &EntryKind) -> bool {
        matches!(
            (self, other),
            (EntryKind::Dir, EntryKind::Dir)
                | (EntryKind::File { .. }, EntryKind::File { .. })
                | (EntryKind::Symlink(_), EntryKind::Symlink(_))
        )
    }
}

type Tree = BTreeMap<PathBuf, EntryKind>;

#[derive(Debug)]
enum Action {
    Remove(PathBuf),
    MakeDir(PathBuf),
    Copy(PathBuf),
    Link(PathBuf, PathBuf),
}

/// In-process backend, no external tools required.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalBackend;

impl LocalBackend {
    /// Create a new LocalBackend
    pub fn new() -> Self {
        Self
    }
}

impl Backend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn reconcile(&self, request: &MirrorRequest) -> Result<MirrorReport> {
        check_roots(request)?;
        let filter = Filter::for_request(request)?;

        let source = scan(&request.source, &filter)?;
        let dest = scan(&request.dest, &filter)?;
        let differing = differing_files(request, &source, &dest)?;

        let (changes, actions) = diff_trees(&source, &dest, &differing, request.delete);

        if request.dry_run {
            log::debug!(
                "dry run {} -> {}: {} change(s)",
                request.source.display(),
                request.dest.display(),
                changes.len()
            );
        } else {
            fs::create_dir_all(&request.dest).map_err(|e| Error::io(&request.dest, e))?;
            for action in &actions {
                apply(request, action)?;
            }
        }

        Ok(MirrorReport::new(changes, request.dry_run))
    }
}

/// List a tree, pruning excluded subtrees and skipping special files.
fn scan(root: &Path, filter: &Filter) -> Result<Tree> {
    let mut tree = Tree::new();
    if !root.exists() {
        return Ok(tree);
    }

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| match e.path().strip_prefix(root) {
            Ok(rel) => !filter.is_excluded(rel),
            Err(_) => true,
        });

    for entry in walker {
        let entry = entry?;
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let file_type = entry.file_type();
        let kind = if file_type.is_symlink() {
            let target = fs::read_link(entry.path()).map_err(|e| Error::io(entry.path(), e))?;
            EntryKind::Symlink(target)
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File {
                len: entry.metadata()?.len(),
            }
        } else {
            log::debug!("skipping special file {}", entry.path().display());
            continue;
        };
        tree.insert(rel.to_path_buf(), kind);
    }

    Ok(tree)
}

/// Files present on both sides with equal length but different content.
fn differing_files(request: &MirrorRequest, source: &Tree, dest: &Tree) -> Result<BTreeSet<PathBuf>> {
    let candidates: Vec<&PathBuf> = source
        .iter()
        .filter(|(rel, kind)| match (kind, dest.get(*rel)) {
            (EntryKind::File { len: a }, Some(EntryKind::File { len: b })) => a == b,
            _ => false,
        })
        .map(|(rel, _)| rel)
        .collect();

    let results: Vec<Result<Option<PathBuf>>> = candidates
        .par_iter()
        .map(|rel| {
            let equal = same_content(&request.source.join(rel), &request.dest.join(rel))?;
            Ok(if equal { None } else { Some((*rel).clone()) })
        })
        .collect();

    let mut differing = BTreeSet::new();
    for result in results {
        if let Some(rel) = result? {
            differing.insert(rel);
        }
    }
    Ok(differing)
}

fn same_content(a: &Path, b: &Path) -> Result<bool> {
    let left = fs::read(a).map_err(|e| Error::io(a, e))?;
    let right = fs::read(b).map_err(|e| Error::io(b, e))?;
    Ok(blake3::hash(&left) == blake3::hash(&right))
}

fn diff_trees(
    source: &Tree,
    dest: &Tree,
    differing: &BTreeSet<PathBuf>,
    delete: bool,
) -> (Vec<Change>, Vec<Action>) {
    let mut changes = Vec::new();
    let mut removals = Vec::new();
    let mut writes = Vec::new();

    // Deepest paths first so directories are empty by the time we reach them
    for (rel, kind) in dest.iter().rev() {
        match source.get(rel) {
            None if delete => {
                changes.push(change(rel, kind, ChangeKind::Deleted));
                removals.push(Action::Remove(rel.clone()));
            }
            Some(wanted) if !wanted.same_type(kind) => {
                removals.push(Action::Remove(rel.clone()));
            }
            _ => {}
        }
    }

    for (rel, kind) in source {
        let existing = dest.get(rel);
        let outcome = match (kind, existing) {
            (_, None) => Some(ChangeKind::Created),
            (EntryKind::Dir, Some(EntryKind::Dir)) => None,
            (EntryKind::File { .. }, Some(EntryKind::File { .. })) => {
                differing_or_resized(rel, kind, existing, differing)
            }
            (EntryKind::Symlink(a), Some(EntryKind::Symlink(b))) if a == b => None,
            _ => Some(ChangeKind::Updated),
        };
        let Some(outcome) = outcome else {
            continue;
        };
        changes.push(change(rel, kind, outcome));
        writes.push(match kind {
            EntryKind::Dir => Action::MakeDir(rel.clone()),
            EntryKind::File { .. } => Action::Copy(rel.clone()),
            EntryKind::Symlink(target) => Action::Link(rel.clone(), target.clone()),
        });
    }

    removals.extend(writes);
    (changes, removals)
}

fn differing_or_resized(
    rel: &Path,
    kind: &EntryKind,
    existing: Option<&EntryKind>,
    differing: &BTreeSet<PathBuf>,
) -> Option<ChangeKind> {
    if Some(kind) != existing || differing.contains(rel) {
        Some(ChangeKind::Updated)
    } else {
        None
    }
}

fn change(rel: &Path, kind: &EntryKind, outcome: ChangeKind) -> Change {
    match kind {
        EntryKind::Dir => Change::dir(rel, outcome),
        _ => Change::file(rel, outcome),
    }
}

fn apply(request: &MirrorRequest, action: &Action) -> Result<()> {
    match action {
        Action::Remove(rel) => {
            let path = request.dest.join(rel);
            let result = match fs::symlink_metadata(&path) {
                Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path),
                Ok(_) => fs::remove_file(&path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e),
            };
            result.map_err(|e| Error::io(&path, e))
        }
        Action::MakeDir(rel) => {
            let path = request.dest.join(rel);
            fs::create_dir_all(&path).map_err(|e| Error::io(&path, e))
        }
        Action::Copy(rel) => {
            let from = request.source.join(rel);
            let to = request.dest.join(rel);
            fs::copy(&from, &to).map_err(|e| Error::io(&from, e))?;
            Ok(())
        }
        Action::Link(rel, target) => {
            let path = request.dest.join(rel);
            make_symlink(target, &path).map_err(|e| Error::io(&path, e))
        }
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    if fs::symlink_metadata(link).is_ok() {
        fs::remove_file(link)?;
    }
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    log::warn!(
        "symlinks are not mirrored on this platform: {} -> {}",
        link.display(),
        target.display()
    );
    Ok(())
}
