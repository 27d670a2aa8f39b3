use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A single reconcile request: make `dest` look like `source`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorRequest {
    /// Tree to copy from
    pub source: PathBuf,
    /// Tree to copy into (created if missing)
    pub dest: PathBuf,
    /// Include patterns, consulted before excludes
    #[serde(default)]
    pub include: Vec<String>,
    /// Exclude patterns
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Exclude patterns consulted before the includes, so nothing can
    /// re-include what they match
    #[serde(default)]
    pub skip: Vec<String>,
    /// Reconcile only this top-level entry of the two trees
    #[serde(default)]
    pub entry: Option<String>,
    /// Delete files in `dest` that are not in `source`
    pub delete: bool,
    /// Report what would change without touching `dest`
    pub dry_run: bool,
}

impl MirrorRequest {
    /// Create a request with no filters, no deletion and no dry-run.
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            skip: Vec::new(),
            entry: None,
            delete: false,
            dry_run: false,
        }
    }

    /// Set include patterns
    pub fn with_include(mut self, include: Vec<String>) -> Self {
        self.include = include;
        self
    }

    /// Set exclude patterns
    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Set patterns excluded ahead of the includes
    pub fn with_skip(mut self, skip: Vec<String>) -> Self {
        self.skip = skip;
        self
    }

    /// Narrow the request to one top-level entry; siblings are left alone
    /// on both sides.
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    /// Enable or disable deletion mirroring
    pub fn with_delete(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    /// Turn this request into a dry run
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// What happened (or would happen) to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Path did not exist in the destination
    Created,
    /// Path existed with different content
    Updated,
    /// Path existed only in the destination and was removed
    Deleted,
}

/// A changed path, relative to the request roots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Change {
    /// Relative path
    pub path: PathBuf,
    /// Kind of change
    pub kind: ChangeKind,
    /// Whether the path is a directory
    #[serde(default)]
    pub is_dir: bool,
}

impl Change {
    /// A changed regular file
    pub fn file(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            is_dir: false,
        }
    }

    /// A changed directory
    pub fn dir(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            is_dir: true,
        }
    }
}

/// Outcome of a successful reconcile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorReport {
    /// Every created, updated or deleted path, sorted by path
    pub changes: Vec<Change>,
    /// Whether the report describes a dry run
    pub dry_run: bool,
}

impl MirrorReport {
    /// Build a report, sorting changes for deterministic output.
    pub fn new(mut changes: Vec<Change>, dry_run: bool) -> Self {
        changes.sort_by(|a, b| a.path.cmp(&b.path).then(a.kind.cmp_key().cmp(&b.kind.cmp_key())));
        Self { changes, dry_run }
    }

    /// Number of created paths
    pub fn created(&self) -> usize {
        self.count(ChangeKind::Created)
    }

    /// Number of updated paths
    pub fn updated(&self) -> usize {
        self.count(ChangeKind::Updated)
    }

    /// Number of deleted paths
    pub fn deleted(&self) -> usize {
        self.count(ChangeKind::Deleted)
    }

    /// Number of changed regular files (directories are not counted)
    pub fn changed_files(&self) -> usize {
        self.changes.iter().filter(|c| !c.is_dir).count()
    }

    /// True if nothing changed
    pub fn is_clean(&self) -> bool {
        self.changes.is_empty()
    }

    /// Check whether a particular relative path changed
    pub fn touched(&self, path: &Path) -> bool {
        self.changes.iter().any(|c| c.path == path)
    }

    /// Merge another report into this one
    pub fn merge(&mut self, other: MirrorReport) {
        self.changes.extend(other.changes);
        self.changes.sort_by(|a, b| a.path.cmp(&b.path));
    }

    fn count(&self, kind: ChangeKind) -> usize {
        self.changes.iter().filter(|c| c.kind == kind).count()
    }
}

impl ChangeKind {
    fn cmp_key(self) -> u8 {
        match self {
            Self::Deleted => 0,
            Self::Created => 1,
            Self::Updated => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let report = MirrorReport::new(
            vec![
                Change::file("b.txt", ChangeKind::Updated),
                Change::dir("a", ChangeKind::Created),
                Change::file("a/x.txt", ChangeKind::Created),
                Change::file("old.txt", ChangeKind::Deleted),
            ],
            false,
        );
        assert_eq!(report.created(), 2);
        assert_eq!(report.updated(), 1);
        assert_eq!(report.deleted(), 1);
        assert_eq!(report.changed_files(), 3);
        assert_eq!(report.changes[0].path, PathBuf::from("a"));
        assert!(report.touched(Path::new("old.txt")));
        assert!(!report.is_clean());
    }

    #[test]
    fn test_request_builder() {
        let req = MirrorRequest::new("/a", "/b")
            .with_exclude(vec![".git/**".into()])
            .with_delete(true)
            .dry_run();
        assert!(req.delete);
        assert!(req.dry_run);
        assert_eq!(req.exclude.len(), 1);
        assert!(req.include.is_empty());
        assert!(req.entry.is_none());
        assert_eq!(req.with_entry("a.txt").entry.as_deref(), Some("a.txt"));
    }
}
