//! Directory snapshot used to expand glob source paths

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Directories that are never candidates for glob expansion
const PRUNED: [&str; 2] = [".git", crate::state::META_DIR];

/// Relative directory paths under a project root, sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    dirs: Vec<PathBuf>,
}

impl Listing {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a listing from known relative paths (mostly for tests).
    pub fn from_dirs<P: Into<PathBuf>>(dirs: impl IntoIterator<Item = P>) -> Self {
        let mut dirs: Vec<PathBuf> = dirs.into_iter().map(Into::into).collect();
        dirs.sort();
        dirs.dedup();
        Self { dirs }
    }

    /// Walk `root` down to `max_depth` levels, collecting directories.
    pub fn capture(root: &Path, max_depth: usize) -> Result<Self> {
        if max_depth == 0 {
            return Ok(Self::empty());
        }
        let mut dirs = Vec::new();
        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !PRUNED.contains(&e.file_name().to_string_lossy().as_ref()));
        for entry in walker {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(root) {
                dirs.push(rel.to_path_buf());
            }
        }
        log::debug!("listing of {}: {} director(ies)", root.display(), dirs.len());
        Ok(Self::from_dirs(dirs))
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_capture_respects_depth_and_prunes() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("crates/a/src")).unwrap();
        fs::create_dir_all(tmp.path().join("crates/b")).unwrap();
        fs::create_dir_all(tmp.path().join(".git/objects")).unwrap();
        fs::write(tmp.path().join("crates/README.md"), "x").unwrap();

        let listing = Listing::capture(tmp.path(), 2).unwrap();
        assert_eq!(
            listing.dirs(),
            &[
                PathBuf::from("crates"),
                PathBuf::from("crates/a"),
                PathBuf::from("crates/b"),
            ]
        );
    }

    #[test]
    fn test_zero_depth_is_empty() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("x")).unwrap();
        assert!(Listing::capture(tmp.path(), 0).unwrap().is_empty());
    }
}
