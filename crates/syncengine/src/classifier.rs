//! Path classifier - maps every path under the project root to one role
//!
//! Resolution rules:
//! - build-dir rules always win over source rules, whatever the declaration
//!   order; a build dir inside a source tree is carved out of that tree
//! - among rules of the same kind, the first declared rule wins
//! - the workspace metadata directory is never part of a source tree
//!
//! Classification is pure. The only filesystem input is the [`Listing`]
//! used to expand glob source paths, taken by the caller.

use mirror::Filter;
use mirror::filter::{has_glob_meta, matches_path, validate};
use std::path::{Component, Path, PathBuf};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::listing::Listing;
use crate::state::META_DIR;
use crate::types::Role;

/// Listing depth used when a glob source path contains `**`
const DEEP_GLOB_DEPTH: usize = 16;

/// Which configuration rule a tracked path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleRef {
    Source(usize),
    BuildDir(usize),
}

/// A path that takes part in syncs (or, for scratch, in start/destroy).
#[derive(Debug, Clone)]
pub struct TrackedPath {
    /// Position in [`Classification::tracked`]
    pub index: usize,
    /// Relative to the project root; empty for the root itself
    pub path: PathBuf,
    pub role: Role,
    pub rule: RuleRef,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Carved-out subtrees (nested build dirs, metadata), excluded ahead of
    /// the includes
    pub skip: Vec<String>,
    filter: Filter,
}

impl TrackedPath {
    fn new(path: PathBuf, role: Role, rule: RuleRef) -> Self {
        Self {
            index: 0,
            path,
            role,
            rule,
            include: Vec::new(),
            exclude: Vec::new(),
            skip: Vec::new(),
            filter: Filter::empty(),
        }
    }

    fn with_patterns(mut self, include: Vec<String>, exclude: Vec<String>) -> Result<Self> {
        self.include = include;
        self.exclude = exclude;
        self.rebuild_filter()?;
        Ok(self)
    }

    fn rebuild_filter(&mut self) -> Result<()> {
        self.filter = Filter::layered(&self.skip, &self.include, &self.exclude)
            .map_err(|e| Error::config(e.to_string()))?;
        Ok(())
    }

    /// Does this tracked path own `relative`?
    pub fn covers(&self, relative: &Path) -> bool {
        match relative.strip_prefix(&self.path) {
            Ok(sub) => sub.as_os_str().is_empty() || !self.filter.is_excluded(sub),
            Err(_) => false,
        }
    }

    /// Path for display (`.` for the project root)
    pub fn display(&self) -> String {
        display_relative(&self.path)
    }
}

/// Result of resolving one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    Tracked { role: Role, index: usize },
    Ignored,
}

/// Ordered tracked paths: sources in declaration order (glob expansions
/// sorted), then build dirs in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    tracked: Vec<TrackedPath>,
}

impl Classification {
    pub fn tracked(&self) -> &[TrackedPath] {
        &self.tracked
    }

    pub fn get(&self, index: usize) -> Option<&TrackedPath> {
        self.tracked.get(index)
    }

    pub fn of_role(&self, role: Role) -> impl Iterator<Item = &TrackedPath> {
        self.tracked.iter().filter(move |t| t.role == role)
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Resolve a relative path to exactly one tracked path, or `Ignored`.
    pub fn resolve(&self, path: &Path) -> PathClass {
        let Ok(relative) = normalize(path) else {
            return PathClass::Ignored;
        };
        let build_dirs = self.tracked.iter().filter(|t| t.role != Role::Source);
        let sources = self.tracked.iter().filter(|t| t.role == Role::Source);
        build_dirs
            .chain(sources)
            .find(|t| t.covers(&relative))
            .map_or(PathClass::Ignored, |t| PathClass::Tracked {
                role: t.role,
                index: t.index,
            })
    }
}

/// Classify the configured rules against a listing of the project root.
pub fn classify(config: &EngineConfig, listing: &Listing) -> Result<Classification> {
    let build_dirs = classify_build_dirs(config)?;
    let mut sources = classify_sources(config, listing, &build_dirs)?;

    // Carve nested build dirs, nested sources and the metadata dir out of
    // every source tree.
    let carve_outs: Vec<PathBuf> = build_dirs
        .iter()
        .chain(sources.iter())
        .map(|t| t.path.clone())
        .collect();
    for source in &mut sources {
        for other in &carve_outs {
            if other != &source.path
                && let Ok(rel) = other.strip_prefix(&source.path)
            {
                source.skip.push(format!("/{}/**", display_relative(rel)));
            }
        }
        if source.path.as_os_str().is_empty() {
            source.skip.push(format!("/{META_DIR}/**"));
        }
        source.rebuild_filter()?;
    }

    let mut tracked: Vec<TrackedPath> = sources.into_iter().chain(build_dirs).collect();
    for (index, t) in tracked.iter_mut().enumerate() {
        t.index = index;
    }
    for t in &tracked {
        log::debug!("tracked: {} ({})", t.display(), t.role);
    }
    Ok(Classification { tracked })
}

fn classify_build_dirs(config: &EngineConfig) -> Result<Vec<TrackedPath>> {
    let mut build_dirs: Vec<TrackedPath> = Vec::new();
    for (i, rule) in config.build_dirs.iter().enumerate() {
        let path = normalize(&rule.path)
            .map_err(|m| Error::config(format!("build_dirs[{i}] '{}': {m}", rule.path.display())))?;
        if path.as_os_str().is_empty() {
            return Err(Error::config(format!(
                "build_dirs[{i}]: the project root cannot be a build dir"
            )));
        }
        if has_glob_meta(&path.to_string_lossy()) {
            return Err(Error::config(format!(
                "build_dirs[{i}] '{}': build dir paths must be literal",
                path.display()
            )));
        }
        let role = rule.kind.role();

        if let Some(existing) = build_dirs.iter().find(|t| t.path == path) {
            if existing.role == role {
                log::warn!("build dir '{}' declared twice, ignoring duplicate", path.display());
                continue;
            }
            return Err(Error::config(format!(
                "'{}' is declared as both {} and {}",
                path.display(),
                existing.role,
                role
            )));
        }
        if let Some(outer) = build_dirs
            .iter()
            .find(|t| path.starts_with(&t.path) || t.path.starts_with(&path))
        {
            return Err(Error::config(format!(
                "build dirs '{}' and '{}' are nested",
                outer.display(),
                path.display()
            )));
        }
        build_dirs.push(TrackedPath::new(path, role, RuleRef::BuildDir(i)));
    }
    Ok(build_dirs)
}

fn classify_sources(
    config: &EngineConfig,
    listing: &Listing,
    build_dirs: &[TrackedPath],
) -> Result<Vec<TrackedPath>> {
    let mut sources: Vec<TrackedPath> = Vec::new();
    for (i, rule) in config.sources.iter().enumerate() {
        let context = |m: String| Error::config(format!("sources[{i}] '{}': {m}", rule.path.display()));
        for pattern in rule.include.iter().chain(&rule.exclude) {
            validate(pattern).map_err(|e| context(e.to_string()))?;
        }
        let base = normalize(&rule.path).map_err(context)?;

        let candidates = if has_glob_meta(&base.to_string_lossy()) {
            expand(&base, &rule.include, &rule.exclude, listing).map_err(|e| context(e.to_string()))?
        } else {
            vec![base]
        };
        if candidates.is_empty() {
            log::warn!("source '{}' matched no directories", rule.path.display());
        }

        for path in candidates {
            if let Some(build) = build_dirs.iter().find(|b| b.path == path) {
                return Err(Error::config(format!(
                    "'{}' is declared as both source and {}",
                    path.display(),
                    build.role
                )));
            }
            if let Some(build) = build_dirs.iter().find(|b| path.starts_with(&b.path)) {
                log::warn!(
                    "source '{}' lies inside {} dir '{}', which takes precedence",
                    display_relative(&path),
                    build.role,
                    build.display()
                );
                continue;
            }
            if sources.iter().any(|s| s.path == path) {
                log::warn!("source '{}' declared twice, ignoring duplicate", display_relative(&path));
                continue;
            }
            if let Some(outer) = sources.iter().find(|s| s.covers(&path)) {
                log::warn!(
                    "source '{}' is already covered by '{}'",
                    display_relative(&path),
                    outer.display()
                );
                continue;
            }
            sources.push(
                TrackedPath::new(path, Role::Source, RuleRef::Source(i))
                    .with_patterns(rule.include.clone(), rule.exclude.clone())?,
            );
        }
    }
    Ok(sources)
}

/// Expand a glob source path against the listing. Candidates are filtered by
/// the rule's patterns, relative to the literal part of the glob.
fn expand(
    pattern: &Path,
    include: &[String],
    exclude: &[String],
    listing: &Listing,
) -> mirror::Result<Vec<PathBuf>> {
    let pattern_str = display_relative(pattern);
    let prefix = literal_prefix(pattern);
    let filter = Filter::new(include, exclude)?;
    let mut expanded = Vec::new();
    for dir in listing.dirs() {
        if !matches_path(&pattern_str, dir)? {
            continue;
        }
        let rel = dir.strip_prefix(&prefix).unwrap_or(dir);
        if filter.is_excluded(rel) {
            log::debug!("glob '{pattern_str}': skipping excluded '{}'", dir.display());
            continue;
        }
        expanded.push(dir.clone());
    }
    expanded.sort();
    Ok(expanded)
}

/// How deep the listing must go to expand every glob source path.
pub fn listing_depth(config: &EngineConfig) -> usize {
    config
        .sources
        .iter()
        .filter(|rule| has_glob_meta(&rule.path.to_string_lossy()))
        .map(|rule| {
            if rule.path.to_string_lossy().contains("**") {
                DEEP_GLOB_DEPTH
            } else {
                rule.path.components().count()
            }
        })
        .max()
        .unwrap_or(0)
}

fn literal_prefix(pattern: &Path) -> PathBuf {
    pattern
        .components()
        .take_while(|c| !has_glob_meta(&c.as_os_str().to_string_lossy()))
        .collect()
}

/// Normalize a configured or user-supplied relative path.
fn normalize(path: &Path) -> std::result::Result<PathBuf, String> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => out.push(part),
            Component::ParentDir => return Err("path escapes the project root".to_string()),
            Component::RootDir | Component::Prefix(_) => {
                return Err("path must be relative to the project root".to_string());
            }
        }
    }
    Ok(out)
}

/// Normalize a relative path given on the command line.
pub(crate) fn normalize_relative(path: &Path) -> Option<PathBuf> {
    normalize(path).ok()
}

/// `.` for the empty path, slash-joined components otherwise.
pub fn display_relative(path: &Path) -> String {
    let joined = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    if joined.is_empty() { ".".to_string() } else { joined }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BuildDirRule, SourceRule};

    fn config() -> EngineConfig {
        EngineConfig::new("/proj", "/ram/proj")
    }

    fn tracked_paths(c: &Classification) -> Vec<(String, Role)> {
        c.tracked().iter().map(|t| (t.display(), t.role)).collect()
    }

    #[test]
    fn test_default_source_with_build_dirs() {
        let config = config()
            .with_source(SourceRule::project_default())
            .with_build_dir(BuildDirRule::cache("target"))
            .with_build_dir(BuildDirRule::scratch("out"));
        let c = classify(&config, &Listing::empty()).unwrap();

        assert_eq!(
            tracked_paths(&c),
            vec![
                (".".to_string(), Role::Source),
                ("target".to_string(), Role::Cache),
                ("out".to_string(), Role::Scratch),
            ]
        );
        assert_eq!(c.resolve(Path::new("src/main.rs")), PathClass::Tracked { role: Role::Source, index: 0 });
        assert_eq!(c.resolve(Path::new("target/debug/app")), PathClass::Tracked { role: Role::Cache, index: 1 });
        assert_eq!(c.resolve(Path::new("out/x")), PathClass::Tracked { role: Role::Scratch, index: 2 });
        assert_eq!(c.resolve(Path::new(".git/HEAD")), PathClass::Ignored);
        assert_eq!(c.resolve(Path::new(".ramws/state.toml")), PathClass::Ignored);
    }

    #[test]
    fn test_build_dir_wins_regardless_of_order() {
        // source include re-admits `gen`, the build dir still takes it
        let config = config()
            .with_build_dir(BuildDirRule::scratch("src/gen"))
            .with_source(SourceRule::new("src").with_include(["gen"]));
        let c = classify(&config, &Listing::empty()).unwrap();

        let source = c.of_role(Role::Source).next().unwrap();
        assert_eq!(source.skip, vec!["/gen/**".to_string()]);
        assert_eq!(c.resolve(Path::new("src/gen/a.rs")), PathClass::Tracked { role: Role::Scratch, index: 1 });
        assert_eq!(c.resolve(Path::new("src/lib.rs")), PathClass::Tracked { role: Role::Source, index: 0 });
    }

    #[test]
    fn test_classification_is_total_and_exclusive() {
        let config = config()
            .with_source(SourceRule::new(".").with_exclude([".git/**", "*.log"]))
            .with_source(SourceRule::new("vendor"))
            .with_build_dir(BuildDirRule::cache("target"))
            .with_build_dir(BuildDirRule::scratch("web/dist"));
        let c = classify(&config, &Listing::empty()).unwrap();

        let probes = [
            "", "src", "src/lib.rs", "run.log", "logs/x.log", ".git/config", "vendor/a",
            "target", "target/release/app", "web/dist/index.html", "web/src/app.ts",
            ".ramws", ".ramws/lock",
        ];
        for probe in probes {
            let path = Path::new(probe);
            let owners: Vec<usize> = c
                .tracked()
                .iter()
                .filter(|t| t.covers(path))
                .map(|t| t.index)
                .collect();
            assert!(owners.len() <= 1, "{probe} owned by {owners:?}");
            match c.resolve(path) {
                PathClass::Tracked { index, .. } => assert_eq!(owners, vec![index], "{probe}"),
                PathClass::Ignored => assert!(owners.is_empty(), "{probe}"),
            }
        }
    }

    #[test]
    fn test_later_source_inside_earlier_is_redundant() {
        let config = config()
            .with_source(SourceRule::new("."))
            .with_source(SourceRule::new("src"));
        let c = classify(&config, &Listing::empty()).unwrap();
        assert_eq!(c.tracked().len(), 1);
    }

    #[test]
    fn test_earlier_nested_source_is_carved_out() {
        let config = config()
            .with_source(SourceRule::new("docs").with_exclude(["*.pdf"]))
            .with_source(SourceRule::new("."));
        let c = classify(&config, &Listing::empty()).unwrap();

        assert_eq!(c.tracked().len(), 2);
        // first declared rule wins: docs keeps its own excludes
        assert_eq!(c.resolve(Path::new("docs/guide.pdf")), PathClass::Ignored);
        assert_eq!(c.resolve(Path::new("docs/guide.md")), PathClass::Tracked { role: Role::Source, index: 0 });
        assert_eq!(c.resolve(Path::new("README.md")), PathClass::Tracked { role: Role::Source, index: 1 });
    }

    #[test]
    fn test_glob_expansion_is_sorted_and_filtered() {
        let listing = Listing::from_dirs(["crates", "crates/b", "crates/a", "crates/legacy", "crates/a/src"]);
        let config = config().with_source(SourceRule::new("crates/*").with_exclude(["legacy"]));
        let c = classify(&config, &listing).unwrap();
        assert_eq!(
            tracked_paths(&c),
            vec![("crates/a".to_string(), Role::Source), ("crates/b".to_string(), Role::Source)]
        );
        assert_eq!(c.resolve(Path::new("crates/legacy/x")), PathClass::Ignored);
    }

    #[test]
    fn test_conflicting_roles_rejected() {
        let config = config()
            .with_source(SourceRule::new("target"))
            .with_build_dir(BuildDirRule::cache("target"));
        assert!(matches!(classify(&config, &Listing::empty()), Err(Error::Configuration(_))));

        let config = self::config()
            .with_build_dir(BuildDirRule::cache("out"))
            .with_build_dir(BuildDirRule::scratch("out"));
        assert!(matches!(classify(&config, &Listing::empty()), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_same_role_duplicates_are_merged() {
        let config = config()
            .with_source(SourceRule::new("src"))
            .with_source(SourceRule::new("./src"))
            .with_build_dir(BuildDirRule::cache("target"))
            .with_build_dir(BuildDirRule::cache("target/"));
        let c = classify(&config, &Listing::empty()).unwrap();
        assert_eq!(c.tracked().len(), 2);
    }

    #[test]
    fn test_invalid_rules_rejected() {
        for rule in [SourceRule::new("/etc"), SourceRule::new("../sibling"), SourceRule::new("src").with_exclude(["a**b"])] {
            let config = config().with_source(rule);
            assert!(matches!(classify(&config, &Listing::empty()), Err(Error::Configuration(_))));
        }
        let nested = config()
            .with_build_dir(BuildDirRule::cache("target"))
            .with_build_dir(BuildDirRule::scratch("target/tmp"));
        assert!(matches!(classify(&nested, &Listing::empty()), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_listing_depth() {
        assert_eq!(listing_depth(&config().with_source(SourceRule::new("."))), 0);
        assert_eq!(listing_depth(&config().with_source(SourceRule::new("crates/*"))), 2);
        assert_eq!(listing_depth(&config().with_source(SourceRule::new("**/pkg"))), DEEP_GLOB_DEPTH);
    }

    #[test]
    fn test_display_relative() {
        assert_eq!(display_relative(Path::new("")), ".");
        assert_eq!(display_relative(Path::new("a/b")), "a/b");
    }
}
