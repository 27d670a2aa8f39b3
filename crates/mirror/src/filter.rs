//! Include/exclude glob filtering.
//!
//! Patterns follow a small, rsync-flavoured dialect:
//!
//! - `*.o` (no slash) matches a path component name at any depth
//! - `src/gen` (inner slash) matches a trailing run of components at any
//!   depth, so it covers both `src/gen` and `crates/x/src/gen`
//! - a leading `/` anchors the pattern at the tree root
//! - `**` crosses directory boundaries, `*` and `?` never match `/`
//! - `dir/**` matches `dir` itself and everything below it
//! - a trailing `/` is accepted and ignored
//!
//! A path is excluded when it, or any of its ancestors, is excluded. At each
//! level the rules are consulted in order (includes first) and the first
//! matching rule decides. Matching is a pure function of the relative path.

use std::path::{Component, Path};

use glob::{MatchOptions, Pattern};

use crate::error::{Error, Result};
use crate::types::MirrorRequest;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    Include,
    Exclude,
}

#[derive(Debug, Clone)]
struct Rule {
    kind: RuleKind,
    raw: String,
    pattern: Pattern,
    /// Pattern started with `/`: match against the whole relative path
    anchored: bool,
    /// Pattern ended in `/**`: also matches every descendant
    subtree: bool,
}

impl Rule {
    fn parse(kind: RuleKind, raw: &str) -> Result<Self> {
        let mut body = raw.trim();
        let leading_slash = body.starts_with('/');
        body = body.trim_start_matches('/');
        while body.len() > 1 && body.ends_with('/') {
            body = &body[..body.len() - 1];
        }

        let (base, subtree) = match body.strip_suffix("/**") {
            Some(base) if !base.is_empty() => (base, true),
            _ => (body, false),
        };

        if base.is_empty() {
            return Err(Error::InvalidPattern {
                pattern: raw.to_string(),
                message: "empty pattern".to_string(),
            });
        }

        let pattern = Pattern::new(base).map_err(|e| Error::InvalidPattern {
            pattern: raw.to_string(),
            message: e.msg.to_string(),
        })?;

        Ok(Self {
            kind,
            raw: raw.to_string(),
            pattern,
            anchored: leading_slash,
            subtree,
        })
    }

    /// Does this rule match the path prefix made of `components`?
    fn matches(&self, components: &[String]) -> bool {
        if self.subtree {
            (1..=components.len()).any(|n| self.matches_exact(&components[..n]))
        } else {
            self.matches_exact(components)
        }
    }

    fn matches_exact(&self, components: &[String]) -> bool {
        if self.anchored {
            self.pattern
                .matches_with(&components.join("/"), MATCH_OPTIONS)
        } else {
            (0..components.len()).any(|start| {
                self.pattern
                    .matches_with(&components[start..].join("/"), MATCH_OPTIONS)
            })
        }
    }

    fn rsync_args(&self) -> Vec<String> {
        let flag = match self.kind {
            RuleKind::Include => "--include",
            RuleKind::Exclude => "--exclude",
        };
        let base = self.pattern.as_str();
        let target = if self.anchored {
            format!("/{base}")
        } else {
            base.to_string()
        };
        if self.subtree {
            vec![format!("{flag}={target}"), format!("{flag}={target}/**")]
        } else {
            vec![format!("{flag}={target}")]
        }
    }
}

/// Compiled include/exclude rule set.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    rules: Vec<Rule>,
}

impl Filter {
    /// Compile a filter; includes are consulted before excludes.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let mut rules = Vec::with_capacity(include.len() + exclude.len());
        for raw in include {
            rules.push(Rule::parse(RuleKind::Include, raw)?);
        }
        for raw in exclude {
            rules.push(Rule::parse(RuleKind::Exclude, raw)?);
        }
        Ok(Self { rules })
    }

    /// Compile a filter whose `skip` excludes come before the includes.
    pub fn layered(skip: &[String], include: &[String], exclude: &[String]) -> Result<Self> {
        let mut rules = Vec::with_capacity(skip.len());
        for raw in skip {
            rules.push(Rule::parse(RuleKind::Exclude, raw)?);
        }
        rules.extend(Self::new(include, exclude)?.rules);
        Ok(Self { rules })
    }

    /// The filter described by a request's patterns.
    ///
    /// A request narrowed to one entry gets two leading rules that keep the
    /// entry and drop every other top-level name.
    pub fn for_request(request: &MirrorRequest) -> Result<Self> {
        let mut filter = Self::layered(&request.skip, &request.include, &request.exclude)?;
        if let Some(entry) = &request.entry {
            let mut rules = vec![
                Rule::parse(RuleKind::Include, &format!("/{}", Pattern::escape(entry)))?,
                Rule::parse(RuleKind::Exclude, "/*")?,
            ];
            rules.append(&mut filter.rules);
            filter.rules = rules;
        }
        Ok(filter)
    }

    /// A filter that excludes nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// True if the filter has no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Check whether a path relative to the tree root is excluded.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        let components = components_of(relative);
        for depth in 1..=components.len() {
            let prefix = &components[..depth];
            if let Some(rule) = self.rules.iter().find(|r| r.matches(prefix))
                && rule.kind == RuleKind::Exclude
            {
                log::trace!("{} excluded by '{}'", relative.display(), rule.raw);
                return true;
            }
        }
        false
    }

    /// Translate the rule set into rsync filter arguments with the same meaning.
    pub fn rsync_args(&self) -> Vec<String> {
        self.rules.iter().flat_map(Rule::rsync_args).collect()
    }
}

/// Check a single exclude pattern against a relative path.
pub fn matches(pattern: &str, relative: &Path) -> Result<bool> {
    let filter = Filter::new(&[], &[pattern.to_string()])?;
    Ok(filter.is_excluded(relative))
}

/// Match a pattern against the whole relative path, without ancestor or
/// basename rules. Used to expand glob paths.
pub fn matches_path(pattern: &str, relative: &Path) -> Result<bool> {
    let trimmed = pattern.trim().trim_start_matches('/').trim_end_matches('/');
    let compiled = Pattern::new(trimmed).map_err(|e| Error::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.msg.to_string(),
    })?;
    Ok(compiled.matches_with(&components_of(relative).join("/"), MATCH_OPTIONS))
}

/// Validate a pattern without keeping it.
pub fn validate(pattern: &str) -> Result<()> {
    Rule::parse(RuleKind::Exclude, pattern).map(|_| ())
}

/// True if the string contains glob metacharacters.
pub fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Re-root patterns written for a tree onto one of its subdirectories.
///
/// Floating patterns still apply at any depth and are kept. When their
/// leading components can match the tail of `prefix`, an anchored copy of the
/// remainder is added, since that match would straddle the new root. Anchored
/// patterns under `prefix` lose the prefix; anchored patterns elsewhere cannot
/// match inside `prefix` and are dropped.
pub fn rebase_patterns(patterns: &[String], prefix: &Path) -> Vec<String> {
    let prefix = components_of(prefix);
    if prefix.is_empty() {
        return patterns.to_vec();
    }
    let mut rebased: Vec<String> = Vec::new();
    let mut push = |pattern: String| {
        if !rebased.contains(&pattern) {
            rebased.push(pattern);
        }
    };
    for raw in patterns {
        let trimmed = raw.trim();
        let body = trimmed.trim_start_matches('/').trim_end_matches('/');
        let parts: Vec<&str> = body.split('/').collect();
        if parts.first() == Some(&"**") {
            push(raw.clone());
        } else if trimmed.starts_with('/') {
            if let Some(rest) = strip_leading(&parts, &prefix) {
                push(format!("/{rest}"));
            }
        } else {
            push(raw.clone());
            for skip in 0..prefix.len() {
                if let Some(rest) = strip_leading(&parts, &prefix[skip..]) {
                    push(format!("/{rest}"));
                }
            }
        }
    }
    rebased
}

/// What remains of `parts` after its leading parts match `components` one by
/// one, if anything remains.
fn strip_leading(parts: &[&str], components: &[String]) -> Option<String> {
    if parts.len() <= components.len() {
        return None;
    }
    let leading_match = parts.iter().zip(components).all(|(part, name)| {
        *part != "**"
            && Pattern::new(part).is_ok_and(|p| p.matches_with(name, MATCH_OPTIONS))
    });
    leading_match.then(|| parts[components.len()..].join("/"))
}

/// Normal components of a relative path, as strings.
pub(crate) fn components_of(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn excluded(exclude: &[&str], path: &str) -> bool {
        let exclude: Vec<String> = exclude.iter().map(|s| s.to_string()).collect();
        Filter::new(&[], &exclude)
            .unwrap()
            .is_excluded(Path::new(path))
    }

    #[test]
    fn test_subtree_exclusion_covers_directory_and_contents() {
        assert!(excluded(&[".git/**"], ".git"));
        assert!(excluded(&[".git/**"], ".git/objects/ab/cdef"));
        assert!(!excluded(&[".git/**"], ".gitignore"));
        assert!(excluded(&[".git/**"], "src/.git"));
    }

    #[test]
    fn test_slash_patterns_float_to_any_depth() {
        assert!(excluded(&["node_modules/**"], "web/node_modules/react/index.js"));
        assert!(excluded(&[".git/**"], "vendor/lib/.git/HEAD"));
        assert!(excluded(&["src/gen"], "x/src/gen"));
        assert!(excluded(&["src/gen"], "src/gen/out.rs"));
        assert!(!excluded(&["src/gen"], "x/src/general"));
        assert!(!excluded(&["/src/gen"], "x/src/gen"));
    }

    #[test]
    fn test_entry_narrows_to_one_top_level_name() {
        let request = MirrorRequest::new("/a", "/b")
            .with_exclude(vec!["*.tmp".to_string()])
            .with_entry("a[1].txt");
        let filter = Filter::for_request(&request).unwrap();
        assert!(!filter.is_excluded(Path::new("a[1].txt")));
        assert!(filter.is_excluded(Path::new("a1.txt")));
        assert!(filter.is_excluded(Path::new("b.txt")));
        assert!(filter.is_excluded(Path::new("nested/a[1].txt")));
        assert_eq!(
            filter.rsync_args()[..2],
            ["--include=/a[[]1[]].txt", "--exclude=/*"]
        );

        let dir = MirrorRequest::new("/a", "/b")
            .with_exclude(vec!["*.tmp".to_string()])
            .with_entry("gen");
        let filter = Filter::for_request(&dir).unwrap();
        assert!(!filter.is_excluded(Path::new("gen/out.rs")));
        assert!(filter.is_excluded(Path::new("gen/out.tmp")));
    }

    #[test]
    fn test_double_star_crosses_directories() {
        assert!(excluded(&["**/*.log"], "a/b/c/run.log"));
        assert!(excluded(&["**/*.log"], "run.log"));
        assert!(!excluded(&["src/*.rs"], "src/nested/lib.rs"));
        assert!(excluded(&["src/**/*.rs"], "src/nested/lib.rs"));
    }

    #[test]
    fn test_unanchored_pattern_matches_any_depth() {
        assert!(excluded(&["node_modules"], "web/node_modules/react/index.js"));
        assert!(excluded(&["*.o"], "build/obj/main.o"));
        assert!(!excluded(&["*.o"], "src/main.c"));
    }

    #[test]
    fn test_leading_and_trailing_slashes() {
        assert!(excluded(&["/target/"], "target/debug/app"));
        assert!(!excluded(&["/target"], "crates/x/target"));
    }

    #[test]
    fn test_include_overrides_later_exclude() {
        let filter = Filter::new(&["keep.log".to_string()], &["*.log".to_string()]).unwrap();
        assert!(!filter.is_excluded(Path::new("logs/keep.log")));
        assert!(filter.is_excluded(Path::new("logs/drop.log")));
    }

    #[test]
    fn test_skip_beats_include() {
        let filter = Filter::layered(
            &["/gen/**".to_string()],
            &["*.rs".to_string(), "gen".to_string()],
            &["*".to_string()],
        )
        .unwrap();
        assert!(filter.is_excluded(Path::new("gen/out.rs")));
        assert!(!filter.is_excluded(Path::new("lib.rs")));
        assert_eq!(filter.rsync_args()[..2], ["--exclude=/gen", "--exclude=/gen/**"]);
    }

    #[test]
    fn test_excluded_ancestor_wins_over_include() {
        let filter = Filter::new(&["*.rs".to_string()], &["vendor/**".to_string()]).unwrap();
        assert!(filter.is_excluded(Path::new("vendor/lib.rs")));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(Filter::new(&[], &["a**b".to_string()]).is_err());
        assert!(Filter::new(&[], &["".to_string()]).is_err());
        assert!(validate("src/**").is_ok());
    }

    #[test]
    fn test_empty_filter() {
        let filter = Filter::empty();
        assert!(filter.is_empty());
        assert!(!filter.is_excluded(Path::new("anything/at/all")));
    }

    #[test]
    fn test_rsync_args() {
        let filter = Filter::new(
            &["keep.txt".to_string()],
            &[".git/**".to_string(), "*.o".to_string()],
        )
        .unwrap();
        assert_eq!(
            filter.rsync_args(),
            vec![
                "--include=keep.txt",
                "--exclude=.git",
                "--exclude=.git/**",
                "--exclude=*.o",
            ]
        );
    }

    #[test]
    fn test_has_glob_meta() {
        assert!(has_glob_meta("crates/*"));
        assert!(has_glob_meta("file?.txt"));
        assert!(!has_glob_meta("src/main"));
    }

    #[test]
    fn test_rebase_patterns() {
        let patterns = vec![
            "src/gen/**".to_string(),
            "docs/**".to_string(),
            "*.o".to_string(),
            "**/tmp".to_string(),
            "/src/out".to_string(),
            "/docs/api".to_string(),
        ];
        assert_eq!(
            rebase_patterns(&patterns, Path::new("src")),
            vec!["src/gen/**", "/gen/**", "docs/**", "*.o", "**/tmp", "/out"]
        );
        assert_eq!(rebase_patterns(&patterns, Path::new("")), patterns);
    }

    #[test]
    fn test_rebase_keeps_meaning_below_new_root() {
        let patterns = vec!["app/src/gen".to_string(), "*/cache/**".to_string()];
        let rebased = rebase_patterns(&patterns, Path::new("crates/app/src"));
        let below = Filter::new(&[], &rebased).unwrap();
        let above = Filter::new(&[], &patterns).unwrap();
        for rel in ["gen/a.rs", "lib.rs", "x/cache/y", "cache/y", "deep/app/src/gen/z"] {
            let full = Path::new("crates/app/src").join(rel);
            assert_eq!(below.is_excluded(Path::new(rel)), above.is_excluded(&full), "{rel}");
        }
    }
}
