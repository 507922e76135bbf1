//! Exclude pattern matching
//!
//! Decides whether a path, relative to the root of a copy or archive walk,
//! is left out of the backup. Patterns use shell glob syntax (`*`, `?`,
//! `[...]`) with two compound forms on top:
//!
//! - `dir/**` matches `dir` itself and everything nested under it
//! - `**/name` matches the final path component only, at any depth
//!
//! Anything else is matched against the whole forward-slash relative path.

use std::path::{Component, Path};

use glob::{MatchOptions, Pattern};

use crate::error::{BackupError, BackupResult};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A single compiled exclude pattern
#[derive(Debug, Clone)]
struct ExcludeRule {
    raw: String,
    /// Directory part of a `dir/**` pattern
    subtree: Option<Pattern>,
    /// Basename part of a `**/name` pattern
    basename: Option<Pattern>,
    full: Pattern,
}

impl ExcludeRule {
    fn compile(raw: &str) -> BackupResult<Self> {
        let subtree = match raw.strip_suffix("/**") {
            Some(dir) if !dir.is_empty() => Some(compile_glob(raw, dir)?),
            _ => None,
        };
        let basename = match raw.strip_prefix("**/") {
            Some(base) if !base.is_empty() => Some(compile_glob(raw, base)?),
            _ => None,
        };

        Ok(Self {
            raw: raw.to_string(),
            subtree,
            basename,
            full: compile_glob(raw, raw)?,
        })
    }

    fn matches(&self, path: &str) -> bool {
        if let Some(dir) = &self.subtree {
            // The directory itself or any ancestor of the path
            let mut end = 0;
            for segment in path.split('/') {
                end += segment.len();
                if dir.matches_with(&path[..end], MATCH_OPTIONS) {
                    return true;
                }
                end += 1;
            }
        }

        if let Some(base) = &self.basename {
            let name = path.rsplit('/').next().unwrap_or(path);
            if base.matches_with(name, MATCH_OPTIONS) {
                return true;
            }
        }

        self.full.matches_with(path, MATCH_OPTIONS)
    }
}

/// Compile one glob, with `**` inside it meaning the same as `*`
///
/// Only the `dir/**` and `**/name` forms give `**` a special meaning, and
/// those are split off before this is called.
fn compile_glob(raw: &str, part: &str) -> BackupResult<Pattern> {
    Pattern::new(&collapse_stars(part)).map_err(|e| BackupError::pattern(raw, e.to_string()))
}

/// Replace every run of `*` with a single `*`
fn collapse_stars(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        if c == '*' && out.ends_with('*') {
            continue;
        }
        out.push(c);
    }
    out
}

/// A validated set of exclude patterns
///
/// Compiling up front means a malformed pattern aborts the operation before
/// any file is visited instead of surfacing halfway through a walk.
#[derive(Debug, Clone, Default)]
pub struct ExcludeMatcher {
    rules: Vec<ExcludeRule>,
}

impl ExcludeMatcher {
    /// Compile a pattern list, failing on the first malformed pattern
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> BackupResult<Self> {
        let rules = patterns
            .iter()
            .map(|p| ExcludeRule::compile(p.as_ref()))
            .collect::<BackupResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// A matcher that excludes nothing
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// The patterns this matcher was built from
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.raw.as_str())
    }

    /// Check a path relative to the walk root
    pub fn is_excluded(&self, relative: &Path) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        self.is_excluded_normalized(&normalize(relative))
    }

    /// Check a path that is already forward-slash normalized
    pub fn is_excluded_normalized(&self, path: &str) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        self.rules.iter().any(|rule| rule.matches(path))
    }

    /// The first pattern matching the path, for log output
    pub fn matching_pattern(&self, relative: &Path) -> Option<&str> {
        let path = normalize(relative);
        self.rules
            .iter()
            .find(|rule| rule.matches(&path))
            .map(|rule| rule.raw.as_str())
    }
}

/// One-shot check of a relative path against a raw pattern list
pub fn matches<S: AsRef<str>>(relative: &Path, patterns: &[S]) -> BackupResult<bool> {
    if patterns.is_empty() {
        return Ok(false);
    }
    Ok(ExcludeMatcher::new(patterns)?.is_excluded(relative))
}

/// Render a relative path with forward slashes and no `.` components
pub fn normalize(relative: &Path) -> String {
    let mut out = String::new();
    for component in relative.components() {
        let part = match component {
            Component::CurDir | Component::RootDir | Component::Prefix(_) => continue,
            Component::ParentDir => "..".into(),
            Component::Normal(name) => name.to_string_lossy(),
        };
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(&part);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn excluded(path: &str, patterns: &[&str]) -> bool {
        matches(Path::new(path), patterns).unwrap()
    }

    #[test]
    fn test_empty_patterns_never_match() {
        let none: &[&str] = &[];
        assert!(!excluded("anything", none));
        assert!(!excluded("a/b/c.txt", none));
        assert!(!ExcludeMatcher::empty().is_excluded(Path::new("x")));
    }

    #[test]
    fn test_subtree_pattern() {
        let patterns = ["logs/**"];
        assert!(excluded("logs", &patterns));
        assert!(excluded("logs/x", &patterns));
        assert!(excluded("logs/x/y", &patterns));
        assert!(!excluded("logsx", &patterns));
        assert!(!excluded("other/logs", &patterns));
        assert!(!excluded("log", &patterns));
    }

    #[test]
    fn test_nested_subtree_pattern() {
        let patterns = ["data/cache/**"];
        assert!(excluded("data/cache", &patterns));
        assert!(excluded("data/cache/a/b.bin", &patterns));
        assert!(!excluded("data", &patterns));
        assert!(!excluded("data/cached", &patterns));
    }

    #[test]
    fn test_basename_pattern_any_depth() {
        let patterns = ["**/*.tmp"];
        assert!(excluded("x.tmp", &patterns));
        assert!(excluded("foo/bar/x.tmp", &patterns));
        assert!(excluded("a/b/c/d/e/f.tmp", &patterns));
        assert!(!excluded("foo/bar/x.tmpl", &patterns));
        assert!(!excluded("foo/x.tmp/inner", &patterns));
    }

    #[test]
    fn test_plain_glob_is_anchored_to_full_path() {
        assert!(excluded("notes.bak", &["*.bak"]));
        // `*` never crosses a separator
        assert!(!excluded("dir/notes.bak", &["*.bak"]));
        assert!(excluded("dir/notes.bak", &["dir/*.bak"]));
        assert!(excluded("a1", &["a?"]));
        assert!(excluded("b.log", &["[abc].log"]));
        assert!(!excluded("d.log", &["[abc].log"]));
    }

    #[test]
    fn test_double_star_inside_glob_is_single_star() {
        assert!(excluded("cache_old", &["cache**"]));
        assert!(!excluded("cache/old", &["cache**"]));

        let patterns = ["a/**/b"];
        assert!(excluded("a/x/b", &patterns));
        assert!(!excluded("a/x/y/b", &patterns));
        assert!(ExcludeMatcher::new(&["x***y", "**.bak"]).is_ok());
    }

    #[test]
    fn test_collapse_stars() {
        assert_eq!(collapse_stars("a/**/b"), "a/*/b");
        assert_eq!(collapse_stars("***"), "*");
        assert_eq!(collapse_stars("[*]x"), "[*]x");
    }

    #[test]
    fn test_case_sensitive() {
        assert!(!excluded("Cache", &["cache"]));
        assert!(excluded("cache", &["cache"]));
    }

    #[test]
    fn test_dotfiles_match_wildcards() {
        assert!(excluded(".env", &["*"]));
        assert!(excluded("dir/.git", &["**/.git"]));
    }

    #[test]
    fn test_invalid_pattern_is_error() {
        let err = matches(Path::new("a"), &["[abc"]).unwrap_err();
        assert!(err.is_pattern());
        assert!(err.to_string().contains("[abc"));

        let err = ExcludeMatcher::new(&["ok/**", "bad[x"]).unwrap_err();
        assert!(matches!(err, BackupError::Pattern { ref pattern, .. } if pattern == "bad[x"));
    }

    #[test]
    fn test_any_pattern_in_set_matches() {
        let matcher = ExcludeMatcher::new(&["*.log", "cache/**", "**/*.tmp"]).unwrap();
        assert_eq!(matcher.len(), 3);
        assert!(matcher.is_excluded(Path::new("server.log")));
        assert!(matcher.is_excluded(Path::new("cache/blob")));
        assert!(matcher.is_excluded(Path::new("deep/dir/x.tmp")));
        assert!(!matcher.is_excluded(Path::new("keep/me.txt")));
        assert_eq!(
            matcher.matching_pattern(Path::new("cache")),
            Some("cache/**")
        );
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("a/b/c")), "a/b/c");
        assert_eq!(normalize(Path::new("./a/./b")), "a/b");
        assert_eq!(normalize(Path::new(".")), "");
        let joined: PathBuf = ["x", "y", "z.txt"].iter().collect();
        assert_eq!(normalize(&joined), "x/y/z.txt");
    }
}
