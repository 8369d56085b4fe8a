//! Working scope for diff and transfer runs.
//!
//! A scope is an immutable value: narrowing the root or adding an exclusion
//! produces a new scope, so a scope captured at the start of a run cannot be
//! changed underneath it.

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::fs::types::normalize_path;
use crate::sync::error::SyncError;

/// Exclusion set of path prefixes, compiled to a glob matcher. A prefix
/// excludes the path itself and everything beneath it, on path-segment
/// boundaries (`/old` excludes `/old/x` but not `/older`).
#[derive(Debug, Clone)]
pub struct ExcludeSet {
    glob_set: GlobSet,
    prefixes: Vec<String>,
}

impl Default for ExcludeSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl ExcludeSet {
    pub fn empty() -> Self {
        Self {
            glob_set: GlobSet::empty(),
            prefixes: Vec::new(),
        }
    }

    pub fn from_prefixes<S: AsRef<str>>(prefixes: &[S]) -> Result<Self, SyncError> {
        let mut set = Self::empty();
        for prefix in prefixes {
            set = set.with_prefix(prefix.as_ref())?;
        }
        Ok(set)
    }

    /// New set with one more prefix. The matcher is rebuilt from the full
    /// prefix list; prefixes are escaped so glob metacharacters in paths
    /// stay literal.
    pub fn with_prefix(&self, prefix: &str) -> Result<Self, SyncError> {
        let mut prefixes = self.prefixes.clone();
        prefixes.push(normalize_path(prefix));

        let mut builder = GlobSetBuilder::new();
        for prefix in &prefixes {
            let literal = globset::escape(prefix);
            for pattern in [literal.clone(), format!("{}/**", literal)] {
                let glob = Glob::new(&pattern).map_err(|source| SyncError::InvalidExclude {
                    prefix: prefix.clone(),
                    source,
                })?;
                builder.add(glob);
            }
        }

        let glob_set = builder.build().map_err(|source| SyncError::InvalidExclude {
            prefix: prefixes.last().cloned().unwrap_or_default(),
            source,
        })?;

        Ok(Self { glob_set, prefixes })
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.glob_set.is_match(path)
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

/// The subtree a run operates on: a root (default `/`) plus the exclusion
/// set consulted by the diff engine.
#[derive(Debug, Clone, Default)]
pub struct WorkingScope {
    root: String,
    excludes: ExcludeSet,
}

impl WorkingScope {
    pub fn new(root: &str) -> Self {
        Self {
            root: normalize_path(root),
            excludes: ExcludeSet::empty(),
        }
    }

    /// Same exclusions, new root.
    pub fn with_root(&self, root: &str) -> Self {
        Self {
            root: normalize_path(root),
            excludes: self.excludes.clone(),
        }
    }

    /// Same root, one more exclusion prefix.
    pub fn with_exclude(&self, prefix: &str) -> Result<Self, SyncError> {
        Ok(Self {
            root: self.root.clone(),
            excludes: self.excludes.with_prefix(prefix)?,
        })
    }

    pub fn with_excludes<S: AsRef<str>>(&self, prefixes: &[S]) -> Result<Self, SyncError> {
        let mut scope = self.clone();
        for prefix in prefixes {
            scope = scope.with_exclude(prefix.as_ref())?;
        }
        Ok(scope)
    }

    pub fn root(&self) -> &str {
        if self.root.is_empty() {
            "/"
        } else {
            &self.root
        }
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.excludes.is_excluded(path)
    }

    pub fn excludes(&self) -> &ExcludeSet {
        &self.excludes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_excludes_subtree() {
        let scope = WorkingScope::new("/").with_exclude("/old").unwrap();

        assert!(scope.is_excluded("/old"));
        assert!(scope.is_excluded("/old/x.txt"));
        assert!(scope.is_excluded("/old/deep/y.txt"));
        assert!(!scope.is_excluded("/older"));
        assert!(!scope.is_excluded("/new/old"));
    }

    #[test]
    fn test_with_exclude_leaves_original_untouched() {
        let base = WorkingScope::new("/");
        let narrowed = base.with_exclude("/tmp").unwrap();

        assert!(!base.is_excluded("/tmp/x"));
        assert!(narrowed.is_excluded("/tmp/x"));
    }

    #[test]
    fn test_with_root_keeps_excludes() {
        let scope = WorkingScope::new("/").with_exclude("/photos/cache").unwrap();
        let narrowed = scope.with_root("/photos");

        assert_eq!(narrowed.root(), "/photos");
        assert!(narrowed.is_excluded("/photos/cache/a.jpg"));
    }

    #[test]
    fn test_glob_metacharacters_stay_literal() {
        let scope = WorkingScope::new("/").with_exclude("/a[1]").unwrap();

        assert!(scope.is_excluded("/a[1]/f.txt"));
        assert!(!scope.is_excluded("/a1/f.txt"));
    }

    #[test]
    fn test_prefix_normalization() {
        let scope = WorkingScope::new("/").with_exclude("cache/").unwrap();
        assert!(scope.is_excluded("/cache/obj"));
    }
}
