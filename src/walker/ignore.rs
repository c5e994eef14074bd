//! Ignore rule compilation and matching
//!
//! Rules come from three sources with an explicit precedence order:
//! built-in defaults, then the project `.driftignore`, then caller
//! overrides. Later sources override earlier ones; within one source the
//! first matching rule wins. A rule prefixed with `!` re-includes what an
//! earlier rule excluded.

use glob::Pattern;
use std::path::Path;

use crate::error::{Error, Result};

/// The default ignore patterns applied to every walk.
pub const DEFAULT_IGNORES: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    "target",
    ".next",
    ".nuxt",
    "__pycache__",
    ".pytest_cache",
    "coverage",
    ".nyc_output",
    "vendor",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    "bin",
    "obj",
];

/// Where a rule came from. Higher ranks win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum RuleSource {
    Defaults,
    ProjectFile,
    CallerOverride,
}

#[derive(Debug)]
struct IgnoreRule {
    source: RuleSource,
    negated: bool,
    /// Bare names (no `/`) match any path component; everything else
    /// matches the full relative path.
    component_only: bool,
    pattern: Pattern,
}

impl IgnoreRule {
    fn compile(raw: &str, source: RuleSource) -> Result<Option<Self>> {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (negated, body) = match line.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, line),
        };
        if body.is_empty() {
            return Ok(None);
        }
        let component_only = !body.contains('/');
        let pattern = Pattern::new(body.trim_end_matches('/')).map_err(|e| Error::Glob {
            pattern: body.to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(Self {
            source,
            negated,
            component_only,
            pattern,
        }))
    }

    fn matches(&self, relative: &Path) -> bool {
        if self.component_only {
            relative
                .components()
                .any(|c| self.pattern.matches(&c.as_os_str().to_string_lossy()))
        } else {
            self.pattern.matches(&relative.to_string_lossy())
        }
    }
}

/// Compiled ignore matcher for one walk. Built once, queried per entry.
#[derive(Debug)]
pub struct IgnoreMatcher {
    /// Rules ordered by descending source rank; first match decides.
    rules: Vec<IgnoreRule>,
}

impl IgnoreMatcher {
    /// Compiles the matcher from the three rule sources.
    ///
    /// `project_rules` are the lines of `.driftignore` (comments and blanks
    /// tolerated); `overrides` come from the caller or `config.json`.
    pub fn new(project_rules: &[String], overrides: &[String]) -> Result<Self> {
        let mut rules = Vec::new();
        for raw in overrides {
            if let Some(rule) = IgnoreRule::compile(raw, RuleSource::CallerOverride)? {
                rules.push(rule);
            }
        }
        for raw in project_rules {
            if let Some(rule) = IgnoreRule::compile(raw, RuleSource::ProjectFile)? {
                rules.push(rule);
            }
        }
        for raw in DEFAULT_IGNORES {
            if let Some(rule) = IgnoreRule::compile(raw, RuleSource::Defaults)? {
                rules.push(rule);
            }
        }
        Ok(Self { rules })
    }

    /// Reads `.driftignore` under `root` and compiles the matcher.
    pub fn for_root(root: &Path, overrides: &[String]) -> Result<Self> {
        let driftignore = root.join(".driftignore");
        let project_rules = if driftignore.is_file() {
            std::fs::read_to_string(&driftignore)?
                .lines()
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        };
        Self::new(&project_rules, overrides)
    }

    /// Whether the relative path is ignored. First matching rule decides.
    pub fn is_ignored(&self, relative: &Path) -> bool {
        for rule in &self.rules {
            if rule.matches(relative) {
                return !rule.negated;
            }
        }
        false
    }

    /// Whether any positive (re-including) rule matches the path. Hidden
    /// directories are only traversed when this is true.
    pub fn is_reincluded(&self, relative: &Path) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.negated && rule.matches(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn matcher(project: &[&str], overrides: &[&str]) -> IgnoreMatcher {
        IgnoreMatcher::new(
            &project.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            &overrides.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        )
        .unwrap()
    }

    #[test]
    fn defaults_cover_node_modules_anywhere() {
        let m = matcher(&[], &[]);
        assert!(m.is_ignored(&PathBuf::from("node_modules/lodash/index.js")));
        assert!(m.is_ignored(&PathBuf::from("packages/a/node_modules/x.js")));
        assert!(!m.is_ignored(&PathBuf::from("src/modules/node_helper.ts")));
    }

    #[test]
    fn negation_reincludes() {
        let m = matcher(&["generated/**", "!generated/keep.ts"], &[]);
        assert!(m.is_ignored(&PathBuf::from("generated/api.ts")));
        assert!(!m.is_ignored(&PathBuf::from("generated/keep.ts")));
    }

    #[test]
    fn caller_overrides_beat_project_rules() {
        let m = matcher(&["src/legacy/**"], &["!src/legacy/still_used.ts"]);
        assert!(m.is_ignored(&PathBuf::from("src/legacy/old.ts")));
        assert!(!m.is_ignored(&PathBuf::from("src/legacy/still_used.ts")));
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        let m = matcher(&["# a comment", "", "docs/**"], &[]);
        assert!(m.is_ignored(&PathBuf::from("docs/readme.md")));
        assert!(!m.is_ignored(&PathBuf::from("src/main.ts")));
    }

    #[test]
    fn bad_glob_is_reported() {
        let err = IgnoreMatcher::new(&["[".to_string()], &[]).unwrap_err();
        assert!(matches!(err, Error::Glob { .. }));
    }
}
