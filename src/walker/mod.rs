//! File walking: produce the filtered set of source files under a root
//!
//! The walker owns its filesystem handles for the duration of one walk. A
//! walk is a lazy, finite sequence that cannot be restarted; per-entry
//! failures (permission walls, unreadable metadata) surface as non-fatal
//! items and never halt traversal. Symlinks are not followed, so links
//! pointing outside the root are never entered.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::Result;
use crate::language::Language;

mod ignore;

pub use ignore::{IgnoreMatcher, DEFAULT_IGNORES};

/// A file produced by a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    /// Absolute path on disk
    pub absolute_path: PathBuf,
    /// Path relative to the walk root
    pub relative_path: PathBuf,
    /// Detected language
    pub language: Language,
}

/// A non-fatal problem with a single walk entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkError {
    /// The entry could not be read (permissions, races, broken links)
    Entry {
        /// Path of the entry, when known
        path: Option<PathBuf>,
        /// What went wrong
        message: String,
    },
    /// The file exceeds the configured size cap and was skipped
    Oversized {
        /// Path of the skipped file
        path: PathBuf,
        /// Observed size in bytes
        size: u64,
    },
}

/// Configured file walker. Build once, call [`FileWalker::walk`] per pass.
#[derive(Debug)]
pub struct FileWalker {
    root: PathBuf,
    matcher: IgnoreMatcher,
    /// When non-empty, only these extensions are yielded
    extensions: Vec<String>,
    /// Opt-in shebang sniff for extension-less files
    sniff_extensionless: bool,
    max_file_size: u64,
}

impl FileWalker {
    /// Creates a walker for `root`, merging built-in defaults, the project
    /// `.driftignore`, and `overrides` into the ignore matcher.
    pub fn new(root: impl Into<PathBuf>, overrides: &[String]) -> Result<Self> {
        let root = root.into();
        let matcher = IgnoreMatcher::for_root(&root, overrides)?;
        Ok(Self {
            root,
            matcher,
            extensions: Vec::new(),
            sniff_extensionless: false,
            max_file_size: 2 * 1024 * 1024,
        })
    }

    /// Restricts the walk to the given extensions (without dots).
    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_string()).collect();
        self
    }

    /// Enables shebang sniffing for extension-less files.
    pub fn with_content_sniff(mut self, enabled: bool) -> Self {
        self.sniff_extensionless = enabled;
        self
    }

    /// Overrides the oversized-file cutoff.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// The walk root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Starts a lazy walk. The returned iterator is finite and cannot be
    /// restarted; create a new one for another pass.
    pub fn walk(&self) -> Walk<'_> {
        let inner = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        Walk {
            walker: self,
            inner,
        }
    }

    /// Convenience: drain a walk, splitting files from per-entry errors.
    pub fn collect_files(&self) -> (Vec<WalkedFile>, Vec<WalkError>) {
        let mut files = Vec::new();
        let mut errors = Vec::new();
        for item in self.walk() {
            match item {
                Ok(file) => files.push(file),
                Err(e) => errors.push(e),
            }
        }
        (files, errors)
    }

    fn relative<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    /// Directory filter: hidden directories are pruned unless a positive
    /// rule re-includes them; ignored directories are pruned outright.
    fn should_descend(&self, path: &Path) -> bool {
        let relative = self.relative(path);
        if relative.as_os_str().is_empty() {
            return true; // the root itself
        }
        let hidden = relative
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if hidden && !self.matcher.is_reincluded(relative) {
            return false;
        }
        !self.matcher.is_ignored(relative)
    }

    fn classify(&self, path: &Path, size: u64) -> Option<std::result::Result<WalkedFile, WalkError>> {
        let relative = self.relative(path).to_path_buf();
        if self.matcher.is_ignored(&relative) {
            return None;
        }
        let ext = path.extension().and_then(|e| e.to_str());
        if !self.extensions.is_empty() {
            match ext {
                Some(e) if self.extensions.iter().any(|want| want == e) => {}
                _ => return None,
            }
        }
        if size > self.max_file_size {
            return Some(Err(WalkError::Oversized {
                path: relative,
                size,
            }));
        }
        let language = match ext {
            Some(_) => Language::from_path(path),
            None if self.sniff_extensionless => {
                let first_line = std::fs::File::open(path)
                    .ok()
                    .and_then(|f| {
                        use std::io::{BufRead, BufReader};
                        BufReader::new(f).lines().next().and_then(|l| l.ok())
                    })
                    .unwrap_or_default();
                Language::sniff(&first_line)
            }
            None => Language::Other,
        };
        Some(Ok(WalkedFile {
            absolute_path: path.to_path_buf(),
            relative_path: relative,
            language,
        }))
    }
}

/// A single in-flight walk. Yields files and non-fatal per-entry errors.
pub struct Walk<'w> {
    walker: &'w FileWalker,
    inner: walkdir::IntoIter,
}

impl Iterator for Walk<'_> {
    type Item = std::result::Result<WalkedFile, WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    return Some(Err(WalkError::Entry {
                        path: e.path().map(Path::to_path_buf),
                        message: e.to_string(),
                    }));
                }
            };

            if entry.file_type().is_dir() {
                if !self.walker.should_descend(entry.path()) {
                    self.inner.skip_current_dir();
                }
                continue;
            }
            if !entry.file_type().is_file() {
                continue; // sockets, fifos, unfollowed symlinks
            }

            let size = match entry.metadata() {
                Ok(m) => m.len(),
                Err(e) => {
                    return Some(Err(WalkError::Entry {
                        path: Some(entry.path().to_path_buf()),
                        message: e.to_string(),
                    }));
                }
            };

            match self.walker.classify(entry.path(), size) {
                Some(item) => return Some(item),
                None => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn walk_filters_defaults_and_detects_language() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/app.ts", "export const x = 1;");
        touch(dir.path(), "src/util.py", "x = 1");
        touch(dir.path(), "node_modules/pkg/index.js", "module.exports = {}");

        let walker = FileWalker::new(dir.path(), &[]).unwrap();
        let (files, errors) = walker.collect_files();
        assert!(errors.is_empty());

        let rels: Vec<_> = files
            .iter()
            .map(|f| f.relative_path.to_string_lossy().into_owned())
            .collect();
        assert!(rels.contains(&"src/app.ts".to_string()));
        assert!(rels.contains(&"src/util.py".to_string()));
        assert!(!rels.iter().any(|r| r.contains("node_modules")));

        let ts = files
            .iter()
            .find(|f| f.relative_path.ends_with("app.ts"))
            .unwrap();
        assert_eq!(ts.language, Language::TypeScript);
    }

    #[test]
    fn hidden_directories_are_skipped_without_positive_rule() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), ".hidden/secret.ts", "let x = 1;");
        touch(dir.path(), "src/ok.ts", "let x = 1;");

        let walker = FileWalker::new(dir.path(), &[]).unwrap();
        let (files, _) = walker.collect_files();
        assert_eq!(files.len(), 1);
        assert!(files[0].relative_path.ends_with("ok.ts"));

        // A positive rule re-includes the hidden tree.
        let walker =
            FileWalker::new(dir.path(), &["!.hidden".to_string()]).unwrap();
        let (files, _) = walker.collect_files();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn driftignore_is_merged() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), ".driftignore", "generated/**\n");
        touch(dir.path(), "generated/api.ts", "x");
        touch(dir.path(), "src/a.ts", "x");

        let walker = FileWalker::new(dir.path(), &[]).unwrap();
        let (files, _) = walker.collect_files();
        assert_eq!(files.len(), 2); // .driftignore itself is yielded (Other) + src/a.ts
        assert!(files.iter().all(|f| !f.relative_path.starts_with("generated")));
    }

    #[test]
    fn oversized_files_are_reported_not_yielded() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/big.ts", &"x".repeat(64));
        let walker = FileWalker::new(dir.path(), &[])
            .unwrap()
            .with_max_file_size(16);
        let (files, errors) = walker.collect_files();
        assert!(files.is_empty());
        assert!(matches!(errors[0], WalkError::Oversized { .. }));
    }

    #[test]
    fn extension_filter_applies() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.ts", "x");
        touch(dir.path(), "b.py", "x");
        let walker = FileWalker::new(dir.path(), &[])
            .unwrap()
            .with_extensions(&["ts"]);
        let (files, _) = walker.collect_files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].language, Language::TypeScript);
    }
}
