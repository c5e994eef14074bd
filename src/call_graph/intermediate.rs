//! On-disk extraction intermediate
//!
//! Per-file extraction results keyed by content hash, persisted at
//! `lake/callgraph/intermediate.json`. An incremental rebuild reuses the
//! cached extraction for every file whose hash is unchanged, which is what
//! keeps nodes stable across rebuilds while their file is untouched.
//! During a build the map is append-only; it is written once at the end.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;

use super::extract::FileExtraction;

/// One cached entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntermediateEntry {
    /// Hex sha-256 of the file content the extraction came from
    pub content_hash: String,
    /// The extraction itself
    pub extraction: FileExtraction,
}

/// The intermediate cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Intermediate {
    /// Entries keyed by project-relative path
    pub files: BTreeMap<PathBuf, IntermediateEntry>,
}

impl Intermediate {
    fn path(drift_dir: &Path) -> PathBuf {
        drift_dir
            .join("lake")
            .join("callgraph")
            .join("intermediate.json")
    }

    /// Loads the cache, tolerating absence.
    pub fn load(drift_dir: &Path) -> Result<Self> {
        let path = Self::path(drift_dir);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Persists the cache atomically.
    pub fn save(&self, drift_dir: &Path) -> Result<()> {
        crate::store::write_json_atomic(&Self::path(drift_dir), self)
    }

    /// A cached extraction, if the stored hash matches.
    pub fn cached(&self, file: &Path, content_hash: &str) -> Option<&FileExtraction> {
        self.files
            .get(file)
            .filter(|entry| entry.content_hash == content_hash)
            .map(|entry| &entry.extraction)
    }

    /// Records a fresh extraction.
    pub fn insert(&mut self, file: PathBuf, content_hash: String, extraction: FileExtraction) {
        self.files.insert(
            file,
            IntermediateEntry {
                content_hash,
                extraction,
            },
        );
    }

    /// Drops entries for files no longer present.
    pub fn retain_files(&mut self, live: &std::collections::BTreeSet<PathBuf>) {
        self.files.retain(|path, _| live.contains(path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use tempfile::TempDir;

    fn extraction(file: &str) -> FileExtraction {
        FileExtraction {
            file: PathBuf::from(file),
            language: Language::TypeScript,
            functions: Vec::new(),
            calls: Vec::new(),
            imports: Vec::new(),
        }
    }

    #[test]
    fn cache_hits_require_matching_hash() {
        let mut cache = Intermediate::default();
        cache.insert(PathBuf::from("src/a.ts"), "h1".into(), extraction("src/a.ts"));

        assert!(cache.cached(Path::new("src/a.ts"), "h1").is_some());
        assert!(cache.cached(Path::new("src/a.ts"), "h2").is_none());
        assert!(cache.cached(Path::new("src/b.ts"), "h1").is_none());
    }

    #[test]
    fn round_trip_and_retention() {
        let dir = TempDir::new().unwrap();
        let mut cache = Intermediate::default();
        cache.insert(PathBuf::from("src/a.ts"), "h1".into(), extraction("src/a.ts"));
        cache.insert(PathBuf::from("src/gone.ts"), "h2".into(), extraction("src/gone.ts"));
        cache.save(dir.path()).unwrap();

        let mut loaded = Intermediate::load(dir.path()).unwrap();
        assert_eq!(loaded.files.len(), 2);

        let live = std::collections::BTreeSet::from([PathBuf::from("src/a.ts")]);
        loaded.retain_files(&live);
        assert_eq!(loaded.files.len(), 1);
    }
}
